// Thin entry point; all of the wiring lives in the library's `run`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uniassist::run().await
}
