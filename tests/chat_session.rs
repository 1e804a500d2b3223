use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uniassist::{
    ChatConfig, ChatSession, CompletionProvider, Content, ConversationObserver, Message, Role,
    SubmitOutcome, FALLBACK_REPLY, TECHNICAL_ERROR_REPLY,
};

// --- Test doubles ---

#[derive(Clone)]
struct RecordedCall {
    contents: Vec<Content>,
    system_instruction: String,
}

/// Plays back a fixed script of generation results and records every call
/// the session makes.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Option<String>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<Option<String>>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call(&self, index: usize) -> RecordedCall {
        self.calls.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn generate(
        &self,
        contents: &[Content],
        system_instruction: &str,
    ) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(RecordedCall {
            contents: contents.to_vec(),
            system_instruction: system_instruction.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider called more times than the script allows")
    }
}

/// Parks inside `generate` until released, to hold a turn in flight while
/// the test pokes at the session from outside.
struct BlockingProvider {
    entered: Notify,
    release: Notify,
    calls: AtomicU32,
}

impl BlockingProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CompletionProvider for BlockingProvider {
    async fn generate(
        &self,
        _contents: &[Content],
        _system_instruction: &str,
    ) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Some("done waiting".to_string()))
    }
}

struct RecordingObserver {
    events: Arc<Mutex<Vec<String>>>,
}

impl ConversationObserver for RecordingObserver {
    fn message_appended(&self, message: &Message) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}: {}", message.role.as_str(), message.text));
    }

    fn store_cleared(&self) {
        self.events.lock().unwrap().push("cleared".to_string());
    }
}

fn test_config() -> ChatConfig {
    ChatConfig {
        system_instruction: "Answer briefly.".to_string(),
        ..ChatConfig::default()
    }
}

// --- Tests ---

#[tokio::test]
async fn successful_turn_appends_user_and_model_messages() {
    let provider = ScriptedProvider::new(vec![Ok(Some(
        "Registration closes on Friday.".to_string(),
    ))]);
    let session = ChatSession::new(test_config(), provider.clone());

    let outcome = session
        .submit("What is the deadline for course registration?")
        .await;
    assert_eq!(outcome, SubmitOutcome::Replied);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(
        messages[0].text,
        "What is the deadline for course registration?"
    );
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].text, "Registration closes on Friday.");
    assert!(messages[0].id < messages[1].id);
    assert!(!session.is_loading());

    // Exactly one call, carrying only the new message and the persona.
    assert_eq!(provider.call_count(), 1);
    let call = provider.call(0);
    assert_eq!(call.contents.len(), 1);
    assert_eq!(call.contents[0].role, "user");
    assert_eq!(call.system_instruction, "Answer briefly.");
}

#[tokio::test]
async fn contentless_response_becomes_the_fallback_reply() {
    let provider = ScriptedProvider::new(vec![Ok(None)]);
    let session = ChatSession::new(test_config(), provider.clone());

    let outcome = session.submit("hello?").await;
    assert_eq!(outcome, SubmitOutcome::Replied);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].text, FALLBACK_REPLY);

    // A contentless 2xx is not a dispatch failure, so no retries happen.
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_a_reply_arrives() {
    let provider = ScriptedProvider::new(vec![
        Err(anyhow::anyhow!("connection reset")),
        Err(anyhow::anyhow!("connection reset")),
        Ok(Some("eventually".to_string())),
    ]);
    let session = ChatSession::new(test_config(), provider.clone());

    let started = tokio::time::Instant::now();
    let outcome = session.submit("still there?").await;
    assert_eq!(outcome, SubmitOutcome::Replied);

    // Two failures cost 1000ms + 2000ms of backoff before the third try.
    assert_eq!(started.elapsed().as_millis(), 3000);
    assert_eq!(provider.call_count(), 3);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text, "eventually");
    assert!(!session.is_loading());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_become_the_technical_error_reply() {
    let script = (1..=5)
        .map(|i| Err(anyhow::anyhow!("boom {}", i)))
        .collect();
    let provider = ScriptedProvider::new(script);
    let session = ChatSession::new(test_config(), provider.clone());

    let outcome = session.submit("anyone home?").await;
    assert_eq!(outcome, SubmitOutcome::Replied);
    assert_eq!(provider.call_count(), 5);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].text, TECHNICAL_ERROR_REPLY);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn context_window_keeps_the_last_ten_prior_messages() {
    let script = (1..=7)
        .map(|i| Ok(Some(format!("reply {}", i))))
        .collect();
    let provider = ScriptedProvider::new(script);
    let session = ChatSession::new(test_config(), provider.clone());

    for i in 1..=7 {
        let outcome = session.submit(&format!("question {}", i)).await;
        assert_eq!(outcome, SubmitOutcome::Replied);
    }
    assert_eq!(session.messages().await.len(), 14);
    assert_eq!(provider.call_count(), 7);

    // First turn: no history yet, just the new message.
    assert_eq!(provider.call(0).contents.len(), 1);

    // Sixth turn: exactly ten prior messages, all of them included.
    let sixth = provider.call(5);
    assert_eq!(sixth.contents.len(), 11);
    assert_eq!(sixth.contents[0].parts[0].text, "question 1");

    // Seventh turn: twelve prior messages, truncated to the last ten.
    let seventh = provider.call(6);
    assert_eq!(seventh.contents.len(), 11);
    assert_eq!(seventh.contents[0].role, "user");
    assert_eq!(seventh.contents[0].parts[0].text, "question 2");
    assert_eq!(seventh.contents[9].role, "model");
    assert_eq!(seventh.contents[9].parts[0].text, "reply 6");
    assert_eq!(seventh.contents[10].role, "user");
    assert_eq!(seventh.contents[10].parts[0].text, "question 7");
}

#[tokio::test]
async fn empty_and_whitespace_input_is_rejected_silently() {
    let provider = ScriptedProvider::new(vec![]);
    let session = ChatSession::new(test_config(), provider.clone());

    assert_eq!(session.submit("").await, SubmitOutcome::RejectedEmpty);
    assert_eq!(session.submit("   \t ").await, SubmitOutcome::RejectedEmpty);

    assert!(session.messages().await.is_empty());
    assert_eq!(provider.call_count(), 0);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn concurrent_submissions_are_rejected_while_a_turn_is_in_flight() {
    let provider = BlockingProvider::new();
    let session = ChatSession::new(test_config(), provider.clone());

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.submit("first question").await }
    });

    // Wait until the first turn is parked inside the provider.
    provider.entered.notified().await;
    assert!(session.is_loading());

    assert_eq!(
        session.submit("second question").await,
        SubmitOutcome::RejectedBusy
    );
    // Clearing mid-flight is also refused.
    assert!(!session.clear().await);

    provider.release.notify_one();
    assert_eq!(first.await.unwrap(), SubmitOutcome::Replied);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "first question");
    assert_eq!(messages[1].text, "done waiting");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn observers_see_appends_and_clears_in_order() {
    let provider = ScriptedProvider::new(vec![Ok(Some("hi there".to_string()))]);
    let session = ChatSession::new(test_config(), provider);

    let events = Arc::new(Mutex::new(Vec::new()));
    session
        .subscribe(Box::new(RecordingObserver {
            events: events.clone(),
        }))
        .await;

    session.submit("hello").await;
    assert!(session.clear().await);
    assert!(session.messages().await.is_empty());

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            "user: hello".to_string(),
            "model: hi there".to_string(),
            "cleared".to_string(),
        ]
    );
}
