//! Chat dispatcher — user text + latest emotion → backend → transcript
//!
//! The user message is appended before the request goes out. Any failure
//! (network, non-2xx, timeout) lands in the transcript as [`FALLBACK_REPLY`]
//! instead of surfacing as an error. Sends do not wait on each other, so
//! replies are appended in completion order.

use serenity_core::{ChatBackend, ChatMessage, EmotionSample, Sender, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const FALLBACK_REPLY: &str = "I'm having trouble connecting, but I'm here for you.";

pub struct Dispatcher {
    session: Arc<SessionState>,
    backend: Arc<dyn ChatBackend>,
    request_timeout: Duration,
}

/// A user message that has been appended and still awaits its reply.
struct PendingSend {
    user_message: ChatMessage,
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionState>,
        backend: Arc<dyn ChatBackend>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            session,
            backend,
            request_timeout,
        }
    }

    fn begin(&self, text: &str, current_emotion: Option<EmotionSample>) -> Option<PendingSend> {
        if text.trim().is_empty() {
            return None;
        }
        let user_message = self
            .session
            .append_message(Sender::User, text, current_emotion);
        Some(PendingSend { user_message })
    }

    async fn complete(&self, pending: PendingSend) -> ChatMessage {
        let user = &pending.user_message;
        let emotion = user.emotion_context.as_ref().map(|s| s.label);

        let reply = tokio::time::timeout(self.request_timeout, self.backend.reply(&user.text, emotion))
            .await;

        let text = match reply {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(
                    message_id = user.id,
                    backend = self.backend.name(),
                    error = %e,
                    "Chat request failed, using fallback reply"
                );
                FALLBACK_REPLY.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    message_id = user.id,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Chat request timed out, using fallback reply"
                );
                FALLBACK_REPLY.to_string()
            }
        };

        self.session.append_message(Sender::Assistant, &text, None)
    }

    /// Send `text` with the given emotion and wait for the reply.
    ///
    /// Returns `None` (and touches nothing) for blank input, otherwise the
    /// appended assistant message.
    pub async fn send(
        &self,
        text: &str,
        current_emotion: Option<EmotionSample>,
    ) -> Option<ChatMessage> {
        let pending = self.begin(text, current_emotion)?;
        Some(self.complete(pending).await)
    }

    /// Non-blocking send using the session's latest emotion at call time.
    ///
    /// The user message is in the transcript when this returns; the reply is
    /// appended by a spawned task.
    pub fn submit(self: &Arc<Self>, text: &str) -> Option<JoinHandle<ChatMessage>> {
        let pending = self.begin(text, self.session.latest_emotion())?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.complete(pending).await }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serenity_core::{BackendError, Expression};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        reply: Result<String, u16>,
        delay: Duration,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, Option<Expression>)>>,
    }

    impl ScriptedBackend {
        fn ok(text: &str) -> Arc<Self> {
            Self::build(Ok(text.to_string()), Duration::ZERO)
        }

        fn failing(status: u16) -> Arc<Self> {
            Self::build(Err(status), Duration::ZERO)
        }

        fn build(reply: Result<String, u16>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn reply(
            &self,
            text: &str,
            emotion: Option<Expression>,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((text.to_string(), emotion));
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(BackendError::Api {
                    status: *status,
                    detail: "scripted".into(),
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn dispatcher(backend: Arc<ScriptedBackend>) -> (Arc<SessionState>, Arc<Dispatcher>) {
        let session = Arc::new(SessionState::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&session),
            backend,
            Duration::from_secs(1),
        ));
        (session, dispatcher)
    }

    #[tokio::test]
    async fn test_blank_input_is_inert() {
        let backend = ScriptedBackend::ok("unused");
        let (session, dispatcher) = dispatcher(backend.clone());

        assert!(dispatcher.send("", None).await.is_none());
        assert!(dispatcher.send("   ", None).await.is_none());
        assert!(dispatcher.submit("\t\n").is_none());

        assert_eq!(session.message_count(), 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_appends_user_then_assistant() {
        let backend = ScriptedBackend::ok("I hear you.");
        let (session, dispatcher) = dispatcher(backend.clone());
        let sad = EmotionSample::new(Expression::Sad, 0.8);

        let reply = dispatcher.send("I feel anxious", Some(sad.clone())).await.unwrap();
        assert_eq!(reply.text, "I hear you.");

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].text, "I feel anxious");
        assert_eq!(transcript[0].emotion_context, Some(sad));
        assert_eq!(transcript[1].sender, Sender::Assistant);
        assert_eq!(transcript[1].text, "I hear you.");

        let seen = backend.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("I feel anxious".to_string(), Some(Expression::Sad))]);
    }

    #[tokio::test]
    async fn test_failure_appends_fallback_and_keeps_user_message() {
        let (session, dispatcher) = dispatcher(ScriptedBackend::failing(500));

        let reply = dispatcher
            .send("I feel anxious", Some(EmotionSample::new(Expression::Sad, 0.8)))
            .await
            .unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "I feel anxious");
        assert_eq!(transcript[1].sender, Sender::Assistant);
        assert_eq!(transcript[1].text, FALLBACK_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_takes_fallback_path() {
        let session = Arc::new(SessionState::new());
        let backend = ScriptedBackend::build(Ok("too late".into()), Duration::from_secs(60));
        let dispatcher = Dispatcher::new(Arc::clone(&session), backend, Duration::from_secs(2));

        let reply = dispatcher.send("hello?", None).await.unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_submit_appends_user_message_immediately() {
        let backend = ScriptedBackend::build(Ok("later".into()), Duration::from_millis(50));
        let (session, dispatcher) = dispatcher(backend);

        let handle = dispatcher.submit("right away").unwrap();
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].text, "right away");

        let reply = handle.await.unwrap();
        assert_eq!(reply.text, "later");
        assert_eq!(session.message_count(), 2);
    }

    #[tokio::test]
    async fn test_submit_captures_emotion_at_send_time() {
        let backend = ScriptedBackend::build(Ok("ok".into()), Duration::from_millis(20));
        let (session, dispatcher) = dispatcher(backend.clone());

        session.set_latest_emotion(EmotionSample::new(Expression::Angry, 0.9));
        let handle = dispatcher.submit("first").unwrap();
        // Emotion changes while the request is in flight.
        session.set_latest_emotion(EmotionSample::new(Expression::Happy, 0.9));
        handle.await.unwrap();

        let transcript = session.transcript();
        assert_eq!(
            transcript[0].emotion_context.as_ref().map(|s| s.label),
            Some(Expression::Angry)
        );
        assert_eq!(
            backend.seen.lock().unwrap()[0].1,
            Some(Expression::Angry)
        );
    }

    #[tokio::test]
    async fn test_concurrent_submits_all_complete() {
        let backend = ScriptedBackend::build(Ok("ack".into()), Duration::from_millis(10));
        let (session, dispatcher) = dispatcher(backend.clone());

        let handles: Vec<_> = (0..5)
            .map(|i| dispatcher.submit(&format!("message {i}")).unwrap())
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 10);
        // The five user messages were appended first, in submit order.
        for (i, msg) in transcript.iter().take(5).enumerate() {
            assert_eq!(msg.sender, Sender::User);
            assert_eq!(msg.text, format!("message {i}"));
        }
        assert!(transcript.iter().skip(5).all(|m| m.sender == Sender::Assistant));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    }
}
