//! Shared session state for one video-therapy session.
//!
//! Written by the sampler (`latest_emotion`) and the dispatcher
//! (`transcript`), read by the frontend. One lock per field.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::models::{ChatMessage, EmotionSample, Sender};

const EVENT_CAPACITY: usize = 64;

struct Transcript {
    next_id: u64,
    messages: Vec<ChatMessage>,
}

pub struct SessionState {
    latest_emotion: Mutex<Option<EmotionSample>>,
    transcript: Mutex<Transcript>,
    model_ready: AtomicBool,
    events: broadcast::Sender<ChatMessage>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("model_ready", &self.is_model_ready())
            .field("messages", &self.lock_transcript().messages.len())
            .finish_non_exhaustive()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while holding either lock cannot leave the data half-written
// (single overwrite / single push), so poisoning is ignored.
fn relock<T>(result: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            latest_emotion: Mutex::new(None),
            transcript: Mutex::new(Transcript {
                next_id: 1,
                messages: Vec::new(),
            }),
            model_ready: AtomicBool::new(false),
            events,
        }
    }

    /// New session whose transcript opens with an assistant greeting.
    pub fn with_greeting(greeting: &str) -> Self {
        let state = Self::new();
        if !greeting.trim().is_empty() {
            state.append_message(Sender::Assistant, greeting, None);
        }
        state
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Transcript> {
        relock(self.transcript.lock())
    }

    pub fn latest_emotion(&self) -> Option<EmotionSample> {
        relock(self.latest_emotion.lock()).clone()
    }

    /// Overwrite the latest emotion. No merge, no history.
    pub fn set_latest_emotion(&self, sample: EmotionSample) {
        *relock(self.latest_emotion.lock()) = Some(sample);
    }

    /// Append to the transcript. Ids are allocated under the transcript lock,
    /// so id order matches append order.
    pub fn append_message(
        &self,
        sender: Sender,
        text: &str,
        emotion_context: Option<EmotionSample>,
    ) -> ChatMessage {
        let mut transcript = self.lock_transcript();
        let message = ChatMessage {
            id: transcript.next_id,
            sender,
            text: text.to_string(),
            emotion_context,
        };
        transcript.next_id += 1;
        transcript.messages.push(message.clone());
        // Sent under the lock so subscribers observe append order.
        // No subscribers is fine.
        let _ = self.events.send(message.clone());
        message
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.lock_transcript().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.lock_transcript().messages.len()
    }

    /// Receive every message appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.events.subscribe()
    }

    pub fn is_model_ready(&self) -> bool {
        self.model_ready.load(Ordering::Acquire)
    }

    /// Flip `model_ready` to true. Returns `false` if it was already set.
    pub fn mark_model_ready(&self) -> bool {
        self.model_ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
