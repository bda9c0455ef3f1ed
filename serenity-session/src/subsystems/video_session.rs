//! Video session — wires frames, inference, sampler and dispatcher together
//!
//! Lifecycle:
//! 1. `new` — session state with greeting, frame source leased, chat usable
//! 2. `load_and_start` — load models, flip `model_ready`, start sampling
//! 3. `teardown` (or drop) — stop the sampler, release the frame source once
//!
//! A model-load failure releases the frame source straight away; chat keeps
//! working without emotion context.

use serenity_core::config::SamplerConfig;
use serenity_core::{
    ChatBackend, ChatMessage, FrameSource, InferenceAdapter, ModelLoadError, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use super::frames::FrameLease;
use super::sampler::{SampleCallback, Sampler};

pub struct VideoSession {
    state: Arc<SessionState>,
    frames: FrameLease,
    adapter: Arc<dyn InferenceAdapter>,
    sampler: Sampler,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl VideoSession {
    pub fn new(
        greeting: &str,
        sampler_config: &SamplerConfig,
        frames: Arc<dyn FrameSource>,
        adapter: Arc<dyn InferenceAdapter>,
        backend: Arc<dyn ChatBackend>,
        request_timeout: Duration,
    ) -> Self {
        let state = Arc::new(SessionState::with_greeting(greeting));
        let sampler = Sampler::new(Arc::clone(&state), sampler_config.inference_timeout());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&state),
            backend,
            request_timeout,
        ));

        Self {
            state,
            frames: FrameLease::new(frames),
            adapter,
            sampler,
            dispatcher,
            interval: sampler_config.interval(),
        }
    }

    /// Load models, then start sampling into the session state.
    ///
    /// On failure the frame source is released and the sampler never starts.
    pub async fn load_and_start(&self) -> Result<(), ModelLoadError> {
        if let Err(e) = self.adapter.load_models().await {
            tracing::error!(adapter = self.adapter.name(), error = %e, "Failed to load models");
            self.frames.release();
            return Err(e);
        }

        self.state.mark_model_ready();
        tracing::info!(adapter = self.adapter.name(), "Models ready");

        let state = Arc::clone(&self.state);
        let on_sample: SampleCallback = Arc::new(move |sample| state.set_latest_emotion(sample));
        self.sampler.start(
            self.frames.source(),
            Arc::clone(&self.adapter),
            self.interval,
            on_sample,
        );
        Ok(())
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Submit user text; see [`Dispatcher::submit`].
    pub fn submit(&self, text: &str) -> Option<JoinHandle<ChatMessage>> {
        self.dispatcher.submit(text)
    }

    /// Stop sampling (cancelling any in-flight inference) and release the
    /// frame source.
    pub async fn teardown(self) {
        self.sampler.shutdown().await;
        self.frames.release();
        tracing::info!(messages = self.state.message_count(), "Video session closed");
    }
}

impl Drop for VideoSession {
    fn drop(&mut self) {
        self.sampler.stop();
        self.frames.release();
    }
}
