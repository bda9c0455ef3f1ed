//! Emotion sampler — periodic frame → inference → dominant label
//!
//! Each tick pulls the current frame, runs the inference adapter on it and,
//! if a face was scored, publishes the dominant expression through the
//! `on_sample` callback.
//!
//! Cycles are serialized: the loop awaits each cycle before waiting for the
//! next tick, and ticks missed while a cycle is running are skipped
//! (`MissedTickBehavior::Skip`), so a slow model never builds a backlog.
//!
//! Phases: `Idle` (not running) → `Cooldown` (waiting for a tick) ⇄
//! `Sampling` (cycle in flight) → `Idle` after `stop()`.

use serenity_core::{EmotionSample, FrameSource, InferenceAdapter, SessionState};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub type SampleCallback = Arc<dyn Fn(EmotionSample) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPhase {
    Idle,
    Sampling,
    Cooldown,
}

/// What a single cycle did. Only `Published` updates session state.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    FrameUnavailable,
    NoFace,
    Unscored,
    Failed(String),
    Published(EmotionSample),
}

struct Running {
    cancel: CancellationToken,
    // `false` once stopped; held while `on_sample` runs.
    active: Arc<Mutex<bool>>,
    phase: Arc<Mutex<SamplerPhase>>,
    task: JoinHandle<()>,
}

impl Running {
    /// True when called from the sampler's own loop task, i.e. from `on_sample`.
    fn on_loop_task(&self) -> bool {
        tokio::task::try_id() == Some(self.task.id())
    }

    fn deactivate(&self) {
        self.cancel.cancel();
        // The loop task already holds the gate while `on_sample` runs.
        if self.on_loop_task() {
            return;
        }
        // Waits out an `on_sample` call that is already executing.
        *lock(&self.active) = false;
    }
}

pub struct Sampler {
    session: Arc<SessionState>,
    inference_timeout: Duration,
    running: Mutex<Option<Running>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Sampler {
    pub fn new(session: Arc<SessionState>, inference_timeout: Duration) -> Self {
        Self {
            session,
            inference_timeout,
            running: Mutex::new(None),
        }
    }

    /// Begin sampling every `period`.
    ///
    /// Returns `false` without doing anything if the session's models are not
    /// ready yet or the sampler is already running. Must be called from within
    /// a tokio runtime.
    pub fn start(
        &self,
        frames: Arc<dyn FrameSource>,
        adapter: Arc<dyn InferenceAdapter>,
        period: Duration,
        on_sample: SampleCallback,
    ) -> bool {
        if !self.session.is_model_ready() {
            tracing::debug!("Sampler start ignored: models not ready");
            return false;
        }

        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!("Sampler start ignored: already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let active = Arc::new(Mutex::new(true));
        let phase = Arc::new(Mutex::new(SamplerPhase::Cooldown));

        let task = tokio::spawn(run_sampler_loop(
            frames,
            adapter,
            period.max(Duration::from_millis(1)),
            self.inference_timeout,
            on_sample,
            cancel.clone(),
            Arc::clone(&active),
            Arc::clone(&phase),
        ));

        tracing::info!(
            interval_ms = period.as_millis() as u64,
            timeout_ms = self.inference_timeout.as_millis() as u64,
            "Emotion sampler started"
        );

        *running = Some(Running {
            cancel,
            active,
            phase,
            task,
        });
        true
    }

    /// Cancel the cycle and any in-flight inference. Idempotent.
    ///
    /// Once this returns, `on_sample` is never invoked again for the stopped
    /// run. Safe to call from inside `on_sample`.
    pub fn stop(&self) {
        let Some(running) = lock(&self.running).take() else {
            return;
        };
        running.deactivate();
        running.task.abort();
        tracing::info!("Emotion sampler stopped");
    }

    /// Stop and wait for the loop task to finish.
    pub async fn shutdown(&self) {
        let running = lock(&self.running).take();
        if let Some(running) = running {
            running.deactivate();
            // A task cannot await its own handle.
            if running.on_loop_task() {
                running.task.abort();
                return;
            }
            // Cancelled or aborted, either way the loop is gone.
            let _ = running.task.await;
            tracing::info!("Emotion sampler shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn phase(&self) -> SamplerPhase {
        match lock(&self.running).as_ref() {
            Some(r) if !r.task.is_finished() => *lock(&r.phase),
            _ => SamplerPhase::Idle,
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_sampler_loop(
    frames: Arc<dyn FrameSource>,
    adapter: Arc<dyn InferenceAdapter>,
    period: Duration,
    inference_timeout: Duration,
    on_sample: SampleCallback,
    cancel: CancellationToken,
    active: Arc<Mutex<bool>>,
    phase: Arc<Mutex<SamplerPhase>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        *lock(&phase) = SamplerPhase::Cooldown;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        *lock(&phase) = SamplerPhase::Sampling;

        // Own task per cycle so an adapter panic is contained to the cycle.
        let frames_c = Arc::clone(&frames);
        let adapter_c = Arc::clone(&adapter);
        let mut cycle = tokio::spawn(async move {
            run_cycle(frames_c.as_ref(), adapter_c.as_ref(), inference_timeout).await
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cycle.abort();
                break;
            }
            joined = &mut cycle => match joined {
                Ok(outcome) => outcome,
                Err(e) => CycleOutcome::Failed(format!("cycle task failed: {e}")),
            },
        };

        match outcome {
            CycleOutcome::Published(sample) => {
                let gate = lock(&active);
                if !*gate || cancel.is_cancelled() {
                    break;
                }
                tracing::debug!(
                    label = %sample.label,
                    confidence = sample.confidence,
                    "Emotion sample published"
                );
                on_sample(sample);
            }
            CycleOutcome::Failed(reason) => {
                tracing::warn!(adapter = adapter.name(), reason = %reason, "Sampling cycle failed");
            }
            other => tracing::trace!(outcome = ?other, "Sampling cycle skipped"),
        }
    }

    *lock(&phase) = SamplerPhase::Idle;
}

/// A single sampling cycle.
///
/// Public for unit testing. Never panics on adapter errors: every failure
/// maps to a non-publishing outcome.
pub async fn run_cycle(
    frames: &dyn FrameSource,
    adapter: &dyn InferenceAdapter,
    inference_timeout: Duration,
) -> CycleOutcome {
    if !frames.is_ready() {
        return CycleOutcome::FrameUnavailable;
    }
    let Some(frame) = frames.current_frame() else {
        return CycleOutcome::FrameUnavailable;
    };

    let detections =
        match tokio::time::timeout(inference_timeout, adapter.detect_expressions(&frame)).await {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => return CycleOutcome::Failed(e.to_string()),
            Err(_) => {
                return CycleOutcome::Failed(format!(
                    "inference timed out after {}ms",
                    inference_timeout.as_millis()
                ))
            }
        };

    // Only the first detected face counts.
    let Some(face) = detections.into_iter().next() else {
        return CycleOutcome::NoFace;
    };

    match EmotionSample::from_scores(&face.scores) {
        Some(sample) => CycleOutcome::Published(sample),
        None => CycleOutcome::Unscored,
    }
}

// ============================================================================
// TESTS
// ============================================================================
