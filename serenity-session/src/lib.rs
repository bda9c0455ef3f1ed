pub mod subsystems;

pub use subsystems::dispatcher::{Dispatcher, FALLBACK_REPLY};
pub use subsystems::frames::{DirectoryFrameSource, FrameLease};
pub use subsystems::sampler::{CycleOutcome, SampleCallback, Sampler, SamplerPhase};
pub use subsystems::video_session::VideoSession;
