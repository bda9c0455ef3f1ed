pub mod dispatcher;
pub mod frames;
pub mod sampler;
pub mod video_session;
