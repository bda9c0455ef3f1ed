use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerenityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source error: {0}")]
    FrameSource(String),
}
