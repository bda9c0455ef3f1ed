//! Frame sources and scoped frame-source ownership.

use serenity_core::{Frame, FrameSource, SerenityError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Replays image files from a directory as a camera feed, in file-name order,
/// looping back to the start.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    frames: Mutex<Vec<Frame>>,
    cursor: AtomicUsize,
    released: AtomicBool,
}

impl std::fmt::Debug for DirectoryFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryFrameSource")
            .field("dir", &self.dir)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DirectoryFrameSource {
    /// Decode every image in `dir` to grayscale. Files that fail to decode are
    /// skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self, SerenityError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match decode_frame(path) {
                Ok(frame) => frames.push(frame),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping frame"),
            }
        }

        tracing::info!(dir = %dir.display(), frames = frames.len(), "Frame directory opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            frames: Mutex::new(frames),
            cursor: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decode_frame(path: &Path) -> Result<Frame, SerenityError> {
    let image = image::open(path)
        .map_err(|e| SerenityError::FrameSource(e.to_string()))?
        .into_luma8();
    let (width, height) = image.dimensions();
    Frame::new(width, height, image.into_raw())
        .map_err(|e| SerenityError::FrameSource(e.to_string()))
}

impl FrameSource for DirectoryFrameSource {
    fn is_ready(&self) -> bool {
        !self.released.load(Ordering::Acquire) && !self.is_empty()
    }

    fn current_frame(&self) -> Option<Frame> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        let frames = self.frames.lock().ok()?;
        if frames.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % frames.len();
        Some(frames[idx].clone())
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
        tracing::info!(dir = %self.dir.display(), "Frame source released");
    }
}

/// Owns a frame source for the lifetime of a session and releases it exactly
/// once, on `release()` or on drop, whichever comes first.
pub struct FrameLease {
    source: Arc<dyn FrameSource>,
    released: AtomicBool,
}

impl FrameLease {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            released: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> Arc<dyn FrameSource> {
        Arc::clone(&self.source)
    }

    /// Release the source. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.source.release();
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_image(dir: &Path, name: &str, shade: u8) {
        GrayImage::from_pixel(4, 4, Luma([shade]))
            .save(dir.join(name))
            .expect("Failed to write test image");
    }

    #[test]
    fn test_directory_source_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 200);
        write_image(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectoryFrameSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert!(source.is_ready());

        let shades: Vec<u8> = (0..3)
            .map(|_| source.current_frame().unwrap().luma[0])
            .collect();
        assert_eq!(shades, vec![10, 200, 10]);
    }

    #[test]
    fn test_empty_directory_is_never_ready() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryFrameSource::open(dir.path()).unwrap();
        assert!(!source.is_ready());
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_undecodable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        write_image(dir.path(), "ok.png", 50);

        let source = DirectoryFrameSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_released_source_stops_producing() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 10);
        let source = DirectoryFrameSource::open(dir.path()).unwrap();
        source.release();
        assert!(!source.is_ready());
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = DirectoryFrameSource::open(Path::new("/nonexistent/frames"));
        assert!(matches!(result, Err(SerenityError::Io(_))));
    }

    struct CountingSource(AtomicUsize);

    impl FrameSource for CountingSource {
        fn is_ready(&self) -> bool {
            true
        }
        fn current_frame(&self) -> Option<Frame> {
            None
        }
        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lease_releases_exactly_once() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let lease = FrameLease::new(source.clone());
        assert!(lease.release());
        assert!(!lease.release());
        drop(lease);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        drop(FrameLease::new(source.clone()));
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }
}
