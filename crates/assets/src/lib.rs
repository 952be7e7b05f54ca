//! Source image loading.
//!
//! The warp samples a single RGBA8 image. Loading has unbounded latency, so
//! it runs off the caller's thread and reports back with the [`LoadTicket`]
//! it was issued under. Receivers compare tickets and drop stale results.
//!
//! # Invariants
//! - A `SourceImage` always has non-zero dimensions and exactly
//!   `width * height * 4` bytes.
//! - Loaders never retry; a failure is final for that ticket.

use liquidgrid_common::LoadTicket;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decoded image in tightly packed RGBA8, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl SourceImage {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, LoadError> {
        if width == 0 || height == 0 {
            return Err(LoadError::Empty { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(LoadError::BufferSize {
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A procedurally generated checkerboard, handy when no file is given.
    pub fn checkerboard(width: u32, height: u32, cell: u32) -> Result<Self, LoadError> {
        let cell = cell.max(1);
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let u = (x * 255 / width.max(1)) as u8;
                let v = (y * 255 / height.max(1)) as u8;
                if light {
                    rgba.extend_from_slice(&[230, 230 - v / 3, 200 + u / 5, 255]);
                } else {
                    rgba.extend_from_slice(&[40 + u / 2, 60, 90 + v / 2, 255]);
                }
            }
        }
        Self::from_rgba(width, height, rgba)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Natural aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

/// Errors from image loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Decode an image file into RGBA8. The format is sniffed from content.
pub fn decode_image(path: impl AsRef<Path>) -> Result<SourceImage, LoadError> {
    let path = path.as_ref();
    let decoded = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .into_rgba8();
    let (width, height) = decoded.dimensions();
    tracing::debug!(path = %path.display(), width, height, "decoded source image");
    SourceImage::from_rgba(width, height, decoded.into_raw())
}

/// Where a source image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    File(PathBuf),
    /// Already decoded; completes without touching the filesystem.
    Memory(Arc<SourceImage>),
}

impl ImageSource {
    pub fn load(&self) -> Result<Arc<SourceImage>, LoadError> {
        match self {
            ImageSource::File(path) => decode_image(path).map(Arc::new),
            ImageSource::Memory(image) => Ok(Arc::clone(image)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Memory(image) => {
                format!("<memory {}x{}>", image.width(), image.height())
            }
        }
    }
}

/// Outcome of one load request.
#[derive(Debug)]
pub struct LoadCompletion {
    pub ticket: LoadTicket,
    pub result: Result<Arc<SourceImage>, LoadError>,
}

/// Starts image loads. Completion is reported out of band by the
/// implementation, tagged with the ticket passed here.
pub trait ImageLoader {
    fn request(&mut self, ticket: LoadTicket);
}

type CompletionSink = dyn Fn(LoadCompletion) + Send + Sync;

/// Decodes on a short-lived worker thread per request and hands the result
/// to `sink` from that thread.
pub struct ThreadedImageLoader {
    source: ImageSource,
    sink: Arc<CompletionSink>,
}

impl ThreadedImageLoader {
    pub fn new(
        source: ImageSource,
        sink: impl Fn(LoadCompletion) + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            sink: Arc::new(sink),
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }
}

impl ImageLoader for ThreadedImageLoader {
    fn request(&mut self, ticket: LoadTicket) {
        let source = self.source.clone();
        let sink = Arc::clone(&self.sink);
        tracing::debug!(ticket = ticket.0, source = %source.describe(), "image load requested");
        let spawned = std::thread::Builder::new()
            .name("image-loader".into())
            .spawn(move || {
                let result = source.load();
                if let Err(e) = &result {
                    tracing::warn!(ticket = ticket.0, error = %e, "image load failed");
                }
                sink(LoadCompletion { ticket, result });
            });
        if let Err(e) = spawned {
            (self.sink)(LoadCompletion {
                ticket,
                result: Err(LoadError::Io(e)),
            });
        }
    }
}

/// Records requests without doing any work. The owner completes them
/// explicitly, which makes load ordering scriptable.
#[derive(Debug, Default)]
pub struct QueuedImageLoader {
    pending: Vec<LoadTicket>,
    requested: usize,
}

impl QueuedImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every ticket requested since the last call.
    pub fn take_pending(&mut self) -> Vec<LoadTicket> {
        std::mem::take(&mut self.pending)
    }

    /// Total number of requests ever made.
    pub fn requested(&self) -> usize {
        self.requested
    }
}

impl ImageLoader for QueuedImageLoader {
    fn request(&mut self, ticket: LoadTicket) {
        self.pending.push(ticket);
        self.requested += 1;
    }
}
