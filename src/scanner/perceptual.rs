//! Perceptual fingerprints for similarity detection.
//!
//! Images are fingerprinted directly. Videos are fingerprinted from a single
//! frame at the temporal midpoint, extracted by an external `ffmpeg`.
//! Whether video support is available is resolved once at startup into a
//! [`Capabilities`] value and carried in the [`FingerprintStrategy`], so no
//! call site checks for tools on its own.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extension_of;

/// A perceptual fingerprint, compared by Hamming distance.
pub type Fingerprint = ImageHash;

/// Image extensions eligible for fingerprinting.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp", ".gif", ".tiff", ".webp"];

/// Video extensions eligible for fingerprinting.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".wmv", ".m4v"];

/// Side length of the hash grid; fingerprints are `HASH_SIZE * HASH_SIZE` bits.
pub const HASH_SIZE: u32 = 8;

/// Supported perceptual hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// aHash (Average Hash) - mean intensity over a downsampled grayscale image.
    #[default]
    Ahash,
    /// dHash (Difference Hash) - gradient-based.
    Dhash,
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    Phash,
}

impl PerceptualAlgorithm {
    /// Default similarity threshold (Hamming distance) for this algorithm.
    #[must_use]
    pub fn default_threshold(&self) -> u32 {
        match self {
            Self::Ahash => 5,
            Self::Dhash => 4,
            Self::Phash => 10,
        }
    }
}

impl std::fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ahash => write!(f, "aHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Phash => write!(f, "pHash"),
        }
    }
}

/// Kind of media a file extension maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video container
    Video,
}

impl MediaKind {
    /// Classify a path by its extension.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        let ext = extension_of(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),

    /// Video fingerprinting was requested but ffmpeg is unavailable.
    #[error("Video fingerprinting unavailable for {0}: ffmpeg not found")]
    VideoUnsupported(String),

    /// Frame extraction failed.
    #[error("Failed to extract frame from {path}: {message}")]
    FrameExtraction {
        /// Video path
        path: String,
        /// Tool output or error
        message: String,
    },
}

/// Optional capabilities detected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `ffmpeg` and `ffprobe` are runnable, so videos can be fingerprinted.
    pub video: bool,
}

impl Capabilities {
    /// Probe the environment for external tools.
    #[must_use]
    pub fn detect() -> Self {
        let video = tool_available("ffmpeg") && tool_available("ffprobe");
        log::debug!("Video fingerprinting available: {}", video);
        Self { video }
    }

    /// Capabilities with no external tools.
    #[must_use]
    pub fn images_only() -> Self {
        Self { video: false }
    }
}

fn tool_available(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Computes perceptual fingerprints for images and video frames.
#[derive(Debug, Clone)]
pub struct PerceptualHasher {
    algorithm: PerceptualAlgorithm,
    capabilities: Capabilities,
}

impl PerceptualHasher {
    /// Create a hasher for the given algorithm and capabilities.
    #[must_use]
    pub fn new(algorithm: PerceptualAlgorithm, capabilities: Capabilities) -> Self {
        Self {
            algorithm,
            capabilities,
        }
    }

    /// Get the algorithm used by this hasher.
    #[must_use]
    pub fn algorithm(&self) -> PerceptualAlgorithm {
        self.algorithm
    }

    /// Get the capabilities this hasher was built with.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether a file of this kind can be fingerprinted.
    #[must_use]
    pub fn supports(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => true,
            MediaKind::Video => self.capabilities.video,
        }
    }

    /// Fingerprint a decoded image.
    #[must_use]
    pub fn hash_image(&self, img: &DynamicImage) -> Fingerprint {
        let mut config = HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE);
        config = match self.algorithm {
            PerceptualAlgorithm::Ahash => config.hash_alg(HashAlg::Mean),
            PerceptualAlgorithm::Dhash => config.hash_alg(HashAlg::Gradient),
            PerceptualAlgorithm::Phash => config.hash_alg(HashAlg::Median).preproc_dct(),
        };
        config.to_hasher().hash_image(img)
    }

    /// Fingerprint an image file.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the image cannot be decoded.
    pub fn compute_image(&self, path: &Path) -> Result<Fingerprint, PerceptualError> {
        let img = image::open(path)
            .map_err(|e| PerceptualError::LoadError(path.display().to_string(), e))?;
        Ok(self.hash_image(&img))
    }

    /// Fingerprint the frame at the temporal midpoint of a video.
    ///
    /// # Errors
    ///
    /// Returns `VideoUnsupported` without ffmpeg, or `FrameExtraction` /
    /// `LoadError` if the frame cannot be produced or decoded.
    pub fn compute_video(&self, path: &Path) -> Result<Fingerprint, PerceptualError> {
        if !self.capabilities.video {
            return Err(PerceptualError::VideoUnsupported(
                path.display().to_string(),
            ));
        }
        let midpoint = probe_duration(path)? / 2.0;
        let frame = extract_frame(path, midpoint)?;
        let img = image::load_from_memory_with_format(&frame, image::ImageFormat::Png)
            .map_err(|e| PerceptualError::LoadError(path.display().to_string(), e))?;
        Ok(self.hash_image(&img))
    }

    /// Fingerprint a file according to its media kind.
    ///
    /// # Errors
    ///
    /// See [`compute_image`](Self::compute_image) and
    /// [`compute_video`](Self::compute_video).
    pub fn compute(&self, path: &Path, kind: MediaKind) -> Result<Fingerprint, PerceptualError> {
        match kind {
            MediaKind::Image => self.compute_image(path),
            MediaKind::Video => self.compute_video(path),
        }
    }
}

fn frame_error(path: &Path, message: impl Into<String>) -> PerceptualError {
    PerceptualError::FrameExtraction {
        path: path.display().to_string(),
        message: message.into(),
    }
}

/// Duration of a video in seconds, as reported by ffprobe.
fn probe_duration(path: &Path) -> Result<f64, PerceptualError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| frame_error(path, e.to_string()))?;
    if !output.status.success() {
        return Err(frame_error(
            path,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    // Streams without a container duration report "N/A"; use the first frame.
    Ok(String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0)
        .max(0.0))
}

/// Extract a single PNG-encoded frame at `seconds`.
fn extract_frame(path: &Path, seconds: f64) -> Result<Vec<u8>, PerceptualError> {
    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{seconds:.3}"), "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .output()
        .map_err(|e| frame_error(path, e.to_string()))?;
    if !output.status.success() || output.stdout.is_empty() {
        return Err(frame_error(
            path,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(output.stdout)
}

/// How the hashing pipeline fingerprints each file.
///
/// Resolved once from configuration; the pipeline never checks for tools
/// or flags on its own.
#[derive(Debug, Clone, Default)]
pub enum FingerprintStrategy {
    /// Strong digest only.
    #[default]
    DigestOnly,
    /// Strong digest plus a perceptual fingerprint for media files.
    DigestAndPerceptual(PerceptualHasher),
}

impl FingerprintStrategy {
    /// Build the strategy from the similarity toggle.
    #[must_use]
    pub fn from_settings(
        enabled: bool,
        algorithm: PerceptualAlgorithm,
        capabilities: Capabilities,
    ) -> Self {
        if enabled {
            Self::DigestAndPerceptual(PerceptualHasher::new(algorithm, capabilities))
        } else {
            Self::DigestOnly
        }
    }

    /// Whether perceptual fingerprints are produced at all.
    #[must_use]
    pub fn is_perceptual(&self) -> bool {
        matches!(self, Self::DigestAndPerceptual(_))
    }

    /// Whether `path` will receive a fingerprint under this strategy.
    #[must_use]
    pub fn wants_fingerprint(&self, path: &Path) -> bool {
        match self {
            Self::DigestOnly => false,
            Self::DigestAndPerceptual(hasher) => {
                MediaKind::of(path).is_some_and(|kind| hasher.supports(kind))
            }
        }
    }

    /// Fingerprint `path` if the strategy applies to it.
    ///
    /// Returns `None` when the file is not eligible.
    #[must_use]
    pub fn fingerprint(&self, path: &Path) -> Option<Result<Fingerprint, PerceptualError>> {
        match self {
            Self::DigestOnly => None,
            Self::DigestAndPerceptual(hasher) => {
                let kind = MediaKind::of(path)?;
                if !hasher.supports(kind) {
                    return None;
                }
                Some(hasher.compute(path, kind))
            }
        }
    }
}
