use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::error::RenderError;
use crate::render::background::cover_crop;

/// Which spectrum visualization is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizerMode {
    #[default]
    Bars,
    Radial,
}

impl fmt::Display for VisualizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bars => write!(f, "bars"),
            Self::Radial => write!(f, "radial"),
        }
    }
}

impl FromStr for VisualizerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bars" => Ok(Self::Bars),
            "radial" => Ok(Self::Radial),
            other => Err(format!("unknown visualizer mode '{}' (expected bars or radial)", other)),
        }
    }
}

/// Background image slot.
///
/// Decoding happens off the control thread; until the image is ready the
/// renderer draws the generated gradient instead.
#[derive(Debug, Default)]
pub enum BackgroundAsset {
    /// No image chosen
    #[default]
    None,
    /// Decode in flight
    Pending {
        path: PathBuf,
        receiver: oneshot::Receiver<Result<RgbImage, RenderError>>,
    },
    /// Decoded and cover-cropped to the canvas
    Ready(Arc<RgbImage>),
    /// Decode failed; treated like no image
    Failed(RenderError),
}

impl BackgroundAsset {
    /// Decode `path` on the blocking pool; must be called inside a tokio runtime
    pub fn load_in_background(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        let path = path.into();
        let (sender, receiver) = oneshot::channel();
        let job_path = path.clone();

        tokio::task::spawn_blocking(move || {
            let result = Self::decode(&job_path, width, height);
            // Receiver may be gone if the asset was replaced meanwhile
            let _ = sender.send(result);
        });

        Self::Pending { path, receiver }
    }

    /// Decode on the current thread
    pub fn load_blocking(path: &Path, width: u32, height: u32) -> Self {
        match Self::decode(path, width, height) {
            Ok(image) => Self::Ready(Arc::new(image)),
            Err(e) => {
                warn!("{}", e);
                Self::Failed(e)
            }
        }
    }

    /// Wrap an already-decoded image, cropping it to the canvas
    pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
        Self::Ready(Arc::new(cover_crop(image, width, height)))
    }

    fn decode(path: &Path, width: u32, height: u32) -> Result<RgbImage, RenderError> {
        let image = image::open(path)
            .map_err(|_| RenderError::AssetLoadFailed { path: path.display().to_string() })?
            .to_rgb8();
        debug!("Decoded background {:?} ({}x{})", path, image.width(), image.height());
        Ok(cover_crop(&image, width, height))
    }

    /// Move a finished decode into `Ready`/`Failed`; never blocks
    pub fn poll(&mut self) {
        let outcome = match self {
            Self::Pending { receiver, path } => match receiver.try_recv() {
                Ok(result) => Some(result),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    Some(Err(RenderError::AssetLoadFailed { path: path.display().to_string() }))
                }
            },
            _ => None,
        };

        match outcome {
            Some(Ok(image)) => *self = Self::Ready(Arc::new(image)),
            Some(Err(e)) => {
                warn!("Background unavailable, using gradient: {}", e);
                *self = Self::Failed(e);
            }
            None => {}
        }
    }

    /// The prepared image, if fully loaded
    pub fn ready_image(&self) -> Option<&RgbImage> {
        match self {
            Self::Ready(image) => Some(image.as_ref()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Everything the frame renderer needs besides the analysis data
#[derive(Debug)]
pub struct RenderConfig {
    pub mode: VisualizerMode,
    pub background: BackgroundAsset,
    pub title: String,
    pub caption: String,
    pub width: u32,
    pub height: u32,
}

impl RenderConfig {
    pub fn new(title: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            mode: VisualizerMode::default(),
            background: BackgroundAsset::None,
            title: title.into(),
            caption: caption.into(),
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
        }
    }

    pub fn with_mode(mut self, mode: VisualizerMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("bars".parse::<VisualizerMode>().unwrap(), VisualizerMode::Bars);
        assert_eq!("RADIAL".parse::<VisualizerMode>().unwrap(), VisualizerMode::Radial);
        assert!("waves".parse::<VisualizerMode>().is_err());
        assert_eq!(VisualizerMode::Radial.to_string(), "radial");
    }

    #[test]
    fn test_default_config_is_portrait() {
        let config = RenderConfig::default();
        assert_eq!((config.width, config.height), (540, 960));
        assert_eq!(config.mode, VisualizerMode::Bars);
        assert!(config.background.ready_image().is_none());
    }

    #[test]
    fn test_from_image_is_cropped_to_canvas() {
        let source = RgbImage::from_pixel(100, 100, Rgb([10, 20, 30]));
        let asset = BackgroundAsset::from_image(&source, 54, 96);
        let image = asset.ready_image().unwrap();
        assert_eq!(image.dimensions(), (54, 96));
    }

    #[test]
    fn test_missing_file_fails() {
        let asset = BackgroundAsset::load_blocking(Path::new("/no/such/image.png"), 54, 96);
        assert!(matches!(asset, BackgroundAsset::Failed(_)));
        assert!(asset.ready_image().is_none());
    }

    #[tokio::test]
    async fn test_background_load_completes_via_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        RgbImage::from_pixel(20, 10, Rgb([200, 0, 0])).save(&path).unwrap();

        let mut asset = BackgroundAsset::load_in_background(&path, 54, 96);
        for _ in 0..200 {
            asset.poll();
            if !asset.is_pending() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let image = asset.ready_image().expect("background should be ready");
        assert_eq!(image.dimensions(), (54, 96));
    }
}
