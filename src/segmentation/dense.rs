use super::types::{Mask, SegmentationBackend};
use crate::config::{DenseClassifierConfig, WeightsConfig};
use crate::error::{PipelineError, Result};
use image::{GrayImage, RgbImage};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Weight file extensions ONNX Runtime can load
const LOADABLE_EXTENSIONS: &[&str] = &["onnx", "ort"];

/// Model emitting a per-pixel category id map (0 = background)
pub trait CategoryModel {
    /// Category map at the frame's resolution
    fn categorize(&mut self, frame: &RgbImage) -> Result<GrayImage>;
}

/// Downloads a remote model asset to a local file
pub trait AssetFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Blocking HTTP(S) GET
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let fail = |reason: String| PipelineError::model_load(destination, reason);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| fail(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| fail(format!("failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(fail(format!(
                "HTTP error {} fetching {url}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| fail(format!("failed to read body of {url}: {e}")))?;

        write_atomically(destination, &bytes)
            .map_err(|e| fail(format!("failed to write asset: {e}")))?;

        tracing::info!(
            "Fetched {} bytes from {} into {}",
            bytes.len(),
            url,
            destination.display()
        );
        Ok(())
    }
}

/// Stage `bytes` in a temporary file beside `destination`, then rename it
/// into place. An interrupted write never leaves a partial file at
/// `destination`.
pub(crate) fn write_atomically(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// Reject weights ONNX Runtime cannot open (e.g. a `.tflite` asset)
fn require_loadable(path: &Path) -> Result<()> {
    let loadable = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LOADABLE_EXTENSIONS.iter().any(|l| ext.eq_ignore_ascii_case(l)));

    if loadable {
        Ok(())
    } else {
        Err(PipelineError::model_load(
            path,
            "not an ONNX model; point --model-url or --model at an ONNX export",
        ))
    }
}

/// Resolve the dense classifier's weights to a local file, fetching the
/// remote asset if needed.
///
/// - a configured path that exists is used as-is
/// - a configured path that is missing and is not the download location fails
/// - otherwise the asset is fetched once into `<weights dir>/<remote file name>`
///
/// Weights that are not ONNX are rejected before anything is fetched or
/// reused.
pub fn ensure_model(
    config: &DenseClassifierConfig,
    weights: &WeightsConfig,
    fetcher: &dyn AssetFetcher,
) -> Result<PathBuf> {
    let download_path = config.download_path(weights);

    if let Some(path) = &config.model_path {
        if path.is_file() {
            require_loadable(path)?;
            return Ok(path.clone());
        }
        if *path != download_path {
            return Err(PipelineError::model_load(path, "weights file not found"));
        }
    }

    require_loadable(&download_path)?;

    if download_path.is_file() {
        tracing::debug!("Reusing downloaded asset {}", download_path.display());
        return Ok(download_path);
    }

    fs::create_dir_all(&weights.dir).map_err(|e| {
        PipelineError::model_load(&weights.dir, format!("failed to create weights directory: {e}"))
    })?;

    tracing::info!(
        "No local dense classifier weights, fetching {}",
        config.model_url
    );
    fetcher.fetch(&config.model_url, &download_path)?;

    Ok(download_path)
}

/// Dense-classifier strategy: the model's category map is the mask
pub struct DenseClassifierBackend<M> {
    model: M,
}

impl<M: CategoryModel> DenseClassifierBackend<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: CategoryModel> SegmentationBackend for DenseClassifierBackend<M> {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("dense_segment").entered();

        let categories = self.model.categorize(frame)?;
        let frame_size = frame.dimensions();
        if categories.dimensions() != frame_size {
            return Err(PipelineError::inference(format!(
                "category map is {:?} but frame is {:?}",
                categories.dimensions(),
                frame_size
            )));
        }

        Ok(Mask::categorical(categories))
    }

    fn name(&self) -> &'static str {
        "dense-classifier"
    }
}
