use super::dense::{ensure_model, DenseClassifierBackend, HttpFetcher};
use super::detector::DetectorBackend;
use super::selfie::SelfieMulticlassModel;
use super::types::SegmentationBackend;
use super::yolo::YoloSegModel;
use crate::config::SegmenterConfig;
use crate::error::{PipelineError, Result};
use std::collections::BTreeMap;

/// Builds one backend instance from the shared segmenter configuration
pub type BackendConstructor = fn(&SegmenterConfig) -> Result<Box<dyn SegmentationBackend>>;

/// Maps backend names to their constructors.
///
/// Adding a strategy means registering another entry; `Segmenter` itself
/// does not change.
#[derive(Clone)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Registry with no entries
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) a constructor under `name`
    pub fn register(&mut self, name: impl Into<String>, constructor: BackendConstructor) -> &mut Self {
        self.constructors.insert(name.into(), constructor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the backend registered under `name`
    pub fn build(&self, name: &str, config: &SegmenterConfig) -> Result<Box<dyn SegmentationBackend>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PipelineError::UnknownBackend {
                name: name.to_string(),
                registered: self.names().collect::<Vec<_>>().join(", "),
            })?;

        constructor(config)
    }
}

impl Default for BackendRegistry {
    /// The built-in strategies, plus the `yolo` and `mediapipe` aliases
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("detector", build_detector)
            .register("yolo", build_detector)
            .register("dense-classifier", build_dense_classifier)
            .register("mediapipe", build_dense_classifier);
        registry
    }
}

fn build_detector(config: &SegmenterConfig) -> Result<Box<dyn SegmentationBackend>> {
    let path = config.detector_model_path();
    let model = YoloSegModel::new(&path, &config.detector)?;
    Ok(Box::new(DetectorBackend::new(model, &config.detector)))
}

fn build_dense_classifier(config: &SegmenterConfig) -> Result<Box<dyn SegmentationBackend>> {
    let path = ensure_model(&config.dense, &config.weights, &HttpFetcher::default())?;
    let model = SelfieMulticlassModel::new(&path, &config.dense)?;
    Ok(Box::new(DenseClassifierBackend::new(model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightsConfig;

    #[test]
    fn default_registry_has_builtin_strategies() {
        let registry = BackendRegistry::default();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["dense-classifier", "detector", "mediapipe", "yolo"]);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = BackendRegistry::default()
            .build("deeplab", &SegmenterConfig::default())
            .err()
            .unwrap();
        match err {
            PipelineError::UnknownBackend { name, registered } => {
                assert_eq!(name, "deeplab");
                assert!(registered.contains("detector"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detector_without_weights_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmenterConfig {
            weights: WeightsConfig::new(dir.path()),
            ..Default::default()
        };
        let err = BackendRegistry::default()
            .build("detector", &config)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ModelLoad { .. }));
    }

    #[test]
    fn dense_classifier_with_missing_custom_weights_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SegmenterConfig {
            weights: WeightsConfig::new(dir.path()),
            ..Default::default()
        };
        config.dense.model_path = Some(dir.path().join("elsewhere").join("model.onnx"));

        let err = BackendRegistry::default()
            .build("dense-classifier", &config)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ModelLoad { .. }));
    }
}
