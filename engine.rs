use crate::config::{AppPaths, DetectionConfig};
use crate::detection::{DetrDetector, Detector};
use crate::onnx;
use crate::sentiment::SentimentAnalyzer;
use serde::Serialize;

/// The two pretrained models, loaded once. A slot that failed to load stays
/// empty for the rest of the process; `errors` holds the messages to show.
pub struct DetectionEngine {
    detector: Option<Box<dyn Detector>>,
    sentiment: Option<SentimentAnalyzer>,
    provider: Option<onnx::InferenceProvider>,
    errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub detector_loaded: bool,
    pub sentiment_loaded: bool,
    pub provider: Option<String>,
    pub errors: Vec<String>,
}

impl DetectionEngine {
    pub fn load(config: &DetectionConfig, paths: &AppPaths) -> Self {
        if !onnx::onnx_enabled() {
            let msg = "ONNX inference disabled; set MARQUE_ENABLE_ONNX=1 to enable.";
            log::warn!("{msg}");
            return Self::empty(vec![msg.to_string()]);
        }

        let mut errors = Vec::new();
        let detect_path = paths.resolve_model(&config.detection_model_path);
        let (detector, provider) = match DetrDetector::load(&detect_path, config) {
            Ok(detector) => {
                let provider = detector.provider();
                (Some(Box::new(detector) as Box<dyn Detector>), Some(provider))
            }
            Err(err) => {
                log::warn!("Failed to load detection model {}: {}", detect_path.display(), err);
                errors.push(format!("Error loading models: {err}"));
                (None, None)
            }
        };

        let sentiment_path = paths.resolve_model(&config.sentiment_model_path);
        let sentiment = match SentimentAnalyzer::load(&sentiment_path, config) {
            Ok(analyzer) => Some(analyzer),
            Err(err) => {
                log::warn!(
                    "Failed to load sentiment model {}: {}",
                    sentiment_path.display(),
                    err
                );
                errors.push(format!("Error loading models: {err}"));
                None
            }
        };

        Self {
            detector,
            sentiment,
            provider,
            errors,
        }
    }

    pub fn empty(errors: Vec<String>) -> Self {
        Self {
            detector: None,
            sentiment: None,
            provider: None,
            errors,
        }
    }

    pub fn detector(&self) -> Option<&dyn Detector> {
        self.detector.as_deref()
    }

    pub fn sentiment(&self) -> Option<&SentimentAnalyzer> {
        self.sentiment.as_ref()
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            detector_loaded: self.detector.is_some(),
            sentiment_loaded: self.sentiment.is_some(),
            provider: self.provider.map(|p| p.label().to_string()),
            errors: self.errors.clone(),
        }
    }
}
