//! Engine configuration.
//!
//! Deserialized by the embedding application from whatever source it
//! prefers; every field has a default so an empty document is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::executor::ChunkedExecutor;
use crate::face::DetectionParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker count for the chunked executor. `None` uses the rayon pool size.
    pub workers: Option<usize>,
    /// Cascade model for face detection. Without it the filter is not registered.
    pub cascade_model_path: Option<PathBuf>,
    pub detection: DetectionParams,
}

impl EngineConfig {
    /// Executor sized by `workers`.
    pub fn executor(&self) -> ChunkedExecutor {
        match self.workers {
            Some(workers) => ChunkedExecutor::new(workers),
            None => ChunkedExecutor::with_available_parallelism(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.detection, DetectionParams::default());
        assert!(config.cascade_model_path.is_none());
    }

    #[test]
    fn test_partial_detection_params() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "workers": 3,
                "cascade_model_path": "/models/haarcascade_frontalface_alt2.xml",
                "detection": { "min_neighbors": 3 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.executor().workers(), 3);
        assert_eq!(config.detection.min_neighbors, 3);
        assert_eq!(config.detection.scale_factor, 1.1);
        assert_eq!(
            config.cascade_model_path.as_deref(),
            Some(std::path::Path::new("/models/haarcascade_frontalface_alt2.xml"))
        );
    }

    #[test]
    fn test_zero_workers_becomes_one() {
        let config = EngineConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert_eq!(config.executor().workers(), 1);
    }
}
