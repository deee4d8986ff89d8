//! Request payloads.

use serde::{Deserialize, Serialize};

/// Quality thresholds a client may attach to a run.
///
/// Stored verbatim in the run's configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_duplicates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_empty: Option<bool>,
}

impl QualitySettings {
    /// Check value bounds, returning a message naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(min) = self.min_length {
            if min < 0 {
                return Err("qualitySettings.minLength: must be greater than or equal to 0".to_string());
            }
        }
        if let Some(max) = self.max_length {
            if max <= 0 {
                return Err("qualitySettings.maxLength: must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

/// Body of `POST /projects/:projectId/processing/start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartProcessingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_settings: Option<QualitySettings>,
}
