//! Traffic classifier boundary
//!
//! The classifier itself is an external pretrained model; this module owns
//! the label vocabulary, the error contract, and an HTTP-backed client.
//! One attempt per window, no retry: a failed classification is reported to
//! the caller, never papered over with a default label.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureVector;

/// Classification outcome for one flow window.
///
/// `Unknown` is a valid label: it is what unrecognized classifier outputs
/// map to, and it counts as non-benign for escalation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficLabel {
    Benign,
    Hulk,
    SynFlood,
    UdpFlood,
    PostFlood,
    Unknown,
}

impl TrafficLabel {
    /// Benign check; everything else warrants a warning
    pub fn is_benign(&self) -> bool {
        matches!(self, TrafficLabel::Benign)
    }
}

impl std::fmt::Display for TrafficLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficLabel::Benign => write!(f, "BENIGN"),
            TrafficLabel::Hulk => write!(f, "HULK"),
            TrafficLabel::SynFlood => write!(f, "SYNFLOOD"),
            TrafficLabel::UdpFlood => write!(f, "UDPFLOOD"),
            TrafficLabel::PostFlood => write!(f, "POSTFLOOD"),
            TrafficLabel::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for TrafficLabel {
    type Err = std::convert::Infallible;

    /// Unrecognized spellings parse to `Unknown` by contract.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "BENIGN" => TrafficLabel::Benign,
            "HULK" => TrafficLabel::Hulk,
            "SYNFLOOD" => TrafficLabel::SynFlood,
            "UDPFLOOD" => TrafficLabel::UdpFlood,
            "POSTFLOOD" => TrafficLabel::PostFlood,
            _ => TrafficLabel::Unknown,
        })
    }
}

/// Classifier boundary errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Classifier service unreachable
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
    /// Request exceeded the configured timeout
    #[error("Classifier timeout after {0}s")]
    Timeout(u64),
    /// Classifier rejected the feature vector
    #[error("Classifier rejected vector: {0}")]
    Rejected(String),
    /// Response could not be decoded
    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
}

/// Decision function over one feature vector.
///
/// Synchronous from the pipeline's perspective: the caller awaits the result
/// before the window's outcome is known. Implementations must not retry.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, vector: &FeatureVector) -> Result<TrafficLabel, ClassifierError>;
}

/// Classifier HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Prediction endpoint
    pub endpoint: String,
    /// Request timeout in seconds; expiry is a hard error
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/predict".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    label: String,
}

/// HTTP-backed classifier client
pub struct HttpClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout(self.config.timeout_secs)
        } else if err.is_connect() {
            ClassifierError::Unavailable(err.to_string())
        } else {
            ClassifierError::InvalidResponse(err.to_string())
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, vector: &FeatureVector) -> Result<TrafficLabel, ClassifierError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(vector)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Rejected(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        // FromStr is infallible: unrecognized outputs become Unknown.
        Ok(body.label.parse().unwrap_or(TrafficLabel::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        for label in [
            TrafficLabel::Benign,
            TrafficLabel::Hulk,
            TrafficLabel::SynFlood,
            TrafficLabel::UdpFlood,
            TrafficLabel::PostFlood,
        ] {
            let parsed: TrafficLabel = label.to_string().parse().unwrap();
            assert_eq!(parsed, label);
        }
    }

    #[test]
    fn test_unrecognized_output_maps_to_unknown() {
        let parsed: TrafficLabel = "SLOWLORIS".parse().unwrap();
        assert_eq!(parsed, TrafficLabel::Unknown);
        assert!(!parsed.is_benign());
    }

    #[test]
    fn test_only_benign_is_benign() {
        assert!(TrafficLabel::Benign.is_benign());
        for label in [
            TrafficLabel::Hulk,
            TrafficLabel::SynFlood,
            TrafficLabel::UdpFlood,
            TrafficLabel::PostFlood,
            TrafficLabel::Unknown,
        ] {
            assert!(!label.is_benign());
        }
    }
}
