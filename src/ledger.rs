//! Incident ledger boundary
//!
//! Confirmed incidents are appended to an external tamper-evident ledger.
//! Ledger writes are slow and fallible, so they run on a background task fed
//! by a bounded queue: a dead or lagging ledger never stalls packet
//! processing, and the block decision stands whether or not the write lands.

use chrono::{DateTime, Utc};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A promotion event queued for the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    /// Offending source identifier
    pub source: String,
    /// Attack label that triggered the block
    pub attack_type: String,
    /// When the promotion happened
    pub detected_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(source: impl Into<String>, attack_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            attack_type: attack_type.into(),
            detected_at: Utc::now(),
        }
    }
}

/// One confirmed incident as stored on the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub source: String,
    pub attack_type: String,
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction reference
    pub tx_ref: String,
}

/// Ledger boundary errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Ledger write rejected: {0}")]
    Rejected(String),
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Append-only incident log client
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Record one incident; returns the ledger transaction reference
    async fn log_attack(&self, source: &str, attack_type: &str) -> Result<String, LedgerError>;

    /// Fetch every recorded incident (periodic-refresh collaborator)
    async fn fetch_all(&self) -> Result<Vec<IncidentRecord>, LedgerError>;
}

/// Ledger gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger gateway base URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Bounded incident queue depth
    pub queue_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8545".to_string(),
            timeout_secs: 30,
            queue_size: 64,
        }
    }
}

#[derive(Debug, Serialize)]
struct LogAttackRequest<'a> {
    source: &'a str,
    attack_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct LogAttackResponse {
    tx_ref: String,
}

/// HTTP gateway to the ledger service
pub struct HttpLedgerClient {
    config: LedgerConfig,
    client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn log_attack(&self, source: &str, attack_type: &str) -> Result<String, LedgerError> {
        let response = self
            .client
            .post(self.url("attacks"))
            .json(&LogAttackRequest { source, attack_type })
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Rejected(format!("HTTP {}", response.status())));
        }

        let body: LogAttackResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        Ok(body.tx_ref)
    }

    async fn fetch_all(&self) -> Result<Vec<IncidentRecord>, LedgerError> {
        let response = self
            .client
            .get(self.url("attacks"))
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Rejected(format!("HTTP {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }
}

/// Spawn the background ledger writer.
///
/// Drains the incident queue and writes each entry once. Failures are
/// logged and dropped; the external periodic-refresh path reconciles missed
/// writes. The task ends when every sender is gone.
pub fn spawn_ledger_writer(
    client: std::sync::Arc<dyn LedgerClient>,
    mut rx: mpsc::Receiver<Incident>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(incident) = rx.recv().await {
            match client.log_attack(&incident.source, &incident.attack_type).await {
                Ok(tx_ref) => {
                    info!(
                        source = %incident.source,
                        attack_type = %incident.attack_type,
                        tx_ref = %tx_ref,
                        "incident recorded on ledger"
                    );
                }
                Err(e) => {
                    warn!(
                        source = %incident.source,
                        attack_type = %incident.attack_type,
                        "ledger write failed: {}", e
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingLedger {
        written: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl LedgerClient for RecordingLedger {
        async fn log_attack(&self, source: &str, attack_type: &str) -> Result<String, LedgerError> {
            if self.fail {
                return Err(LedgerError::Unavailable("down".into()));
            }
            self.written.lock().push((source.to_string(), attack_type.to_string()));
            Ok(format!("0xtx-{}", source))
        }

        async fn fetch_all(&self) -> Result<Vec<IncidentRecord>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_writer_drains_queue() {
        let ledger = Arc::new(RecordingLedger { written: Mutex::new(Vec::new()), fail: false });
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_ledger_writer(ledger.clone(), rx);

        tx.send(Incident::new("192.168.1.7", "HULK")).await.unwrap();
        tx.send(Incident::new("192.168.1.8", "SYNFLOOD")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let written = ledger.written.lock();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], ("192.168.1.7".to_string(), "HULK".to_string()));
    }

    #[tokio::test]
    async fn test_writer_survives_failures() {
        let ledger = Arc::new(RecordingLedger { written: Mutex::new(Vec::new()), fail: true });
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_ledger_writer(ledger, rx);

        tx.send(Incident::new("10.0.0.9", "UDPFLOOD")).await.unwrap();
        drop(tx);
        // Failure must not panic or abort the writer
        handle.await.unwrap();
    }
}
