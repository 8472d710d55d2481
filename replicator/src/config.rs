//! Replicator configuration with TOML file support.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ballotguard_ledger_client::{LedgerNode, ReceiptWaitOptions, RpcLedgerNode, RpcTimeouts};
use ballotguard_types::LedgerNodeDescriptor;
use serde::{Deserialize, Serialize};

use crate::{LogFormat, ReplicatorError, ReplicatorSettings};

/// Configuration for the replication daemon.
///
/// Loaded from a TOML file via [`ReplicatorConfig::from_toml_file`] or built
/// programmatically. The emergency ledger secret is deliberately absent; it
/// only ever arrives through the command line or the environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Encrypted emergency ledger file.
    #[serde(default = "default_emergency_path")]
    pub emergency_path: PathBuf,

    /// Seconds between background reconciliation passes.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Pause between records within one pass, in milliseconds.
    #[serde(default = "default_sync_record_delay_ms")]
    pub sync_record_delay_ms: u64,

    /// Upper bound on one liveness probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on one node RPC request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_receipt_max_attempts")]
    pub receipt_max_attempts: u32,

    #[serde(default = "default_receipt_interval_ms")]
    pub receipt_interval_ms: u64,

    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,

    /// Salt for deriving voter hashes the HTTP API fills in when a request
    /// omits one.
    #[serde(default = "default_voter_hash_salt")]
    pub voter_hash_salt: String,

    /// Whether to serve the HTTP API.
    #[serde(default = "default_true")]
    pub enable_http: bool,

    #[serde(default = "default_http_bind")]
    pub http_bind: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter (e.g. "info", "debug,ballotguard_replicator=trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Ledger nodes; `[[nodes]]` tables.
    #[serde(default)]
    pub nodes: Vec<LedgerNodeDescriptor>,
}

fn default_emergency_path() -> PathBuf {
    PathBuf::from("./data/emergency-ledger.json")
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_sync_record_delay_ms() -> u64 {
    250
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_receipt_max_attempts() -> u32 {
    30
}

fn default_receipt_interval_ms() -> u64 {
    1_000
}

fn default_receipt_timeout_ms() -> u64 {
    45_000
}

fn default_voter_hash_salt() -> String {
    "ballotguard".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    7100
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ReplicatorConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ReplicatorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplicatorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ReplicatorError> {
        toml::from_str(s).map_err(|e| ReplicatorError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ReplicatorError> {
        toml::to_string_pretty(self).map_err(|e| ReplicatorError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ReplicatorError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.clone()) {
                return Err(ReplicatorError::Config(format!(
                    "node {} configured twice",
                    node.id
                )));
            }
            if node.rpc_url.is_empty() {
                return Err(ReplicatorError::Config(format!(
                    "node {} has no rpc_url",
                    node.id
                )));
            }
            if node.contract_address.is_empty() {
                return Err(ReplicatorError::Config(format!(
                    "node {} has no contract_address",
                    node.id
                )));
            }
        }
        if !self.nodes.iter().any(|n| n.enabled) {
            return Err(ReplicatorError::Config(
                "at least one enabled ledger node is required".into(),
            ));
        }
        let zero = [
            ("sync_interval_secs", self.sync_interval_secs),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("receipt_interval_ms", self.receipt_interval_ms),
            ("receipt_timeout_ms", self.receipt_timeout_ms),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((name, _)) = zero {
            return Err(ReplicatorError::Config(format!("{name} must be non-zero")));
        }
        self.log_format
            .parse::<LogFormat>()
            .map_err(ReplicatorError::Config)?;
        if self.receipt_max_attempts == 0 {
            return Err(ReplicatorError::Config(
                "receipt_max_attempts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Falls back to human output; [`Self::validate`] rejects unknown names.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.parse().unwrap_or(LogFormat::Human)
    }

    pub fn rpc_timeouts(&self) -> RpcTimeouts {
        RpcTimeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            connect: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn receipt_options(&self) -> ReceiptWaitOptions {
        ReceiptWaitOptions {
            max_attempts: self.receipt_max_attempts,
            interval: Duration::from_millis(self.receipt_interval_ms),
            timeout: Duration::from_millis(self.receipt_timeout_ms),
        }
    }

    pub fn settings(&self) -> ReplicatorSettings {
        ReplicatorSettings {
            sync_interval: Duration::from_secs(self.sync_interval_secs),
            record_delay: Duration::from_millis(self.sync_record_delay_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            receipt: self.receipt_options(),
        }
    }

    /// JSON-RPC clients for every configured node, disabled ones included.
    pub fn rpc_nodes(&self) -> Result<Vec<Arc<dyn LedgerNode>>, ReplicatorError> {
        self.nodes
            .iter()
            .map(|d| {
                let node = RpcLedgerNode::new(d.clone(), self.rpc_timeouts())?;
                Ok(Arc::new(node) as Arc<dyn LedgerNode>)
            })
            .collect()
    }
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            emergency_path: default_emergency_path(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_record_delay_ms: default_sync_record_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            receipt_max_attempts: default_receipt_max_attempts(),
            receipt_interval_ms: default_receipt_interval_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
            voter_hash_salt: default_voter_hash_salt(),
            enable_http: true,
            http_bind: default_http_bind(),
            http_port: default_http_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            nodes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotguard_types::NodeId;

    const TWO_NODES: &str = r#"
        emergency_path = "/var/lib/ballotguard/emergency.json"
        sync_interval_secs = 15

        [[nodes]]
        id = "primary"
        rpc_url = "http://10.0.0.5:8545"
        contract_address = "0xaaa"
        priority = 0

        [[nodes]]
        id = "backup"
        rpc_url = "http://10.0.0.6:8545"
        contract_address = "0xbbb"
        priority = 1
        enabled = false
    "#;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        assert_eq!(config.sync_interval_secs, 15);
        assert_eq!(config.sync_record_delay_ms, 250);
        assert_eq!(config.probe_timeout_ms, 3_000);
        assert_eq!(config.http_port, 7100);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].id, NodeId::new("primary"));
        assert!(config.nodes[0].enabled);
        assert!(!config.nodes[1].enabled);
        config.validate().unwrap();
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(ReplicatorConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn validation_rejects_bad_rosters() {
        let mut config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        config.nodes[0].enabled = false;
        assert!(config.validate().is_err());

        let mut config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        config.nodes[1].id = NodeId::new("primary");
        assert!(config.validate().is_err());

        let mut config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        config.sync_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sync_interval_secs"));

        let mut config = ReplicatorConfig::from_toml_str(TWO_NODES).unwrap();
        config.log_format = "xml".into();
        assert!(config.validate().unwrap_err().to_string().contains("xml"));

        assert!(ReplicatorConfig::default().validate().is_err());
    }

    #[test]
    fn settings_and_receipt_defaults() {
        let config = ReplicatorConfig::default();
        let settings = config.settings();
        assert_eq!(settings.sync_interval, Duration::from_secs(30));
        assert_eq!(settings.receipt, ReceiptWaitOptions::default());
        assert_eq!(config.log_format(), LogFormat::Human);
    }
}
