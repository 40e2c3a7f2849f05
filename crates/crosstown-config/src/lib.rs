//! Startup configuration: env-var and JSON-file layering over
//! defaults, plus a redacted view safe to pass to `tracing`.
//!
//! Shaped after `openibank-db::DatabaseConfig`: a plain `Default` impl with
//! baked-in fallbacks, a `from_env()` constructor that reads the process
//! environment, and a masking helper so a secret never reaches a log line
//! by accident. Nested sections (`bootstrap`, `pricing`, `settlement`,
//! `store`, `limits`) mirror the connector/bootstrap/pricing/store crates'
//! own field names one-to-one, so wiring them together in the node binary
//! is a direct field copy rather than a translation layer.

pub mod error;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crosstown_types::KnownPeer;

pub use error::{ConfigError, ConfigResult};

/// Which `crosstown-connector` adapter the node wires up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorMode {
    Embedded,
    Remote,
}

impl Default for ConnectorMode {
    fn default() -> Self {
        ConnectorMode::Embedded
    }
}

impl fmt::Display for ConnectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorMode::Embedded => write!(f, "embedded"),
            ConnectorMode::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ConnectorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(ConnectorMode::Embedded),
            "remote" => Ok(ConnectorMode::Remote),
            other => Err(ConfigError::InvalidValue { field: "connectorMode", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    pub known_peers: Vec<KnownPeer>,
    pub discovery_window_ms: u64,
    pub min_peers: usize,
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self { known_peers: Vec::new(), discovery_window_ms: 5_000, min_peers: 1 }
    }
}

/// One `crosstown_pricing::KindRow` plus the kind it applies to, the shape
/// a config file or env var actually carries (the pricing crate's own
/// `KindRow` has no `kind` field since it's keyed externally by a map).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KindRowConfig {
    pub kind: u32,
    pub base: u64,
    pub per_byte: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSection {
    pub kind_rows: Vec<KindRowConfig>,
    pub default_base: u64,
    pub default_per_byte: u64,
    pub owner_bypass: Vec<String>,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self { kind_rows: Vec::new(), default_base: 0, default_per_byte: 0, owner_bypass: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSection {
    pub supported_chains: Vec<String>,
    pub addresses: HashMap<String, String>,
    pub tokens: HashMap<String, String>,
    pub deposit: u64,
    pub timeout_sec: u64,
    pub handshake_timeout_ms: u64,
    pub channel_open_timeout_ms: u64,
}

impl Default for SettlementSection {
    fn default() -> Self {
        Self {
            supported_chains: Vec::new(),
            addresses: HashMap::new(),
            tokens: HashMap::new(),
            deposit: 0,
            timeout_sec: 30,
            handshake_timeout_ms: 10_000,
            channel_open_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: String,
    pub max_memory_bytes: Option<u64>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { path: "sqlite://crosstown.db".to_string(), max_memory_bytes: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsSection {
    pub sub_send_buffer: usize,
    pub max_filters: usize,
    pub max_connections: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self { sub_send_buffer: 256, max_filters: 16, max_connections: 1024 }
    }
}

/// Full node configuration. `private_key` is the node's hex secp256k1
/// secret; never format this struct directly into a log line, use
/// [`Config::redacted`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_id: String,
    pub private_key: String,
    pub ilp_address: String,
    pub listen_addr: String,
    pub bls_http_addr: String,
    pub relay_url: String,
    pub connector_mode: ConnectorMode,
    pub connector_url: Option<String>,
    pub bootstrap: BootstrapSection,
    pub pricing: PricingSection,
    pub settlement: SettlementSection,
    pub store: StoreSection,
    pub limits: LimitsSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            private_key: String::new(),
            ilp_address: String::new(),
            listen_addr: "0.0.0.0:8080".to_string(),
            bls_http_addr: "0.0.0.0:8081".to_string(),
            relay_url: "ws://127.0.0.1:8080/relay".to_string(),
            connector_mode: ConnectorMode::default(),
            connector_url: None,
            bootstrap: BootstrapSection::default(),
            pricing: PricingSection::default(),
            settlement: SettlementSection::default(),
            store: StoreSection::default(),
            limits: LimitsSection::default(),
        }
    }
}

fn env_scalar<T: FromStr>(key: &str, current: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(current)
}

fn env_json<T: for<'de> Deserialize<'de>>(key: &str, current: T) -> T {
    std::env::var(key).ok().and_then(|v| serde_json::from_str(&v).ok()).unwrap_or(current)
}

impl Config {
    /// Loads a JSON config file, if one exists at `path`; layering starts
    /// here, `from_env` then overrides individual fields on top of it.
    pub fn from_file(path: &str) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Builds config from `base` (defaults, or a loaded file) with every
    /// recognized `CROSSTOWN_*` environment variable overlaid on top.
    /// Scalar fields take a plain value; nested list/map fields
    /// (`knownPeers`, `kindRows`, `ownerBypass`, `addresses`, `tokens`) take
    /// a JSON-encoded value, matching how the file form carries them.
    pub fn from_env_over(mut base: Self) -> Self {
        base.node_id = std::env::var("CROSSTOWN_NODE_ID").unwrap_or(base.node_id);
        base.private_key = std::env::var("CROSSTOWN_PRIVATE_KEY").unwrap_or(base.private_key);
        base.ilp_address = std::env::var("CROSSTOWN_ILP_ADDRESS").unwrap_or(base.ilp_address);
        base.listen_addr = std::env::var("CROSSTOWN_LISTEN_ADDR").unwrap_or(base.listen_addr);
        base.bls_http_addr = std::env::var("CROSSTOWN_BLS_HTTP_ADDR").unwrap_or(base.bls_http_addr);
        base.relay_url = std::env::var("CROSSTOWN_RELAY_URL").unwrap_or(base.relay_url);
        if let Ok(mode) = std::env::var("CROSSTOWN_CONNECTOR_MODE") {
            if let Ok(parsed) = mode.parse() {
                base.connector_mode = parsed;
            }
        }
        base.connector_url = std::env::var("CROSSTOWN_CONNECTOR_URL").ok().or(base.connector_url);

        base.bootstrap.known_peers = env_json("CROSSTOWN_BOOTSTRAP_KNOWN_PEERS", base.bootstrap.known_peers);
        base.bootstrap.discovery_window_ms = env_scalar("CROSSTOWN_BOOTSTRAP_DISCOVERY_WINDOW_MS", base.bootstrap.discovery_window_ms);
        base.bootstrap.min_peers = env_scalar("CROSSTOWN_BOOTSTRAP_MIN_PEERS", base.bootstrap.min_peers);

        base.pricing.kind_rows = env_json("CROSSTOWN_PRICING_KIND_ROWS", base.pricing.kind_rows);
        base.pricing.default_base = env_scalar("CROSSTOWN_PRICING_DEFAULT_BASE", base.pricing.default_base);
        base.pricing.default_per_byte = env_scalar("CROSSTOWN_PRICING_DEFAULT_PER_BYTE", base.pricing.default_per_byte);
        base.pricing.owner_bypass = env_json("CROSSTOWN_PRICING_OWNER_BYPASS", base.pricing.owner_bypass);

        base.settlement.supported_chains = env_json("CROSSTOWN_SETTLEMENT_SUPPORTED_CHAINS", base.settlement.supported_chains);
        base.settlement.addresses = env_json("CROSSTOWN_SETTLEMENT_ADDRESSES", base.settlement.addresses);
        base.settlement.tokens = env_json("CROSSTOWN_SETTLEMENT_TOKENS", base.settlement.tokens);
        base.settlement.deposit = env_scalar("CROSSTOWN_SETTLEMENT_DEPOSIT", base.settlement.deposit);
        base.settlement.timeout_sec = env_scalar("CROSSTOWN_SETTLEMENT_TIMEOUT_SEC", base.settlement.timeout_sec);
        base.settlement.handshake_timeout_ms = env_scalar("CROSSTOWN_SETTLEMENT_HANDSHAKE_TIMEOUT_MS", base.settlement.handshake_timeout_ms);
        base.settlement.channel_open_timeout_ms = env_scalar("CROSSTOWN_SETTLEMENT_CHANNEL_OPEN_TIMEOUT_MS", base.settlement.channel_open_timeout_ms);

        base.store.path = std::env::var("CROSSTOWN_STORE_PATH").unwrap_or(base.store.path);
        base.store.max_memory_bytes = std::env::var("CROSSTOWN_STORE_MAX_MEMORY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(base.store.max_memory_bytes);

        base.limits.sub_send_buffer = env_scalar("CROSSTOWN_LIMITS_SUB_SEND_BUFFER", base.limits.sub_send_buffer);
        base.limits.max_filters = env_scalar("CROSSTOWN_LIMITS_MAX_FILTERS", base.limits.max_filters);
        base.limits.max_connections = env_scalar("CROSSTOWN_LIMITS_MAX_CONNECTIONS", base.limits.max_connections);

        base
    }

    /// Reads `CROSSTOWN_CONFIG_FILE` if set, falling back to defaults, then
    /// overlays every recognized environment variable on top.
    pub fn from_env() -> Self {
        let base = match std::env::var("CROSSTOWN_CONFIG_FILE") {
            Ok(path) => Self::from_file(&path).unwrap_or_default(),
            Err(_) => Self::default(),
        };
        Self::from_env_over(base)
    }

    /// Fails fast on a config missing what every node needs to start;
    /// everything else falls back to a workable default.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.is_empty() {
            return Err(ConfigError::Missing("nodeId"));
        }
        if self.private_key.is_empty() {
            return Err(ConfigError::Missing("privateKey"));
        }
        if crosstown_crypto::KeyPair::from_hex(&self.private_key).is_err() {
            return Err(ConfigError::InvalidValue { field: "privateKey", value: "<redacted>".to_string() });
        }
        if self.ilp_address.is_empty() {
            return Err(ConfigError::Missing("ilpAddress"));
        }
        Ok(())
    }

    /// A copy with `private_key` replaced, safe to pass to `tracing`.
    pub fn redacted(&self) -> Config {
        let mut clone = self.clone();
        if !clone.private_key.is_empty() {
            clone.private_key = "***".to_string();
        }
        clone
    }
}
