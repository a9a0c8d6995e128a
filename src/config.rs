//! Configuration management for powmesh
//!
//! Every service is a clap subcommand whose flags can also come from
//! `POWMESH_*` environment variables. A `--config-file` (YAML, JSON or TOML)
//! replaces the subcommand's flags wholesale; environment variables still
//! override values from the file.

use crate::{Difficulty, Error, NodeDescriptor, Result, Transaction};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Prefix shared by clap `env` attributes and the config-file environment overlay
pub const ENV_PREFIX: &str = "POWMESH";

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output
    Plain,
    /// One JSON object per event
    Json,
}

/// What a node does with new transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Runs a proof-of-work search for every new transaction
    Miner,
    /// Floods new transactions to its other peers
    Relay,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Miner => write!(f, "miner"),
            NodeRole::Relay => write!(f, "relay"),
        }
    }
}

/// Command line interface
#[derive(Debug, Parser)]
#[command(
    name = "powmesh",
    version = env!("CARGO_PKG_VERSION"),
    about = "Gossip relay and proof-of-work mining network",
    long_about = "Runs the seed directory service, a miner or relay node, or submits a transaction to the network"
)]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence when set)
    #[arg(short = 'l', long, global = true, env = "POWMESH_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, global = true, env = "POWMESH_LOG_FORMAT", default_value = "plain")]
    pub log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, env = "POWMESH_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Configuration file for the selected command (YAML, JSON or TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long, global = true)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            file: self.log_file.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the seed directory service
    Seed(SeedConfig),
    /// Run a miner or relay node
    Node(NodeConfig),
    /// Submit a transaction to a node
    Submit(SubmitConfig),
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Plain,
            file: None,
        }
    }
}

/// Seed directory service settings
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Interface to listen on
    #[arg(long, env = "POWMESH_LISTEN_ADDRESS", default_value = "0.0.0.0")]
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// HTTP port
    #[arg(short = 'p', long, env = "POWMESH_PORT", default_value = "8080")]
    #[serde(default = "default_seed_port")]
    pub port: u16,

    /// Seconds between liveness sweeps
    #[arg(long, env = "POWMESH_SWEEP_INTERVAL_SECS", default_value = "30")]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds to wait before re-checking an empty registry
    #[arg(long, env = "POWMESH_EMPTY_POLL_SECS", default_value = "5")]
    #[serde(default = "default_empty_poll")]
    pub empty_poll_secs: u64,

    /// Liveness probe timeout in milliseconds
    #[arg(long, env = "POWMESH_PROBE_TIMEOUT_MS", default_value = "5000")]
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_seed_port(),
            sweep_interval_secs: default_sweep_interval(),
            empty_poll_secs: default_empty_poll(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl SeedConfig {
    /// Apply the config file (if any) and validate
    pub fn load(self, config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) => load_from_file(path)?,
            None => self,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_interface(&self.listen_address)?;
        if self.sweep_interval_secs == 0 {
            return Err(Error::config("Sweep interval must be greater than 0"));
        }
        if self.empty_poll_secs == 0 {
            return Err(Error::config("Empty-registry poll interval must be greater than 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(Error::config("Probe timeout must be greater than 0"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(parse_interface(&self.listen_address)?, self.port))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn empty_poll_interval(&self) -> Duration {
        Duration::from_secs(self.empty_poll_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Node settings
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Interface to listen on
    #[arg(long, env = "POWMESH_LISTEN_ADDRESS", default_value = "0.0.0.0")]
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Peer wire protocol port
    #[arg(long, env = "POWMESH_P2P_PORT", default_value = "7001")]
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,

    /// HTTP port serving /health for the seed's liveness probes
    #[arg(long, env = "POWMESH_HTTP_PORT", default_value = "8081")]
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// IP announced to the seed directory
    #[arg(long, env = "POWMESH_ADVERTISE_IP", default_value = "127.0.0.1")]
    #[serde(default = "default_advertise_ip")]
    pub advertise_ip: String,

    /// Identity sent in CONNECT messages (default: node-<random>)
    #[arg(long, env = "POWMESH_IDENTITY")]
    #[serde(default)]
    pub identity: Option<String>,

    /// Node role
    #[arg(short = 'r', long, env = "POWMESH_ROLE", default_value = "miner")]
    #[serde(default = "default_role")]
    pub role: NodeRole,

    /// Required leading zero hex characters in a mined digest
    #[arg(short = 'd', long, env = "POWMESH_DIFFICULTY", default_value = "4")]
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,

    /// Seed directory URL, e.g. http://127.0.0.1:8080
    #[arg(short = 's', long, env = "POWMESH_SEED_URL")]
    #[serde(default)]
    pub seed_url: Option<String>,

    /// Extra peers to dial at startup (host:port), repeatable
    #[arg(long = "peer", env = "POWMESH_PEERS", value_delimiter = ',')]
    #[serde(default)]
    pub peers: Vec<String>,

    /// Concurrent proof-of-work searches (0 = one per CPU)
    #[arg(long, env = "POWMESH_MAX_CONCURRENT_SEARCHES", default_value = "0")]
    #[serde(default)]
    pub max_concurrent_searches: usize,

    /// Transaction ids remembered for deduplication
    #[arg(long, env = "POWMESH_SEEN_CAPACITY", default_value = "100000")]
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    /// Seconds a pending transaction may wait for a result before it is abandoned
    #[arg(long, env = "POWMESH_PENDING_TTL_SECS", default_value = "600")]
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    /// Seconds between mempool prune passes
    #[arg(long, env = "POWMESH_PRUNE_INTERVAL_SECS", default_value = "60")]
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    /// Outbound connect timeout in milliseconds
    #[arg(long, env = "POWMESH_CONNECT_TIMEOUT_MS", default_value = "5000")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-frame write deadline in milliseconds
    #[arg(long, env = "POWMESH_WRITE_TIMEOUT_MS", default_value = "10000")]
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Connections accepted or dialed before new inbound ones are refused
    #[arg(long, env = "POWMESH_MAX_PEERS", default_value = "128")]
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Attempts made to register with the seed directory
    #[arg(long, env = "POWMESH_REGISTRATION_ATTEMPTS", default_value = "10")]
    #[serde(default = "default_registration_attempts")]
    pub registration_attempts: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            p2p_port: default_p2p_port(),
            http_port: default_http_port(),
            advertise_ip: default_advertise_ip(),
            identity: None,
            role: default_role(),
            difficulty: default_difficulty(),
            seed_url: None,
            peers: Vec::new(),
            max_concurrent_searches: 0,
            seen_capacity: default_seen_capacity(),
            pending_ttl_secs: default_pending_ttl(),
            prune_interval_secs: default_prune_interval(),
            connect_timeout_ms: default_connect_timeout(),
            write_timeout_ms: default_write_timeout(),
            max_peers: default_max_peers(),
            registration_attempts: default_registration_attempts(),
        }
    }
}

impl NodeConfig {
    /// Apply the config file (if any), fill in the identity and validate
    pub fn load(self, config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => load_from_file(path)?,
            None => self,
        };
        if config.identity.is_none() {
            config.identity = Some(format!("node-{}", uuid::Uuid::new_v4().simple()));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_interface(&self.listen_address)?;
        self.difficulty()?;
        self.seed_url()?;

        // Port 0 asks the OS for an ephemeral port; the bound ports are advertised
        if self.p2p_port == self.http_port && self.p2p_port != 0 {
            return Err(Error::config("P2P port and HTTP port must differ"));
        }
        if self.advertise_ip.trim().is_empty() {
            return Err(Error::config("Advertised IP must not be empty"));
        }
        if self.identity.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(Error::config("Identity must not be empty"));
        }
        if self.seen_capacity == 0 {
            return Err(Error::config("Seen-set capacity must be greater than 0"));
        }
        if self.pending_ttl_secs == 0 || self.prune_interval_secs == 0 {
            return Err(Error::config("Pending TTL and prune interval must be greater than 0"));
        }
        if self.max_peers == 0 {
            return Err(Error::config("Max peers must be greater than 0"));
        }
        if self.write_timeout_ms == 0 {
            return Err(Error::config("Write timeout must be greater than 0"));
        }
        if self.registration_attempts == 0 {
            return Err(Error::config("Registration attempts must be greater than 0"));
        }
        for peer in &self.peers {
            if !peer.contains(':') {
                return Err(Error::config(format!("Peer address '{}' must be host:port", peer)));
            }
        }
        Ok(())
    }

    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty)
    }

    pub fn seed_url(&self) -> Result<Option<Url>> {
        self.seed_url.as_deref().map(parse_url).transpose()
    }

    pub fn identity(&self) -> String {
        self.identity
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.advertise_ip, self.p2p_port))
    }

    /// Descriptor sent to the seed directory
    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(self.advertise_ip.clone(), self.http_port, Some(self.p2p_port))
    }

    pub fn p2p_socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(parse_interface(&self.listen_address)?, self.p2p_port))
    }

    pub fn http_socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(parse_interface(&self.listen_address)?, self.http_port))
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Wallet submission settings
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Node to submit to (host:port of its peer wire port)
    #[arg(short = 'n', long, env = "POWMESH_NODE")]
    #[serde(default)]
    pub node: Option<String>,

    /// Seed directory used to pick a node when --node is absent
    #[arg(short = 's', long, env = "POWMESH_SEED_URL")]
    #[serde(default)]
    pub seed_url: Option<String>,

    /// Required here or in the config file
    #[arg(long)]
    #[serde(default)]
    pub sender: Option<String>,

    #[arg(long)]
    #[serde(default)]
    pub recipient: Option<String>,

    #[arg(long)]
    #[serde(default)]
    pub amount: Option<u64>,

    /// Reference to the prior transaction state
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub pre_hash: String,

    /// Connect timeout in milliseconds
    #[arg(long, env = "POWMESH_CONNECT_TIMEOUT_MS", default_value = "5000")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl SubmitConfig {
    pub fn load(self, config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) => load_from_file(path)?,
            None => self,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.is_none() && self.seed_url.is_none() {
            return Err(Error::config("Either --node or --seed-url is required"));
        }
        if let Some(url) = &self.seed_url {
            parse_url(url)?;
        }
        let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
        if !filled(&self.sender) || !filled(&self.recipient) {
            return Err(Error::config("Sender and recipient are required and must not be empty"));
        }
        if self.amount.is_none() {
            return Err(Error::config("Amount is required"));
        }
        Ok(())
    }

    pub fn seed_url(&self) -> Result<Option<Url>> {
        self.seed_url.as_deref().map(parse_url).transpose()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Build a fresh transaction from the submission fields
    pub fn transaction(&self) -> Result<Transaction> {
        match (&self.sender, &self.recipient, self.amount) {
            (Some(sender), Some(recipient), Some(amount)) => Ok(Transaction::new(
                sender.clone(),
                recipient.clone(),
                amount,
                self.pre_hash.clone(),
            )),
            _ => Err(Error::config("Sender, recipient and amount are required")),
        }
    }
}

/// Load a section from a file, with `POWMESH_*` environment overrides
pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("peers"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Render a configuration section as YAML for `--print-config`
pub fn to_yaml<T: Serialize>(section: &T) -> Result<String> {
    serde_yaml::to_string(section).map_err(Error::from)
}

fn parse_interface(address: &str) -> Result<IpAddr> {
    address
        .parse()
        .map_err(|e| Error::config(format!("Invalid listen address '{}': {}", address, e)))
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::config(format!("Unsupported URL scheme '{}'", other))),
    }
}

// Default value functions for serde
fn default_listen_address() -> String { "0.0.0.0".to_string() }
fn default_seed_port() -> u16 { 8080 }
fn default_sweep_interval() -> u64 { 30 }
fn default_empty_poll() -> u64 { 5 }
fn default_probe_timeout() -> u64 { 5000 }
fn default_p2p_port() -> u16 { 7001 }
fn default_http_port() -> u16 { 8081 }
fn default_advertise_ip() -> String { "127.0.0.1".to_string() }
fn default_role() -> NodeRole { NodeRole::Miner }
fn default_difficulty() -> u8 { 4 }
fn default_seen_capacity() -> usize { 100_000 }
fn default_pending_ttl() -> u64 { 600 }
fn default_prune_interval() -> u64 { 60 }
fn default_connect_timeout() -> u64 { 5000 }
fn default_write_timeout() -> u64 { 10_000 }
fn default_max_peers() -> usize { 128 }
fn default_registration_attempts() -> usize { 10 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_seed_defaults() {
        let cli = Cli::try_parse_from(["powmesh", "seed"]).unwrap();
        let Command::Seed(config) = cli.command else {
            panic!("expected seed command");
        };

        assert_eq!(config, SeedConfig::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.empty_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.log_format, LogFormat::Plain);
    }

    #[test]
    fn test_node_flags() {
        let cli = Cli::try_parse_from([
            "powmesh",
            "--log-format",
            "json",
            "node",
            "--role",
            "relay",
            "-d",
            "2",
            "--peer",
            "10.0.0.1:7001,10.0.0.2:7001",
            "--seed-url",
            "http://127.0.0.1:8080",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Node(config) = cli.command else {
            panic!("expected node command");
        };

        assert_eq!(config.role, NodeRole::Relay);
        assert_eq!(config.difficulty().unwrap().value(), 2);
        assert_eq!(config.peers, vec!["10.0.0.1:7001", "10.0.0.2:7001"]);
        assert!(config.seed_url().unwrap().is_some());

        let loaded = config.load(None).unwrap();
        assert!(loaded.identity().starts_with("node-"));
        assert_eq!(loaded.descriptor(), NodeDescriptor::new("127.0.0.1", 8081, Some(7001)));
    }

    #[test]
    fn test_node_validation() {
        let mut config = NodeConfig::default();
        assert!(config.validate().is_ok());

        config.difficulty = 65;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.http_port = config.p2p_port;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.seed_url = Some("ftp://seed".into());
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.peers = vec!["no-port".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_submit_requires_target() {
        let cli = Cli::try_parse_from([
            "powmesh", "submit", "--sender", "alice", "--recipient", "bob", "--amount", "5",
        ])
        .unwrap();
        let Command::Submit(config) = cli.command else {
            panic!("expected submit command");
        };
        assert!(config.clone().load(None).is_err());

        let config = SubmitConfig {
            node: Some("127.0.0.1:7001".into()),
            ..config
        };
        let loaded = config.load(None).unwrap();
        let tx = loaded.transaction().unwrap();
        assert_eq!((tx.sender.as_str(), tx.recipient.as_str(), tx.amount), ("alice", "bob", 5));
    }

    #[test]
    fn test_submit_fields_from_config_file_only() {
        let file = write_config(
            ".yaml",
            r#"
node: "127.0.0.1:7001"
sender: alice
recipient: bob
amount: 12
"#,
        );
        let cli = Cli::try_parse_from([
            "powmesh",
            "--config-file",
            file.path().to_str().unwrap(),
            "submit",
        ])
        .unwrap();
        let Command::Submit(config) = cli.command else {
            panic!("expected submit command");
        };

        let loaded = config.load(cli.config_file.as_deref()).unwrap();
        assert_eq!(loaded.amount, Some(12));
        assert_eq!(loaded.transaction().unwrap().recipient, "bob");
    }

    #[test]
    fn test_submit_without_amount_rejected() {
        let cli = Cli::try_parse_from([
            "powmesh", "submit", "--node", "127.0.0.1:7001", "--sender", "alice", "--recipient", "bob",
        ])
        .unwrap();
        let Command::Submit(config) = cli.command else {
            panic!("expected submit command");
        };
        assert!(matches!(config.load(None), Err(Error::Config { .. })));
    }

    #[test]
    fn test_node_config_from_yaml() {
        let file = write_config(
            ".yaml",
            r#"
p2p_port: 7101
http_port: 8181
role: relay
difficulty: 3
peers:
  - "10.0.0.9:7001"
"#,
        );

        let config: NodeConfig = load_from_file(file.path()).unwrap();
        assert_eq!(config.p2p_port, 7101);
        assert_eq!(config.http_port, 8181);
        assert_eq!(config.role, NodeRole::Relay);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.peers, vec!["10.0.0.9:7001"]);
        // Unset fields fall back to defaults
        assert_eq!(config.seen_capacity, 100_000);
    }

    #[test]
    fn test_seed_config_from_json_replaces_flags() {
        let file = write_config(".json", r#"{"port": 9090, "probe_timeout_ms": 250}"#);

        let config = SeedConfig::default().load(Some(file.path())).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.probe_timeout(), Duration::from_millis(250));
        assert_eq!(config.sweep_interval_secs, 30);
    }

    #[test]
    fn test_missing_config_file() {
        let result = SeedConfig::default().load(Some(Path::new("/nonexistent/powmesh.yaml")));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_print_config_yaml() {
        let yaml = to_yaml(&SeedConfig::default()).unwrap();
        assert!(yaml.contains("port: 8080"));
        assert!(yaml.contains("sweep_interval_secs: 30"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(NodeRole::Miner.to_string(), "miner");
        assert_eq!(NodeRole::Relay.to_string(), "relay");
    }
}
