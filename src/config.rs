use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "kpi-sim.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Per-request deadline attached by the deadline stage
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cors: bool,
}

/// Fallback values used when a request supplies no usable override
#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

/// Service identity attached to every request span
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_env")]
    pub env: String,
    #[serde(default = "default_service_version")]
    pub version: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub json: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_listen_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            cors: true,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: default_success_rate(),
            max_delay_ms: default_max_delay_ms(),
            error_rate: default_error_rate(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            env: default_service_env(),
            version: default_service_version(),
        }
    }
}

// Default value functions
fn default_listen_address() -> String { "0.0.0.0".to_string() }
fn default_listen_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_success_rate() -> f64 { 99.9 }
fn default_max_delay_ms() -> u64 { 500 }
fn default_error_rate() -> f64 { 5.0 }
fn default_service_name() -> String { "kpi-service".to_string() }
fn default_service_env() -> String { "production".to_string() }
fn default_service_version() -> String { env!("CARGO_PKG_VERSION").to_string() }

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse(&content).map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))
    }

    /// Load `path` when given. Without an explicit path the default file is
    /// optional and built-in defaults apply when it is missing.
    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sim = &self.simulation;
        if !(0.0..=100.0).contains(&sim.success_rate) {
            anyhow::bail!("simulation.success_rate must be within 0..=100, got {}", sim.success_rate);
        }
        if !(0.0..=100.0).contains(&sim.error_rate) {
            anyhow::bail!("simulation.error_rate must be within 0..=100, got {}", sim.error_rate);
        }
        if sim.max_delay_ms == 0 {
            anyhow::bail!("simulation.max_delay_ms must be greater than 0");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen.address, self.listen.port)
    }
}
