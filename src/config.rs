use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::allocator::PasswordPolicy;
use crate::orchestrator::{NetworkTemplate, SettleStrategy};

/// Credentials are taken verbatim from the environment. Figment would
/// otherwise parse `0012` as the integer 12.
const RAW_ENV_KEYS: [&str; 2] = ["username", "password"];

#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the upstream API, e.g. `https://pve.example:8006`.
    pub proxmox_url: String,
    pub username: String,
    pub password: String,
    pub node: String,
    pub gateway: Ipv4Addr,
    pub ipv6_gateway: Ipv6Addr,
    pub bind: SocketAddr,
    pub database: PathBuf,
    /// Upstream clusters usually run with self-issued certificates.
    pub accept_invalid_certs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub bridge: String,
    pub interface: String,
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
    pub template_storage: String,
    pub password_length: usize,
    pub password_symbols: bool,
    pub delete_settle_secs: u64,
    /// Poll the container status before deleting instead of sleeping
    /// for `delete_settle_secs`.
    pub delete_poll: bool,
    pub delete_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxmox_url: String::new(),
            username: String::new(),
            password: String::new(),
            node: "pve".into(),
            gateway: Ipv4Addr::UNSPECIFIED,
            ipv6_gateway: Ipv6Addr::UNSPECIFIED,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database: "containers.db".into(),
            accept_invalid_certs: true,
            request_timeout_secs: None,
            bridge: "vmbr1".into(),
            interface: "eth0".into(),
            ipv4_prefix: 24,
            ipv6_prefix: 64,
            template_storage: "local".into(),
            password_length: 12,
            password_symbols: false,
            delete_settle_secs: 5,
            delete_poll: false,
            delete_poll_interval_ms: 1000,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("proxmox_url", &self.proxmox_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("node", &self.node)
            .field("gateway", &self.gateway)
            .field("ipv6_gateway", &self.ipv6_gateway)
            .field("bind", &self.bind)
            .field("database", &self.database)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("delete_poll", &self.delete_poll)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("lxcgate.toml"))
            .merge(Json::file("lxcgate.json"))
            .merge(Env::prefixed("LXCGATE_").ignore(&RAW_ENV_KEYS))
    }

    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if let Ok(username) = std::env::var("LXCGATE_USERNAME") {
            config.username = username;
        }
        if let Ok(password) = std::env::var("LXCGATE_PASSWORD") {
            config.password = password;
        }

        // Support Docker-style secrets
        if let Ok(secret_file) = std::env::var("LXCGATE_PASSWORD_FILE") {
            config.password = std::fs::read_to_string(secret_file)?.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.proxmox_url.is_empty() {
            anyhow::bail!("`proxmox_url` is required");
        }
        if self.username.is_empty() || self.password.is_empty() {
            anyhow::bail!("`username` and `password` are required");
        }
        if self.gateway.is_unspecified() || self.ipv6_gateway.is_unspecified() {
            anyhow::bail!("`gateway` and `ipv6_gateway` are required");
        }
        if self.ipv4_prefix > 32 || self.ipv6_prefix > 128 {
            anyhow::bail!(
                "invalid prefix lengths /{} and /{}",
                self.ipv4_prefix,
                self.ipv6_prefix
            );
        }
        if self.password_length == 0 {
            anyhow::bail!("`password_length` must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            length: self.password_length,
            symbols: self.password_symbols,
        }
    }

    pub fn network_template(&self) -> NetworkTemplate {
        NetworkTemplate {
            interface: self.interface.clone(),
            bridge: self.bridge.clone(),
            gateway: self.gateway,
            ipv6_gateway: self.ipv6_gateway,
            ipv4_prefix: self.ipv4_prefix,
            ipv6_prefix: self.ipv6_prefix,
        }
    }

    pub fn settle_strategy(&self) -> SettleStrategy {
        let settle = Duration::from_secs(self.delete_settle_secs);
        if self.delete_poll {
            SettleStrategy::Poll {
                interval: Duration::from_millis(self.delete_poll_interval_ms),
                timeout: settle,
            }
        } else {
            SettleStrategy::Fixed(settle)
        }
    }
}
