use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::FollowerError;

/// Which side of the leader/follower protocol this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
    Disabled,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
            Role::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for Role {
    type Err = FollowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leader" => Ok(Role::Leader),
            "follower" => Ok(Role::Follower),
            "disabled" | "disable" => Ok(Role::Disabled),
            _ => Err(FollowerError::UnsupportedRole(s.to_string())),
        }
    }
}

/// Where a follower gets its leader parameters from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerMode {
    /// Leader parameters are configured by hand on this machine
    Local,
    /// Leader parameters are polled from the leader's broadcast server
    Network,
}

impl fmt::Display for FollowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowerMode::Local => write!(f, "local"),
            FollowerMode::Network => write!(f, "network"),
        }
    }
}

impl FromStr for FollowerMode {
    type Err = FollowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(FollowerMode::Local),
            "network" => Ok(FollowerMode::Network),
            _ => Err(FollowerError::UnsupportedFollowerMode(s.to_string())),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// leader, follower or disabled
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub leader: LeaderConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_role() -> String {
    "disabled".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowerConfig {
    /// local or network
    #[serde(default = "default_follower_mode")]
    pub mode: String,
    /// Name of the player to follow
    #[serde(default)]
    pub leader_name: String,
    /// Distance at which the follower considers itself close enough
    #[serde(default = "default_leader_proximity_radius")]
    pub leader_proximity_radius: f32,
    /// Whether the network-request task should poll the leader
    #[serde(default)]
    pub start_network_requesting: bool,
    /// Key toggling `start_network_requesting`
    #[serde(default = "default_start_requesting_hotkey")]
    pub start_requesting_hotkey: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_follower_mode() -> String {
    "local".to_string()
}

fn default_leader_proximity_radius() -> f32 {
    200.0
}

fn default_start_requesting_hotkey() -> String {
    "F3".to_string()
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            mode: default_follower_mode(),
            leader_name: String::new(),
            leader_proximity_radius: default_leader_proximity_radius(),
            start_network_requesting: false,
            start_requesting_hotkey: default_start_requesting_hotkey(),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Leader status endpoint, e.g. http://192.168.1.10:4412/status
    #[serde(default)]
    pub url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pause between two synchronization exchanges in milliseconds
    #[serde(default = "default_delay_between_requests_ms")]
    pub delay_between_requests_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_delay_between_requests_ms() -> u64 {
    1000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            delay_between_requests_ms: default_delay_between_requests_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderConfig {
    /// Name broadcast to followers
    #[serde(default)]
    pub leader_name_to_propagate: String,
    /// Radius broadcast to followers
    #[serde(default = "default_proximity_radius_to_propagate")]
    pub proximity_radius_to_propagate: f32,
    /// Whether followers should act on the broadcast at all
    #[serde(default)]
    pub propagate_working: bool,
    /// Key toggling `propagate_working`
    #[serde(default = "default_propagate_hotkey")]
    pub propagate_hotkey: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_proximity_radius_to_propagate() -> f32 {
    100.0
}

fn default_propagate_hotkey() -> String {
    "F4".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4412
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            leader_name_to_propagate: String::new(),
            proximity_radius_to_propagate: default_proximity_radius_to_propagate(),
            propagate_working: false,
            propagate_hotkey: default_propagate_hotkey(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Upper bound (exclusive) of the random pixel offset added to cursor moves
    #[serde(default = "default_random_click_offset")]
    pub random_click_offset: u32,
    /// Key that, while held in debug mode, hovers the cursor over the leader
    #[serde(default = "default_debug_hover_key")]
    pub debug_hover_key: String,
}

fn default_random_click_offset() -> u32 {
    10
}

fn default_debug_hover_key() -> String {
    "F5".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            random_click_offset: default_random_click_offset(),
            debug_hover_key: default_debug_hover_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Trace every coordination call (only honored with `enabled`)
    #[serde(default)]
    pub verbose: bool,
    /// Ask the overlay adapter to draw proximity radii
    #[serde(default)]
    pub show_radius: bool,
}

impl DebugConfig {
    /// Crate-level directive raised by debug mode, if any
    pub fn log_directive(&self) -> Option<&'static str> {
        match (self.enabled, self.verbose) {
            (true, true) => Some("follower=trace"),
            (true, false) => Some("follower=debug"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            follower: FollowerConfig::default(),
            leader: LeaderConfig::default(),
            input: InputConfig::default(),
            debug: DebugConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                json: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("role", "disabled")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("follower.network.request_timeout_ms", 3000)?
            .set_default("follower.network.delay_between_requests_ms", 1000)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FOLLOWER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FOLLOWER_FOLLOWER__NETWORK__URL, etc.)
            .add_source(
                Environment::with_prefix("FOLLOWER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// `EnvFilter` directives: the configured level for every target, and
    /// the debug directive for this crate only when debug mode is on
    pub fn log_filter(&self) -> String {
        let level = self.logging.level.trim();
        match self.debug.log_directive() {
            Some(directive) => format!("{level},{directive}"),
            None => level.to_string(),
        }
    }

    pub fn role(&self) -> crate::Result<Role> {
        self.role.parse()
    }

    pub fn follower_mode(&self) -> crate::Result<FollowerMode> {
        self.follower.mode.parse()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.role() {
            errors.push(e.to_string());
        }

        match self.follower_mode() {
            Ok(FollowerMode::Network) => {
                let url = self.follower.network.url.trim();
                if url.is_empty() {
                    errors.push("follower.network.url must be set in network mode".to_string());
                } else if let Err(e) = url::Url::parse(url) {
                    errors.push(format!("follower.network.url is not a valid url: {e}"));
                }
            }
            Ok(FollowerMode::Local) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if self.follower.network.request_timeout_ms == 0 {
            errors.push("follower.network.request_timeout_ms must be positive".to_string());
        }

        if self.follower.leader_proximity_radius < 0.0 {
            errors.push("follower.leader_proximity_radius must not be negative".to_string());
        }

        if self.leader.proximity_radius_to_propagate < 0.0 {
            errors.push("leader.proximity_radius_to_propagate must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
