//! Live settings shared between the scheduler and the host's frame thread.
//!
//! `AppConfig` is the on-disk shape; `RuntimeSettings` is what hotkeys, the
//! role controller and network results mutate while the engine runs.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

use crate::config::{AppConfig, FollowerMode, Role};
use crate::domain::NetworkActivityObject;

/// Leader parameters a follower steers by
#[derive(Debug, Clone, PartialEq)]
pub struct TargetingParams {
    pub leader_name: String,
    pub leader_proximity_radius: f32,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub role: Role,
    pub follower_mode: FollowerMode,
    pub targeting: TargetingParams,
    pub start_network_requesting: bool,
    pub url: String,
    pub request_timeout_ms: u64,
    pub delay_between_requests_ms: u64,
    pub leader_name_to_propagate: String,
    pub proximity_radius_to_propagate: f32,
    pub propagate_working: bool,
    /// Names published by the nearby-scan task for leader selection
    pub nearby_players: Vec<String>,
    /// Entry currently picked in the nearby list, empty when none
    pub nearby_selection: String,
    pub random_click_offset: u32,
    pub debug: bool,
    pub show_radius: bool,
}

impl RuntimeSettings {
    /// Unsupported role or mode values are logged and fall back to
    /// `Disabled` / `Local` so the process keeps running
    pub fn from_config(config: &AppConfig) -> Self {
        let role = config.role().unwrap_or_else(|e| {
            error!("{}, falling back to {}", e, Role::Disabled);
            Role::Disabled
        });
        let follower_mode = config.follower_mode().unwrap_or_else(|e| {
            error!("{}, falling back to {}", e, FollowerMode::Local);
            FollowerMode::Local
        });
        Self::with_modes(config, role, follower_mode)
    }

    fn with_modes(config: &AppConfig, role: Role, follower_mode: FollowerMode) -> Self {
        Self {
            role,
            follower_mode,
            targeting: TargetingParams {
                leader_name: config.follower.leader_name.clone(),
                leader_proximity_radius: config.follower.leader_proximity_radius,
            },
            start_network_requesting: config.follower.start_network_requesting,
            url: config.follower.network.url.clone(),
            request_timeout_ms: config.follower.network.request_timeout_ms,
            delay_between_requests_ms: config.follower.network.delay_between_requests_ms,
            leader_name_to_propagate: config.leader.leader_name_to_propagate.clone(),
            proximity_radius_to_propagate: config.leader.proximity_radius_to_propagate,
            propagate_working: config.leader.propagate_working,
            nearby_players: Vec::new(),
            nearby_selection: String::new(),
            random_click_offset: config.input.random_click_offset,
            debug: config.debug.enabled,
            show_radius: config.debug.show_radius,
        }
    }

    /// Whether the network-request task should perform an exchange this tick
    pub fn network_requests_enabled(&self) -> bool {
        self.role == Role::Follower
            && self.follower_mode == FollowerMode::Network
            && self.start_network_requesting
    }

    /// Overwrite targeting with what the leader broadcast
    pub fn apply_network_activity(&mut self, activity: &NetworkActivityObject) {
        self.targeting.leader_name = activity.leader_name.clone();
        self.targeting.leader_proximity_radius = activity.leader_proximity_radius;
    }

    /// Payload a leader hands out to followers
    pub fn broadcast_payload(&self) -> NetworkActivityObject {
        NetworkActivityObject {
            leader_name: self.leader_name_to_propagate.clone(),
            leader_proximity_radius: self.proximity_radius_to_propagate,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::with_modes(&AppConfig::default(), Role::Disabled, FollowerMode::Local)
    }
}

/// Handle to the settings shared across the scheduler and the frame thread
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<RwLock<RuntimeSettings>>);

impl SharedSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RuntimeSettings> {
        // A panicked writer cannot leave these plain fields half-updated.
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, RuntimeSettings> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current settings, taken without holding the lock across awaits
    pub fn snapshot(&self) -> RuntimeSettings {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_requests_gating() {
        let mut settings = RuntimeSettings::default();
        assert!(!settings.network_requests_enabled());

        settings.role = Role::Follower;
        settings.start_network_requesting = true;
        assert!(!settings.network_requests_enabled(), "local mode stays gated");

        settings.follower_mode = FollowerMode::Network;
        assert!(settings.network_requests_enabled());

        settings.role = Role::Leader;
        assert!(!settings.network_requests_enabled());
    }

    #[test]
    fn test_unsupported_values_fall_back_instead_of_failing() {
        let mut config = AppConfig::default();
        config.role = "observer".to_string();
        config.follower.mode = "telepathy".to_string();
        config.follower.leader_name = "Alice".to_string();

        let settings = RuntimeSettings::from_config(&config);

        assert_eq!(settings.role, Role::Disabled);
        assert_eq!(settings.follower_mode, FollowerMode::Local);
        assert_eq!(settings.targeting.leader_name, "Alice");
    }

    #[test]
    fn test_from_config_keeps_supported_values() {
        let mut config = AppConfig::default();
        config.role = "Leader".to_string();
        config.follower.mode = "network".to_string();

        let settings = RuntimeSettings::from_config(&config);

        assert_eq!(settings.role, Role::Leader);
        assert_eq!(settings.follower_mode, FollowerMode::Network);
    }

    #[test]
    fn test_apply_network_activity_overwrites_targeting() {
        let mut settings = RuntimeSettings::default();
        settings.apply_network_activity(&NetworkActivityObject {
            leader_name: "Bob".to_string(),
            leader_proximity_radius: 40.0,
        });

        assert_eq!(settings.targeting.leader_name, "Bob");
        assert_eq!(settings.targeting.leader_proximity_radius, 40.0);
    }
}
