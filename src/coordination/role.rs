//! Role and follower-mode transitions.
//!
//! Transitions are explicit calls returning success or an error; an
//! unrecognised value changes nothing. The looping tasks keep running in
//! every role and gate themselves on the settings written here.

use tracing::{error, info, warn};

use crate::config::{FollowerMode, Role};
use crate::error::Result;
use crate::services::RoleServer;
use crate::settings::SharedSettings;

/// What a transition did, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTransition {
    pub from: Role,
    pub to: Role,
    pub follower_mode: FollowerMode,
    pub server_running: bool,
}

#[derive(Debug, Clone)]
pub struct RoleController {
    settings: SharedSettings,
}

impl RoleController {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }

    /// Parse and apply a role name coming from the UI or CLI
    pub async fn change_role(
        &self,
        value: &str,
        server: &mut dyn RoleServer,
    ) -> Result<RoleTransition> {
        let role = value.parse::<Role>().map_err(|e| {
            error!("Role change rejected: {}", e);
            e
        })?;
        self.apply_role(role, server).await
    }

    pub async fn apply_role(
        &self,
        role: Role,
        server: &mut dyn RoleServer,
    ) -> Result<RoleTransition> {
        let from = self.settings.read().role;

        match role {
            Role::Leader => {
                // Role stays as it was if the listener cannot bind.
                if let Err(e) = server.start().await {
                    error!("Cannot become leader: {}", e);
                    return Err(e);
                }
                self.settings.write().role = Role::Leader;
            }
            Role::Follower => {
                server.stop().await;
                self.settings.write().role = Role::Follower;
            }
            Role::Disabled => {
                server.stop().await;
                let mut settings = self.settings.write();
                settings.role = Role::Disabled;
                settings.start_network_requesting = false;
            }
        }

        let transition = self.transition(from, server);
        info!(
            "Role {} -> {} (server running: {})",
            transition.from, transition.to, transition.server_running
        );
        Ok(transition)
    }

    /// Parse and apply a follower sub-mode
    pub async fn change_follower_mode(
        &self,
        value: &str,
        server: &mut dyn RoleServer,
    ) -> Result<RoleTransition> {
        let mode = value.parse::<FollowerMode>().map_err(|e| {
            error!("Follower mode change rejected: {}", e);
            e
        })?;

        let role = self.settings.read().role;
        if role != Role::Follower {
            warn!("Follower mode set to {} while role is {}", mode, role);
        }

        if mode == FollowerMode::Local {
            server.stop().await;
        }
        self.settings.write().follower_mode = mode;

        info!("Follower mode is now {}", mode);
        Ok(self.transition(role, server))
    }

    fn transition(&self, from: Role, server: &dyn RoleServer) -> RoleTransition {
        let settings = self.settings.read();
        RoleTransition {
            from,
            to: settings.role,
            follower_mode: settings.follower_mode,
            server_running: server.is_running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::tasks::tests::CountingServer;
    use crate::error::FollowerError;
    use async_trait::async_trait;

    fn controller() -> (RoleController, SharedSettings) {
        let settings = SharedSettings::default();
        (RoleController::new(settings.clone()), settings)
    }

    #[tokio::test]
    async fn test_leader_starts_server() {
        let (controller, settings) = controller();
        let mut server = CountingServer::default();

        let t = controller.change_role("leader", &mut server).await.unwrap();

        assert_eq!(t.from, Role::Disabled);
        assert_eq!(t.to, Role::Leader);
        assert!(t.server_running);
        assert_eq!(settings.read().role, Role::Leader);
    }

    #[tokio::test]
    async fn test_leader_keeps_start_requesting_flag() {
        let (controller, settings) = controller();
        settings.write().start_network_requesting = true;
        let mut server = CountingServer::default();

        controller.apply_role(Role::Leader, &mut server).await.unwrap();

        let s = settings.read();
        assert!(s.start_network_requesting);
        assert!(!s.network_requests_enabled(), "gated by role instead");
    }

    #[tokio::test]
    async fn test_follower_and_disabled_stop_server() {
        let (controller, settings) = controller();
        let mut server = CountingServer::default();
        controller.apply_role(Role::Leader, &mut server).await.unwrap();

        let t = controller.apply_role(Role::Follower, &mut server).await.unwrap();
        assert!(!t.server_running);

        controller.apply_role(Role::Leader, &mut server).await.unwrap();
        settings.write().start_network_requesting = true;
        let t = controller.apply_role(Role::Disabled, &mut server).await.unwrap();

        assert!(!t.server_running);
        assert_eq!(t.to, Role::Disabled);
        assert!(!settings.read().start_network_requesting);
    }

    #[tokio::test]
    async fn test_unknown_role_changes_nothing() {
        let (controller, settings) = controller();
        let mut server = CountingServer::default();
        controller.apply_role(Role::Leader, &mut server).await.unwrap();

        let err = controller.change_role("spectator", &mut server).await;

        assert!(matches!(err, Err(FollowerError::UnsupportedRole(_))));
        assert_eq!(settings.read().role, Role::Leader);
        assert!(server.is_running());
    }

    #[tokio::test]
    async fn test_follower_mode_transitions() {
        let (controller, settings) = controller();
        let mut server = CountingServer::default();
        controller.apply_role(Role::Follower, &mut server).await.unwrap();
        server.running = true;

        let t = controller
            .change_follower_mode("network", &mut server)
            .await
            .unwrap();
        assert_eq!(t.follower_mode, FollowerMode::Network);
        assert!(t.server_running, "network mode leaves the server alone");

        let t = controller
            .change_follower_mode("local", &mut server)
            .await
            .unwrap();
        assert_eq!(t.follower_mode, FollowerMode::Local);
        assert!(!t.server_running);

        assert!(controller
            .change_follower_mode("carrier-pigeon", &mut server)
            .await
            .is_err());
        assert_eq!(settings.read().follower_mode, FollowerMode::Local);
    }

    struct UnbindableServer;

    #[async_trait]
    impl RoleServer for UnbindableServer {
        async fn start(&mut self) -> Result<()> {
            Err(FollowerError::Server("address in use".to_string()))
        }

        async fn stop(&mut self) {}

        async fn service_once(&mut self) -> u64 {
            0
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_failed_bind_keeps_previous_role() {
        let (controller, settings) = controller();
        settings.write().role = Role::Follower;

        let result = controller.apply_role(Role::Leader, &mut UnbindableServer).await;

        assert!(matches!(result, Err(FollowerError::Server(_))));
        assert_eq!(settings.read().role, Role::Follower);
    }
}
