//! The engine's looping tasks.
//!
//! All three are registered at startup and stay registered; role and mode
//! gating is evaluated on every tick so a role flip takes effect within one
//! round without tearing tasks down.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::scheduler::{ScheduledTask, TaskControl};
use crate::adapters::nearby_leader_candidates;
use crate::config::Role;
use crate::engine::EngineContext;

pub const NEARBY_SCAN_INTERVAL: Duration = Duration::from_millis(1000);
/// Wait while a task is gated off by role or flags
pub const GATED_RETRY: Duration = Duration::from_millis(100);
pub const SERVER_INTERVAL: Duration = Duration::from_millis(50);

/// Publishes leader candidates and watches for area transitions
#[derive(Debug, Default)]
pub struct NearbyScanTask;

impl NearbyScanTask {
    pub const NAME: &'static str = "nearby-scan";
}

#[async_trait]
impl ScheduledTask<EngineContext> for NearbyScanTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn tick(&mut self, ctx: &mut EngineContext, _control: &TaskControl) -> Duration {
        let candidates = nearby_leader_candidates(ctx.world.as_ref());
        trace!(count = candidates.len(), "nearby players");
        ctx.settings.write().nearby_players = candidates;

        let area_hash = ctx.world.current_area_hash();
        if let Some(previous) = ctx.last_area_hash {
            if previous != area_hash {
                info!("Area changed ({:#x} -> {:#x})", previous, area_hash);
                ctx.state.reset_area_changing_values();
            }
        }
        ctx.last_area_hash = Some(area_hash);

        NEARBY_SCAN_INTERVAL
    }
}

/// Polls the leader while this process is a networked follower
#[derive(Debug, Default)]
pub struct NetworkRequestTask;

impl NetworkRequestTask {
    pub const NAME: &'static str = "network-request";
}

#[async_trait]
impl ScheduledTask<EngineContext> for NetworkRequestTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn tick(&mut self, ctx: &mut EngineContext, control: &TaskControl) -> Duration {
        let (enabled, url, timeout, delay) = {
            let s = ctx.settings.read();
            (
                s.network_requests_enabled(),
                s.url.clone(),
                Duration::from_millis(s.request_timeout_ms),
                Duration::from_millis(s.delay_between_requests_ms),
            )
        };
        if !enabled {
            return GATED_RETRY;
        }

        let outcome = ctx.sync.exchange(&url, timeout).await;

        if !control.is_running() {
            debug!("Network task stopped mid-request, discarding {:?}", outcome);
            return delay;
        }
        if let Some(activity) = outcome.payload() {
            ctx.settings.write().apply_network_activity(activity);
        }
        delay
    }
}

/// Services the broadcast server while this process leads
#[derive(Debug, Default)]
pub struct ServerTask;

impl ServerTask {
    pub const NAME: &'static str = "server";
}

#[async_trait]
impl ScheduledTask<EngineContext> for ServerTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn tick(&mut self, ctx: &mut EngineContext, _control: &TaskControl) -> Duration {
        let role = ctx.settings.read().role;
        if role != Role::Leader {
            return GATED_RETRY;
        }
        ctx.server.service_once().await;
        SERVER_INTERVAL
    }
}
