//! Per-follower coordination record and the action dedup protocol.
//!
//! Each tracked action keeps a live `last_used` timestamp and a
//! `saved_last_used` shadow captured when an attempt begins. If the live
//! value moved past the shadow, something (usually the completion handler)
//! already recorded the action and it counts as done for this cycle, even if
//! an area reload happened in between.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::action::{ActionKind, TrackedAction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Live and saved last-use time of one tracked action. `None` means never.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStamp {
    pub last_used: Option<DateTime<Utc>>,
    pub saved_last_used: Option<DateTime<Utc>>,
}

impl UsageStamp {
    fn snapshot(&mut self) {
        self.saved_last_used = self.last_used;
    }

    fn record(&mut self, at: DateTime<Utc>) {
        self.last_used = Some(at);
    }

    /// Whether the live timestamp moved since the last snapshot
    pub fn advanced_since_snapshot(&self) -> bool {
        self.last_used != self.saved_last_used
    }

    /// Time since last use; `None` (never used) is older than any window.
    pub fn used_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_used {
            Some(at) => now.signed_duration_since(at) < window,
            None => false,
        }
    }
}

/// Skill rotation entry consumed by combat logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerSkill {
    pub id: u32,
    pub name: String,
    pub enabled: bool,
    pub hotkey: String,
    /// Lower runs first
    pub priority: u32,
    pub cooldown_ms: u64,
    pub max_range: f32,
    #[serde(default)]
    pub last_time_used: Option<DateTime<Utc>>,
}

impl FollowerSkill {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_time_used {
            Some(at) => {
                now.signed_duration_since(at) >= Duration::milliseconds(self.cooldown_ms as i64)
            }
            None => true,
        }
    }
}

/// Result of counting one scheduler tick against the current action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionProgress {
    /// No action in progress
    Idle,
    /// Still attempting; carries the consecutive tick count
    Continuing(u32),
    /// Bound exceeded, `current_action` was forced back to idle
    GaveUp { action: ActionKind, iterations: u32 },
}

/// Coordination record for a single follower.
///
/// Owned by the engine and mutated only from scheduler task bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerCoordinationState {
    pub current_action: ActionKind,
    pub aggressive: bool,

    pub entrance_logic_iteration_count: u32,
    pub local_entrance_logic_iteration_count: u32,
    pub portal_logic_iteration_count: u32,
    pub waypoint_logic_iteration_count: u32,
    pub teleporting_logic_iteration_count: u32,

    /// World identity captured when an area-changing action began
    pub saved_current_area_hash: u32,
    pub saved_current_pos: Vector3,

    pub entrance: UsageStamp,
    pub portal: UsageStamp,
    pub waypoint: UsageStamp,
    pub teleport: UsageStamp,
    pub quest_item_pickup: UsageStamp,
    pub normal_item_pickup: UsageStamp,
    pub enter_hideout: UsageStamp,

    pub normal_item_id: i64,
    pub hideout_character_name: String,
    pub follower_skills: Vec<FollowerSkill>,

    pub should_level_up_gems: bool,
    pub last_time_level_up_gems_composite_ran: Option<DateTime<Utc>>,
    pub should_follow_through_entrances: bool,
}

impl Default for FollowerCoordinationState {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowerCoordinationState {
    pub fn new() -> Self {
        Self {
            current_action: ActionKind::None,
            aggressive: true,
            entrance_logic_iteration_count: 0,
            local_entrance_logic_iteration_count: 0,
            portal_logic_iteration_count: 0,
            waypoint_logic_iteration_count: 0,
            teleporting_logic_iteration_count: 0,
            saved_current_area_hash: 0,
            saved_current_pos: Vector3::ZERO,
            entrance: UsageStamp::default(),
            portal: UsageStamp::default(),
            waypoint: UsageStamp::default(),
            teleport: UsageStamp::default(),
            quest_item_pickup: UsageStamp::default(),
            normal_item_pickup: UsageStamp::default(),
            enter_hideout: UsageStamp::default(),
            normal_item_id: 0,
            hideout_character_name: String::new(),
            follower_skills: Vec::new(),
            should_level_up_gems: false,
            last_time_level_up_gems_composite_ran: None,
            should_follow_through_entrances: false,
        }
    }

    pub fn stamp(&self, action: TrackedAction) -> &UsageStamp {
        match action {
            TrackedAction::Entrance => &self.entrance,
            TrackedAction::Portal => &self.portal,
            TrackedAction::Waypoint => &self.waypoint,
            TrackedAction::Teleport => &self.teleport,
            TrackedAction::QuestItemPickup => &self.quest_item_pickup,
            TrackedAction::NormalItemPickup => &self.normal_item_pickup,
            TrackedAction::EnterHideout => &self.enter_hideout,
        }
    }

    fn stamp_mut(&mut self, action: TrackedAction) -> &mut UsageStamp {
        match action {
            TrackedAction::Entrance => &mut self.entrance,
            TrackedAction::Portal => &mut self.portal,
            TrackedAction::Waypoint => &mut self.waypoint,
            TrackedAction::Teleport => &mut self.teleport,
            TrackedAction::QuestItemPickup => &mut self.quest_item_pickup,
            TrackedAction::NormalItemPickup => &mut self.normal_item_pickup,
            TrackedAction::EnterHideout => &mut self.enter_hideout,
        }
    }

    fn iteration_counter_mut(&mut self, action: ActionKind) -> Option<&mut u32> {
        match action {
            ActionKind::UsingEntrance => Some(&mut self.entrance_logic_iteration_count),
            ActionKind::UsingLocalEntrance => Some(&mut self.local_entrance_logic_iteration_count),
            ActionKind::UsingPortal => Some(&mut self.portal_logic_iteration_count),
            ActionKind::UsingWaypoint => Some(&mut self.waypoint_logic_iteration_count),
            ActionKind::Teleporting => Some(&mut self.teleporting_logic_iteration_count),
            _ => None,
        }
    }

    /// Pin `action` as in progress and capture the dedup snapshot.
    ///
    /// The saved timestamp is the live value *before* the attempt; area
    /// hash and position are captured only for area-changing actions.
    pub fn begin_action(&mut self, action: ActionKind, area_hash: u32, pos: Vector3) {
        trace!(%action, area_hash, "begin action");

        self.current_action = action;
        if let Some(tracked) = action.tracked() {
            self.stamp_mut(tracked).snapshot();
        }
        if action.is_area_changing() {
            self.saved_current_area_hash = area_hash;
            self.saved_current_pos = pos;
        }
    }

    /// Completion handler hook: the action really happened at `at`
    pub fn record_action_used(&mut self, action: TrackedAction, at: DateTime<Utc>) {
        debug!(%action, %at, "action used");
        self.stamp_mut(action).record(at);
    }

    /// Whether `action` was already recorded since its attempt began.
    ///
    /// Compares live against saved timestamps, so the answer survives area
    /// reloads. Resolution is that of the recorded timestamps: a completion
    /// recorded with the same instant as the previous one is not seen.
    pub fn is_action_satisfied(&self, action: TrackedAction) -> bool {
        self.stamp(action).advanced_since_snapshot()
    }

    /// Count one scheduler tick spent on the current action.
    ///
    /// With `max_iterations` set, exceeding it forces the action back to idle.
    pub fn tick_current_action(&mut self, max_iterations: Option<u32>) -> ActionProgress {
        let action = self.current_action;
        if action.is_idle() {
            return ActionProgress::Idle;
        }

        let Some(counter) = self.iteration_counter_mut(action) else {
            return ActionProgress::Continuing(0);
        };
        *counter += 1;
        let iterations = *counter;

        match max_iterations {
            Some(max) if iterations > max => {
                warn!(%action, iterations, "action looks stuck, giving up");
                if let Some(counter) = self.iteration_counter_mut(action) {
                    *counter = 0;
                }
                self.current_action = ActionKind::None;
                ActionProgress::GaveUp { action, iterations }
            }
            _ => ActionProgress::Continuing(iterations),
        }
    }

    /// Return to idle once the current action completed
    pub fn finish_action(&mut self) {
        trace!(action = %self.current_action, "finish action");
        if let Some(counter) = self.iteration_counter_mut(self.current_action) {
            *counter = 0;
        }
        self.current_action = ActionKind::None;
    }

    /// Call exactly once per confirmed area transition.
    ///
    /// Zeroes transition-scoped counters and snapshots only; timestamp
    /// history is kept so actions are not repeated right after a reload.
    pub fn reset_area_changing_values(&mut self) {
        self.entrance_logic_iteration_count = 0;
        self.saved_current_pos = Vector3::ZERO;
        self.saved_current_area_hash = 0;
        self.portal_logic_iteration_count = 0;
        self.waypoint_logic_iteration_count = 0;
        self.teleporting_logic_iteration_count = 0;
    }

    pub fn record_normal_item_pickup(&mut self, item_id: i64, at: DateTime<Utc>) {
        self.normal_item_id = item_id;
        self.record_action_used(TrackedAction::NormalItemPickup, at);
    }

    /// Avoid re-targeting the item picked up last
    pub fn is_last_normal_item(&self, item_id: i64) -> bool {
        self.normal_item_id != 0 && self.normal_item_id == item_id
    }

    /// Record the hideout owner; returns true when it differs from the previous one
    pub fn update_hideout_character(&mut self, name: &str) -> bool {
        if self.hideout_character_name == name {
            return false;
        }
        self.hideout_character_name = name.to_string();
        true
    }

    pub fn level_up_gems_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        if !self.should_level_up_gems {
            return false;
        }
        match self.last_time_level_up_gems_composite_ran {
            Some(at) => now.signed_duration_since(at) >= interval,
            None => true,
        }
    }

    pub fn mark_level_up_gems_ran(&mut self, at: DateTime<Utc>) {
        self.last_time_level_up_gems_composite_ran = Some(at);
    }

    /// Enabled skills ordered by priority that are off cooldown
    pub fn ready_skills(&self, now: DateTime<Utc>) -> Vec<&FollowerSkill> {
        let mut ready: Vec<&FollowerSkill> = self
            .follower_skills
            .iter()
            .filter(|s| s.is_ready(now))
            .collect();
        ready.sort_by_key(|s| s.priority);
        ready
    }
}
