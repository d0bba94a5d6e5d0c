use serde::{Deserialize, Serialize};
use std::fmt;

/// World-affecting action a follower can be in the middle of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Idle
    #[default]
    None,
    UsingEntrance,
    /// Entrance that leads somewhere inside the current area
    UsingLocalEntrance,
    UsingPortal,
    UsingWaypoint,
    PickingQuestItem,
    PickingNormalItem,
    EnteringHideout,
    Teleporting,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::None,
        ActionKind::UsingEntrance,
        ActionKind::UsingLocalEntrance,
        ActionKind::UsingPortal,
        ActionKind::UsingWaypoint,
        ActionKind::PickingQuestItem,
        ActionKind::PickingNormalItem,
        ActionKind::EnteringHideout,
        ActionKind::Teleporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::UsingEntrance => "using-entrance",
            ActionKind::UsingLocalEntrance => "using-local-entrance",
            ActionKind::UsingPortal => "using-portal",
            ActionKind::UsingWaypoint => "using-waypoint",
            ActionKind::PickingQuestItem => "picking-quest-item",
            ActionKind::PickingNormalItem => "picking-normal-item",
            ActionKind::EnteringHideout => "entering-hideout",
            ActionKind::Teleporting => "teleporting",
        }
    }

    /// Timestamp pair that records when this action last happened
    pub fn tracked(&self) -> Option<TrackedAction> {
        match self {
            ActionKind::None => None,
            ActionKind::UsingEntrance | ActionKind::UsingLocalEntrance => {
                Some(TrackedAction::Entrance)
            }
            ActionKind::UsingPortal => Some(TrackedAction::Portal),
            ActionKind::UsingWaypoint => Some(TrackedAction::Waypoint),
            ActionKind::PickingQuestItem => Some(TrackedAction::QuestItemPickup),
            ActionKind::PickingNormalItem => Some(TrackedAction::NormalItemPickup),
            ActionKind::EnteringHideout => Some(TrackedAction::EnterHideout),
            ActionKind::Teleporting => Some(TrackedAction::Teleport),
        }
    }

    /// Actions after which position and area hash no longer mean the same thing
    pub fn is_area_changing(&self) -> bool {
        matches!(
            self,
            ActionKind::UsingEntrance
                | ActionKind::UsingLocalEntrance
                | ActionKind::UsingPortal
                | ActionKind::UsingWaypoint
                | ActionKind::EnteringHideout
                | ActionKind::Teleporting
        )
    }

    pub fn is_idle(&self) -> bool {
        *self == ActionKind::None
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions whose last-use time is remembered across area transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackedAction {
    Entrance,
    Portal,
    Waypoint,
    Teleport,
    QuestItemPickup,
    NormalItemPickup,
    EnterHideout,
}

impl TrackedAction {
    pub const ALL: [TrackedAction; 7] = [
        TrackedAction::Entrance,
        TrackedAction::Portal,
        TrackedAction::Waypoint,
        TrackedAction::Teleport,
        TrackedAction::QuestItemPickup,
        TrackedAction::NormalItemPickup,
        TrackedAction::EnterHideout,
    ];
}

impl fmt::Display for TrackedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedAction::Entrance => write!(f, "entrance"),
            TrackedAction::Portal => write!(f, "portal"),
            TrackedAction::Waypoint => write!(f, "waypoint"),
            TrackedAction::Teleport => write!(f, "teleport"),
            TrackedAction::QuestItemPickup => write!(f, "quest-item-pickup"),
            TrackedAction::NormalItemPickup => write!(f, "normal-item-pickup"),
            TrackedAction::EnterHideout => write!(f, "enter-hideout"),
        }
    }
}
