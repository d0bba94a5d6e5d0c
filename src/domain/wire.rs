use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Leader parameters broadcast to followers.
///
/// Unknown fields are ignored; both fields are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkActivityObject {
    pub leader_name: String,
    pub leader_proximity_radius: f32,
}

impl NetworkActivityObject {
    /// Parse a leader response body. A literal `null` body yields `None`.
    pub fn parse(body: &str) -> Result<Option<Self>> {
        Ok(serde_json::from_str::<Option<Self>>(body)?)
    }
}
