use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::WizardState;

/// Which wizard a session belongs to. Insurance and FEMA run the same
/// state machine but keep independent sessions per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardTrack {
    Insurance,
    Fema,
}

impl WizardTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardTrack::Insurance => "insurance",
            WizardTrack::Fema => "fema",
        }
    }
}

/// A per-user, per-track wizard session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSession {
    pub id: String,
    pub user_id: Uuid,
    pub track: WizardTrack,
    pub state: WizardState,
    pub updated_at: DateTime<Utc>,
}

impl WizardSession {
    pub fn new(user_id: Uuid, track: WizardTrack) -> Self {
        Self {
            id: Self::key(user_id, track),
            user_id,
            track,
            state: WizardState::new(),
            updated_at: Utc::now(),
        }
    }

    /// Storage key. One live session per user per track.
    pub fn key(user_id: Uuid, track: WizardTrack) -> String {
        format!("{}:{}", user_id, track.as_str())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
