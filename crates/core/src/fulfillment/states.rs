use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;

pub const FULL_PROGRESS: u8 = 100;

/// When credentials become available relative to the progress ticker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Credentials come from their own one-shot timer, measured from submission.
    #[default]
    Decoupled,
    /// Credentials are issued on the tick where progress reaches 100.
    Linked,
}

impl CompletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decoupled => "decoupled",
            Self::Linked => "linked",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentEvent {
    ProgressTick,
    CredentialsAttached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentTransition {
    pub event: FulfillmentEvent,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub progress_before: u8,
    pub progress_after: u8,
}

impl FulfillmentTransition {
    pub fn reached_full_progress(&self) -> bool {
        self.progress_before < FULL_PROGRESS && self.progress_after == FULL_PROGRESS
    }
}
