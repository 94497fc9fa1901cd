use thiserror::Error;

use crate::domain::request::{AccessDetails, RequestStatus};
use crate::fulfillment::states::{FulfillmentEvent, FulfillmentTransition, FULL_PROGRESS};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("progress step must be between 1 and 100, got {0}")]
    InvalidStep(u8),
    #[error("cannot apply {event:?} to a request that is already {state:?}")]
    AlreadyReady { state: RequestStatus, event: FulfillmentEvent },
    #[error("progress is already at 100; waiting for credentials")]
    ProgressComplete,
}

/// Per-request fulfillment state: `Pending -> Provisioning -> Ready`.
///
/// Progress only grows, and `Ready` is terminal. A rejected operation leaves the process
/// untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FulfillmentProcess {
    status: RequestStatus,
    progress: u8,
    step: u8,
    access_details: Option<AccessDetails>,
}

impl FulfillmentProcess {
    pub fn new(step: u8) -> Result<Self, FulfillmentError> {
        if step == 0 || step > FULL_PROGRESS {
            return Err(FulfillmentError::InvalidStep(step));
        }

        Ok(Self { status: RequestStatus::Pending, progress: 0, step, access_details: None })
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn access_details(&self) -> Option<&AccessDetails> {
        self.access_details.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.status == RequestStatus::Ready
    }

    pub fn advance(&mut self) -> Result<FulfillmentTransition, FulfillmentError> {
        if self.is_ready() {
            return Err(FulfillmentError::AlreadyReady {
                state: self.status,
                event: FulfillmentEvent::ProgressTick,
            });
        }
        if self.progress >= FULL_PROGRESS {
            return Err(FulfillmentError::ProgressComplete);
        }

        let from = self.status;
        let before = self.progress;
        self.progress = before.saturating_add(self.step).min(FULL_PROGRESS);
        self.status = RequestStatus::Provisioning;

        Ok(FulfillmentTransition {
            event: FulfillmentEvent::ProgressTick,
            from,
            to: self.status,
            progress_before: before,
            progress_after: self.progress,
        })
    }

    /// Attaches credentials and finishes the process. Progress is clamped to 100 if the
    /// credentials arrive before the ticker got there.
    pub fn complete(
        &mut self,
        access_details: AccessDetails,
    ) -> Result<FulfillmentTransition, FulfillmentError> {
        if self.is_ready() {
            return Err(FulfillmentError::AlreadyReady {
                state: self.status,
                event: FulfillmentEvent::CredentialsAttached,
            });
        }

        let from = self.status;
        let before = self.progress;
        self.progress = FULL_PROGRESS;
        self.status = RequestStatus::Ready;
        self.access_details = Some(access_details);

        Ok(FulfillmentTransition {
            event: FulfillmentEvent::CredentialsAttached,
            from,
            to: self.status,
            progress_before: before,
            progress_after: self.progress,
        })
    }
}
