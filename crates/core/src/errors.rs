use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::LifecycleError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Lifecycle(LifecycleError::Validation(value))
    }
}

/// What an outer surface is allowed to show. `message` is operator-facing detail;
/// `user_message` is safe to show to whoever filled in the form.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, user_message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("misconfigured: {message}")]
    Misconfigured { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

const UNASSIGNED: &str = "unassigned";

impl InterfaceError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { user_message, .. } => user_message,
            Self::NotFound { .. } => "The requested provisioning request does not exist.",
            Self::Misconfigured { .. } => "The provisioning service is not configured correctly.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Misconfigured { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Misconfigured { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

fn validation_user_message(error: &ValidationError) -> String {
    match error {
        ValidationError::InvalidValidityPeriod { .. } => {
            "Please enter a positive validity period.".to_owned()
        }
        ValidationError::InvalidEnumValue { field, allowed, .. } => {
            format!("Please choose a {field} from: {allowed}.")
        }
        ValidationError::InvalidNumericField { field, reason, .. } => {
            format!("Please enter a valid {field}: {reason}.")
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Lifecycle(LifecycleError::Validation(error)) => Self::BadRequest {
                user_message: validation_user_message(&error),
                message: error.to_string(),
                correlation_id: UNASSIGNED.to_owned(),
            },
            ApplicationError::Lifecycle(error @ LifecycleError::UnknownRequest(_)) => {
                Self::NotFound { message: error.to_string(), correlation_id: UNASSIGNED.to_owned() }
            }
            ApplicationError::Lifecycle(
                error @ (LifecycleError::Fulfillment(_) | LifecycleError::ClockExhausted(_)),
            ) => {
                Self::Internal { message: error.to_string(), correlation_id: UNASSIGNED.to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Misconfigured { message, correlation_id: UNASSIGNED.to_owned() }
            }
            ApplicationError::Runtime(message) => {
                Self::Internal { message, correlation_id: UNASSIGNED.to_owned() }
            }
        }
    }
}
