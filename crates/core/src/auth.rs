//! Login gate consulted before a request may be submitted.
//!
//! There is no credential check: any non-blank email counts as signed in.

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub email: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("an email address is required to submit requests")]
    MissingEmail,
}

pub fn authenticate(email: &str) -> Result<Operator, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::MissingEmail);
    }

    Ok(Operator { email: email.to_owned() })
}
