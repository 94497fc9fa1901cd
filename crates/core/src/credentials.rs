use crate::domain::request::{AccessDetails, RequestId};

pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, request_id: RequestId) -> AccessDetails;
}

/// Derives mock credentials from the request id alone: `user<id>`, `pass<id>`, `ssh@<id>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicCredentialIssuer;

impl CredentialIssuer for DeterministicCredentialIssuer {
    fn issue(&self, request_id: RequestId) -> AccessDetails {
        generate(request_id)
    }
}

pub fn generate(request_id: RequestId) -> AccessDetails {
    AccessDetails::new(
        format!("user{request_id}"),
        format!("pass{request_id}"),
        format!("ssh@{request_id}"),
    )
}
