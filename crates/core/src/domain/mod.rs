pub mod request;

pub use request::{
    AccessDetails, ProvisioningRequest, RequestDraft, RequestId, RequestStatus, ValidatedDraft,
    Validity,
};
