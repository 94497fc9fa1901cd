pub mod audit;
pub mod auth;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod fulfillment;
pub mod identity;
pub mod lifecycle;
pub mod scheduler;
pub mod service;
pub mod validation;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use auth::{authenticate, AuthError, Operator};
pub use catalog::{
    CatalogListing, FormDefaults, OperatingSystem, RamSize, RequestType, ValidityUnit,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::{CredentialIssuer, DeterministicCredentialIssuer};
pub use domain::request::{
    AccessDetails, ProvisioningRequest, RequestDraft, RequestId, RequestStatus, ValidatedDraft,
    Validity,
};
pub use errors::{ApplicationError, InterfaceError};
pub use fulfillment::{CompletionPolicy, FulfillmentError, FulfillmentProcess};
pub use identity::IdentityAllocator;
pub use lifecycle::{FulfillmentSettings, LifecycleError, LifecycleEvent, LifecycleManager};
pub use scheduler::{DeadlineOverflow, Scheduler, Tick, TimerId, TimerKind};
pub use service::{ProvisioningService, ServiceError};
pub use validation::{validate, ValidationError};
