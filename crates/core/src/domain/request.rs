use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::catalog::{FormDefaults, OperatingSystem, RamSize, RequestType, ValidityUnit};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw form input. Nothing here has been checked yet; see [`crate::validation::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub request_type: String,
    pub operating_system: String,
    pub cpu: i64,
    pub gpu: i64,
    pub ram: String,
    pub storage: i64,
    pub validity_period: f64,
    pub validity_unit: String,
}

impl Default for RequestDraft {
    fn default() -> Self {
        let defaults = FormDefaults::default();
        Self {
            request_type: defaults.request_type.to_string(),
            operating_system: defaults.operating_system.to_string(),
            cpu: i64::from(defaults.cpu),
            gpu: i64::from(defaults.gpu),
            ram: defaults.ram.to_string(),
            storage: defaults.storage,
            validity_period: defaults.validity_period,
            validity_unit: defaults.validity_unit.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Validity {
    pub period: f64,
    pub unit: ValidityUnit,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedDraft {
    pub request_type: RequestType,
    pub operating_system: OperatingSystem,
    pub cpu: u8,
    pub gpu: u8,
    pub ram: RamSize,
    pub storage_gb: u32,
    pub validity: Validity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Provisioning,
    Ready,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Mock credentials handed out once a request is ready. The password never shows up in
/// `Debug` output or serialized snapshots; call [`AccessDetails::password`] to read it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDetails {
    pub os_username: String,
    #[serde(serialize_with = "redact_secret")]
    password: SecretString,
    pub ssh_access: String,
}

impl AccessDetails {
    pub fn new(
        os_username: impl Into<String>,
        password: impl Into<String>,
        ssh_access: impl Into<String>,
    ) -> Self {
        Self {
            os_username: os_username.into(),
            password: SecretString::from(password.into()),
            ssh_access: ssh_access.into(),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl PartialEq for AccessDetails {
    fn eq(&self, other: &Self) -> bool {
        self.os_username == other.os_username
            && self.ssh_access == other.ssh_access
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl Eq for AccessDetails {}

fn redact_secret<S>(_secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str("<redacted>")
}

/// Read-only snapshot of a submitted request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub spec: ValidatedDraft,
    pub created_at: DateTime<Utc>,
    pub submitted_at_tick: u64,
    pub status: RequestStatus,
    pub progress: u8,
    pub access_details: Option<AccessDetails>,
}

impl ProvisioningRequest {
    pub fn is_ready(&self) -> bool {
        self.status.is_terminal()
    }
}
