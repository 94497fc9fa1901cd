//! Fixed option catalogs offered by the request form.
//!
//! Both the validator and every presentation surface read the allowed values from here, so
//! the option lists exist exactly once.

use serde::{Deserialize, Serialize};

pub const MIN_CORE_COUNT: u8 = 1;
pub const MAX_CORE_COUNT: u8 = 10;

pub const CORE_COUNT_OPTIONS: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "Virtual Machine (VM)")]
    VirtualMachine,
    #[serde(rename = "Session")]
    Session,
    #[serde(rename = "Container")]
    Container,
}

impl RequestType {
    pub const ALL: [Self; 3] = [Self::VirtualMachine, Self::Session, Self::Container];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualMachine => "Virtual Machine (VM)",
            Self::Session => "Session",
            Self::Container => "Container",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|option| option.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    #[serde(rename = "Ubuntu 18.04")]
    Ubuntu1804,
    #[serde(rename = "Ubuntu 20.04")]
    Ubuntu2004,
}

impl OperatingSystem {
    pub const ALL: [Self; 2] = [Self::Ubuntu1804, Self::Ubuntu2004];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ubuntu1804 => "Ubuntu 18.04",
            Self::Ubuntu2004 => "Ubuntu 20.04",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|option| option.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RamSize {
    #[serde(rename = "8GB")]
    Gb8,
    #[serde(rename = "16GB")]
    Gb16,
    #[serde(rename = "32GB")]
    Gb32,
}

impl RamSize {
    pub const ALL: [Self; 3] = [Self::Gb8, Self::Gb16, Self::Gb32];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gb8 => "8GB",
            Self::Gb16 => "16GB",
            Self::Gb32 => "32GB",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|option| option.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityUnit {
    Days,
    Hours,
}

impl ValidityUnit {
    pub const ALL: [Self; 2] = [Self::Days, Self::Hours];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|option| option.as_str() == value)
    }
}

pub fn is_supported_core_count(value: i64) -> bool {
    (i64::from(MIN_CORE_COUNT)..=i64::from(MAX_CORE_COUNT)).contains(&value)
}

/// Serializable view of every catalog plus the values a fresh form starts with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogListing {
    pub request_types: Vec<&'static str>,
    pub operating_systems: Vec<&'static str>,
    pub cpu: Vec<u8>,
    pub gpu: Vec<u8>,
    pub ram: Vec<&'static str>,
    pub validity_units: Vec<&'static str>,
    pub defaults: FormDefaults,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormDefaults {
    pub request_type: &'static str,
    pub operating_system: &'static str,
    pub cpu: u8,
    pub gpu: u8,
    pub ram: &'static str,
    pub storage: i64,
    pub validity_period: f64,
    pub validity_unit: &'static str,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            request_type: RequestType::VirtualMachine.as_str(),
            operating_system: OperatingSystem::Ubuntu1804.as_str(),
            cpu: CORE_COUNT_OPTIONS[0],
            gpu: CORE_COUNT_OPTIONS[0],
            ram: RamSize::Gb8.as_str(),
            storage: 100,
            validity_period: 1.0,
            validity_unit: ValidityUnit::Days.as_str(),
        }
    }
}

pub fn listing() -> CatalogListing {
    CatalogListing {
        request_types: RequestType::ALL.iter().map(RequestType::as_str).collect(),
        operating_systems: OperatingSystem::ALL.iter().map(OperatingSystem::as_str).collect(),
        cpu: CORE_COUNT_OPTIONS.to_vec(),
        gpu: CORE_COUNT_OPTIONS.to_vec(),
        ram: RamSize::ALL.iter().map(RamSize::as_str).collect(),
        validity_units: ValidityUnit::ALL.iter().map(ValidityUnit::as_str).collect(),
        defaults: FormDefaults::default(),
    }
}
