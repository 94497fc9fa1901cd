use thiserror::Error;

use crate::catalog::{is_supported_core_count, OperatingSystem, RamSize, RequestType, ValidityUnit};
use crate::domain::request::{RequestDraft, ValidatedDraft, Validity};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("validity period must be a finite number greater than zero, got {value}")]
    InvalidValidityPeriod { value: f64 },
    #[error("unsupported {field} `{value}` (expected one of: {allowed})")]
    InvalidEnumValue { field: &'static str, value: String, allowed: String },
    #[error("{field} {reason}, got {value}")]
    InvalidNumericField { field: &'static str, value: i64, reason: &'static str },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidValidityPeriod { .. } => "validity_period",
            Self::InvalidEnumValue { field, .. } | Self::InvalidNumericField { field, .. } => {
                field
            }
        }
    }
}

/// Checks a draft field by field and returns the typed request on success.
///
/// The first failing check wins; the validity period is always checked first.
pub fn validate(draft: &RequestDraft) -> Result<ValidatedDraft, ValidationError> {
    let period = draft.validity_period;
    if !period.is_finite() || period <= 0.0 {
        return Err(ValidationError::InvalidValidityPeriod { value: period });
    }

    let request_type = parse_enum(
        "request_type",
        &draft.request_type,
        RequestType::parse,
        RequestType::ALL.iter().map(RequestType::as_str),
    )?;
    let operating_system = parse_enum(
        "operating_system",
        &draft.operating_system,
        OperatingSystem::parse,
        OperatingSystem::ALL.iter().map(OperatingSystem::as_str),
    )?;
    let ram =
        parse_enum("ram", &draft.ram, RamSize::parse, RamSize::ALL.iter().map(RamSize::as_str))?;

    let cpu = core_count("cpu", draft.cpu)?;
    let gpu = core_count("gpu", draft.gpu)?;

    if draft.storage <= 0 {
        return Err(ValidationError::InvalidNumericField {
            field: "storage",
            value: draft.storage,
            reason: "must be a positive number of gigabytes",
        });
    }
    let storage_gb = u32::try_from(draft.storage).map_err(|_| {
        ValidationError::InvalidNumericField {
            field: "storage",
            value: draft.storage,
            reason: "exceeds the supported storage range",
        }
    })?;

    let unit = parse_enum(
        "validity_unit",
        &draft.validity_unit,
        ValidityUnit::parse,
        ValidityUnit::ALL.iter().map(ValidityUnit::as_str),
    )?;

    Ok(ValidatedDraft {
        request_type,
        operating_system,
        cpu,
        gpu,
        ram,
        storage_gb,
        validity: Validity { period, unit },
    })
}

fn parse_enum<T>(
    field: &'static str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    allowed: impl Iterator<Item = &'static str>,
) -> Result<T, ValidationError> {
    parse(value).ok_or_else(|| ValidationError::InvalidEnumValue {
        field,
        value: value.to_string(),
        allowed: allowed.collect::<Vec<_>>().join(", "),
    })
}

fn core_count(field: &'static str, value: i64) -> Result<u8, ValidationError> {
    if !is_supported_core_count(value) {
        return Err(ValidationError::InvalidNumericField {
            field,
            value,
            reason: "must be between 1 and 10",
        });
    }

    u8::try_from(value).map_err(|_| ValidationError::InvalidNumericField {
        field,
        value,
        reason: "must be between 1 and 10",
    })
}
