use bigdecimal::BigDecimal;
use std::fmt;

pub const ASSET_CODE_MAX_LEN: usize = 12;
pub const EXTERNAL_REFERENCE_MAX_LEN: usize = 255;
pub const OWNER_ID_MAX_LEN: usize = 255;
/// Decimal places accepted on money amounts.
pub const AMOUNT_MAX_SCALE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Strips control characters and collapses whitespace runs in free-text
/// references supplied by callers.
pub fn sanitize_string(value: &str) -> String {
    let cleaned: String = value.chars().filter(|ch| !ch.is_control() || ch.is_whitespace()).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    match value.trim() {
        "" => Err(ValidationError::new(field, "is required")),
        _ => Ok(()),
    }
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    let len = value.chars().count();
    if len > max_len {
        return Err(ValidationError::new(
            field,
            format!("is {} characters, limit is {}", len, max_len),
        ));
    }
    Ok(())
}

/// Format check only; membership is the allow-list's job.
pub fn validate_asset_code(field: &'static str, asset_code: &str) -> ValidationResult {
    validate_required(field, asset_code)?;
    validate_max_len(field, asset_code, ASSET_CODE_MAX_LEN)?;

    if !asset_code
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            field,
            "must contain only uppercase letters and digits",
        ));
    }

    Ok(())
}

pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount.with_scale(AMOUNT_MAX_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

pub fn validate_owner_id(owner_id: &str) -> ValidationResult {
    validate_required("owner_id", owner_id)?;
    validate_max_len("owner_id", owner_id, OWNER_ID_MAX_LEN)
}
