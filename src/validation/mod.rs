use bigdecimal::BigDecimal;
use std::fmt;

pub const SESSION_ID_MAX_LEN: usize = 255;
pub const INVOICE_TOKEN_MAX_LEN: usize = 255;
pub const CURRENCY_CODE_LEN: usize = 3;
pub const MAX_PAGE_SIZE: i64 = 100;

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

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

fn validate_token_chars(field: &'static str, value: &str) -> ValidationResult {
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(ValidationError::new(
            field,
            "must contain only letters, digits, '_' or '-'",
        ));
    }

    Ok(())
}

/// Provider checkout session ids, e.g. `cs_test_a1B2c3`.
pub fn validate_session_id(session_id: &str) -> ValidationResult {
    validate_required("session_id", session_id)?;
    validate_max_len("session_id", session_id, SESSION_ID_MAX_LEN)?;
    validate_token_chars("session_id", session_id)
}

/// Public invoice tokens: a unique hash or a numeric id.
pub fn validate_invoice_token(token: &str) -> ValidationResult {
    validate_required("token", token)?;
    validate_max_len("token", token, INVOICE_TOKEN_MAX_LEN)?;
    validate_token_chars("token", token)
}

pub fn validate_currency_code(code: &str) -> ValidationResult {
    let code = sanitize_string(code);
    validate_required("currency", &code)?;

    if code.len() != CURRENCY_CODE_LEN || !code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ValidationError::new(
            "currency",
            format!("must be a {}-letter ISO code", CURRENCY_CODE_LEN),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_pagination(limit: i64, offset: i64) -> ValidationResult {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ValidationError::new(
            "limit",
            format!("must be between 1 and {}", MAX_PAGE_SIZE),
        ));
    }
    if offset < 0 {
        return Err(ValidationError::new("offset", "must not be negative"));
    }

    Ok(())
}
