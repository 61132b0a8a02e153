//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::session::QuestionInput;

/// Length of a join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Validates that a join code is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("482913") // Ok
/// validate_join_code("48291")  // Err - too short
/// validate_join_code("48a913") // Err - not a digit
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LENGTH} digits (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that the correct option index points at an existing option.
pub fn validate_correct_index(question: &QuestionInput) -> Result<(), ValidationError> {
    if question.correct_index >= question.options.len() {
        let mut err = ValidationError::new("correct_index_range");
        err.message = Some(
            format!(
                "Correct index {} is out of range for {} option(s)",
                question.correct_index,
                question.options.len()
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}
