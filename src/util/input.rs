//! Operator input parsing.

use crate::core::AdmissionError;

/// Parse a typed group size, enforcing `1..=max_group_size`.
///
/// ```
/// use tunnel_admission::util::parse_group_size;
///
/// assert_eq!(parse_group_size(" 12 ", 50).unwrap(), 12);
/// assert!(parse_group_size("0", 50).is_err());
/// assert!(parse_group_size("51", 50).is_err());
/// ```
///
/// # Errors
///
/// `AdmissionError::InvalidArgument` carrying the message to show the
/// operator.
pub fn parse_group_size(raw: &str, max_group_size: u32) -> Result<u32, AdmissionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("Visitor count input is required."));
    }
    let count: i64 = trimmed
        .parse()
        .map_err(|_| invalid("Invalid entry: Please use only numbers for visitor count."))?;
    if count <= 0 {
        return Err(invalid("The number of visitors must be positive."));
    }
    match u32::try_from(count) {
        Ok(group) if group <= max_group_size => Ok(group),
        _ => Err(AdmissionError::InvalidArgument(format!(
            "A maximum of {max_group_size} visitors is allowed per group."
        ))),
    }
}

fn invalid(msg: &str) -> AdmissionError {
    AdmissionError::InvalidArgument(msg.to_owned())
}
