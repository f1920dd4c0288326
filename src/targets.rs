use crate::error::TargetError;
use crate::types::Phone;

/// Parse a single number or comma-separated list into validated targets.
///
/// Formatting characters (spaces, dashes, parentheses, a leading `+`) are
/// stripped; what remains must be 10-15 digits. Duplicates are removed,
/// keeping first-seen order, so a campaign never sends twice to the same
/// number.
pub fn parse_targets(input: &str) -> Result<Vec<Phone>, TargetError> {
    let mut targets = Vec::new();

    for raw in input.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let phone = parse_phone(raw)?;
        if !targets.contains(&phone) {
            targets.push(phone);
        }
    }

    if targets.is_empty() {
        return Err(TargetError::Empty);
    }

    Ok(targets)
}

/// Normalize and validate one phone number.
pub fn parse_phone(raw: &str) -> Result<Phone, TargetError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();

    if cleaned.len() < 10
        || cleaned.len() > 15
        || !cleaned.chars().all(|c| c.is_ascii_digit())
    {
        return Err(TargetError::InvalidNumber(raw.to_string()));
    }

    Ok(Phone(cleaned))
}
