//! Clan and player tag helpers.

/// Canonical tag form: uppercase, no spaces, letter `O` read as digit `0`, leading `#`.
pub fn normalize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '#')
        .map(|c| match c.to_ascii_uppercase() {
            'O' => '0',
            other => other,
        })
        .collect();
    format!("#{}", cleaned)
}

/// Validate a tag, returning its normalized form.
pub fn validate_tag(tag: &str) -> Result<String, String> {
    let normalized = normalize_tag(tag);
    let body = &normalized[1..];

    if body.is_empty() {
        return Err("tag cannot be empty".to_string());
    }
    if body.len() < 8 {
        return Err(format!("tag {} is too short (minimum 8 characters)", normalized));
    }
    if body.len() > 10 {
        return Err(format!("tag {} is too long (maximum 10 characters)", normalized));
    }
    if !body.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()) {
        return Err(format!("tag {} contains invalid characters", normalized));
    }

    Ok(normalized)
}
