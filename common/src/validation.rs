// Input validation shared by customers, lead forms and accounts

use crate::errors::ValidationError;
use regex::Regex;

lazy_static::lazy_static! {
    static ref E164_RE: Regex = Regex::new(r"^\+\d{8,15}$").expect("valid E.164 regex");
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex");
    static ref NON_DIGIT_RE: Regex = Regex::new(r"\D").expect("valid digit regex");
}

/// `+` followed by 8 to 15 digits
pub fn is_e164(phone: &str) -> bool {
    E164_RE.is_match(phone)
}

pub fn is_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn require_e164(field: &str, phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if !is_e164(phone) {
        return Err(ValidationError::invalid(
            field,
            "must be in E.164 format, e.g. +919876543210",
        ));
    }
    Ok(())
}

pub fn require_email(field: &str, email: &str) -> Result<(), ValidationError> {
    if !is_email(email) {
        return Err(ValidationError::invalid(field, "is not a valid email address"));
    }
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

/// Special characters a password may (and must) draw from
pub const PASSWORD_SPECIALS: &str = "@$!%*?&";

/// At least 8 characters from letters, digits and `PASSWORD_SPECIALS`,
/// with one of each: lowercase, uppercase, digit, special.
pub fn check_password_strength(field: &str, password: &str) -> Result<(), ValidationError> {
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    let strong = password.chars().count() >= 8
        && allowed
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if !strong {
        return Err(ValidationError::invalid(
            field,
            "must be at least 8 characters and contain uppercase, lowercase, number, and special character",
        ));
    }
    Ok(())
}

/// Strip everything but digits from a phone-like input
pub fn digits_only(input: &str) -> String {
    NON_DIGIT_RE.replace_all(input, "").into_owned()
}

/// Normalize a locally typed phone number to E.164.
///
/// Ten digits are treated as an Indian mobile number; twelve digits starting
/// with `91` already carry the country code. Anything else is kept as typed
/// and must already be E.164.
pub fn normalize_phone(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let digits = digits_only(trimmed);
    let candidate = if digits.len() == 10 {
        format!("+91{}", digits)
    } else if digits.len() == 12 && digits.starts_with("91") {
        format!("+{}", digits)
    } else if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else {
        trimmed.to_string()
    };

    is_e164(&candidate).then_some(candidate)
}

/// Trim and drop empty tags, keeping first occurrence order
pub fn clean_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_e164_accepts_valid_numbers() {
        assert!(is_e164("+919876543210"));
        assert!(is_e164("+12025550123"));
        assert!(!is_e164("919876543210"));
        assert!(!is_e164("+91 98765 43210"));
        assert!(!is_e164("+1234567"));
    }

    #[test]
    fn test_normalize_phone_indian_numbers() {
        assert_eq!(normalize_phone("9876543210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("98765 43210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("919876543210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("+1 202 555 0123").as_deref(), Some("+12025550123"));
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("   "), None);
    }

    #[test]
    fn test_password_strength() {
        assert!(check_password_strength("p", "Secret@12").is_ok());
        assert!(check_password_strength("p", "secret@12").is_err());
        assert!(check_password_strength("p", "SECRET@12").is_err());
        assert!(check_password_strength("p", "Secret@ab").is_err());
        assert!(check_password_strength("p", "Secret123").is_err());
        assert!(check_password_strength("p", "Se@1").is_err());
        // '#' is outside the allowed set
        assert!(check_password_strength("p", "Secret@12#").is_err());
    }

    #[test]
    fn test_require_email() {
        assert!(require_email("email", "a@b.io").is_ok());
        assert!(require_email("email", "not-an-email").is_err());
    }

    #[test]
    fn test_clean_tags_dedupes_and_trims() {
        let tags = clean_tags(vec![" vip ", "", "vip", "lead"]);
        assert_eq!(tags, vec!["vip".to_string(), "lead".to_string()]);
    }
}
