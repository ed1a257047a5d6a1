//! Reusable validators for typed resource configs

use super::diag::Diagnostics;

/// Implemented by every typed resource config; runs after deserialization
/// succeeded and before any API call.
pub trait Validate {
    fn validate(&self, diags: &mut Diagnostics);
}

/// Check an ARN has the `arn:partition:service:region:account:resource` shape
pub fn is_arn(value: &str) -> bool {
    let parts: Vec<&str> = value.splitn(6, ':').collect();
    parts.len() == 6
        && parts[0] == "arn"
        && !parts[1].is_empty()
        && !parts[2].is_empty()
        && !parts[5].is_empty()
}

pub fn arn(diags: &mut Diagnostics, attribute: &str, value: &str) {
    if !is_arn(value) {
        diags.error(attribute, format!("{value:?} is not a valid ARN"));
    }
}

pub fn length(diags: &mut Diagnostics, attribute: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min || len > max {
        diags.error(
            attribute,
            format!("expected length between {min} and {max}, got {len}"),
        );
    }
}

/// Letters, digits, `-`, `_` and `.`; must start with a letter or digit
pub fn name_chars(diags: &mut Diagnostics, attribute: &str, value: &str) {
    let valid = value
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false)
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        diags.error(
            attribute,
            format!("{value:?} must start with a letter or digit and contain only letters, digits, '-', '_' or '.'"),
        );
    }
}

pub fn one_of(diags: &mut Diagnostics, attribute: &str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value) {
        diags.error(
            attribute,
            format!("expected one of [{}], got {value:?}", allowed.join(", ")),
        );
    }
}

pub fn items(diags: &mut Diagnostics, attribute: &str, count: usize, min: usize, max: usize) {
    if count < min || count > max {
        diags.error(
            attribute,
            format!("expected between {min} and {max} blocks, got {count}"),
        );
    }
}

pub fn port(diags: &mut Diagnostics, attribute: &str, value: u32) {
    if value == 0 || value > 65535 {
        diags.error(attribute, format!("{value} is not a valid port"));
    }
}

/// `a.b.c.d/n` with octets and prefix in range
pub fn cidr(diags: &mut Diagnostics, attribute: &str, value: &str) {
    let valid = value
        .split_once('/')
        .map(|(ip, prefix)| {
            ip.parse::<std::net::Ipv4Addr>().is_ok()
                && prefix.parse::<u8>().map(|p| p <= 32).unwrap_or(false)
        })
        .unwrap_or(false);
    if !valid {
        diags.error(attribute, format!("{value:?} is not a valid IPv4 CIDR block"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arn() {
        assert!(is_arn("arn:aws:iam::123456789012:role/test"));
        assert!(is_arn("arn:aws:sns:us-east-1:123456789012:topic"));
        assert!(!is_arn("arn:aws:sns"));
        assert!(!is_arn("role/test"));
        assert!(!is_arn("arn:aws:iam::123456789012:"));
    }

    #[test]
    fn test_name_chars() {
        let mut diags = Diagnostics::new();
        name_chars(&mut diags, "name", "tf-acc-test_1.x");
        assert!(diags.is_empty());
        name_chars(&mut diags, "name", "-leading");
        name_chars(&mut diags, "name", "has space");
        assert_eq!(diags.iter().count(), 2);
    }

    #[test]
    fn test_cidr() {
        let mut diags = Diagnostics::new();
        cidr(&mut diags, "c", "10.0.0.0/16");
        assert!(diags.is_empty());
        cidr(&mut diags, "c", "10.0.0.0/33");
        cidr(&mut diags, "c", "10.0.0/16");
        assert_eq!(diags.iter().count(), 2);
    }

    #[test]
    fn test_length_counts_chars() {
        let mut diags = Diagnostics::new();
        length(&mut diags, "d", "ééé", 1, 3);
        assert!(diags.is_empty());
        length(&mut diags, "d", "", 1, 3);
        assert!(diags.has_errors());
    }
}
