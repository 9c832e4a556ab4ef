//! Timing-safe comparison for secrets.

use subtle::ConstantTimeEq;

/// Compare two strings without leaking where they first differ.
///
/// Length mismatch returns early; lengths of stored secrets are not secret.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_match() {
        assert!(constant_time_str_eq("abc123", "abc123"));
    }

    #[test]
    fn different_strings_do_not_match() {
        assert!(!constant_time_str_eq("abc123", "abc124"));
        assert!(!constant_time_str_eq("abc", "abc123"));
        assert!(!constant_time_str_eq("", "a"));
    }
}
