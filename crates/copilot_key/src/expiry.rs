use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EXP_PATTERN: Regex = Regex::new(r"exp=(\d+)").expect("valid expiry pattern");
}

/// Extracts the Unix expiry timestamp the provider embeds in a Copilot token
/// (`...;exp=1712345678;...`). Returns `None` when the marker is missing or
/// the number does not fit in an `i64`.
pub fn parse_expiry(value: &str) -> Option<i64> {
    EXP_PATTERN
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embedded_expiry() {
        let token = "tid=abc;exp=1712345678;sku=free;8kp=1:deadbeef";
        assert_eq!(parse_expiry(token), Some(1712345678));
    }

    #[test]
    fn first_marker_wins() {
        assert_eq!(parse_expiry("abc.exp=9999999999.xyz.exp=1"), Some(9999999999));
    }

    #[test]
    fn missing_or_invalid_marker() {
        assert_eq!(parse_expiry("no expiry here"), None);
        assert_eq!(parse_expiry("exp=;"), None);
        assert_eq!(parse_expiry("exp=99999999999999999999999"), None);
    }
}
