use crate::error::{Result, TimegateError};

/// Clean an incoming original-resource identifier before routing.
///
/// Empty strings and a bare `/` pass through unchanged. A fragment is dropped
/// since it never reaches an origin server. Control characters are rejected:
/// the identifier ends up in `Location` and `Link` headers.
pub fn validate_uri(raw: &str) -> Result<String> {
    if let Some(bad) = raw.chars().find(|c| c.is_control()) {
        return Err(TimegateError::Validation(format!(
            "identifier contains control character {:?}",
            bad
        )));
    }
    let without_fragment = match raw.split_once('#') {
        Some((head, _fragment)) => head,
        None => raw,
    };
    Ok(without_fragment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_values() {
        assert_eq!(validate_uri("").unwrap(), "");
        assert_eq!(validate_uri("/").unwrap(), "/");
        assert_eq!(
            validate_uri("http://example.com/a?b=c").unwrap(),
            "http://example.com/a?b=c"
        );
    }

    #[test]
    fn test_fragment_is_stripped() {
        assert_eq!(validate_uri("#").unwrap(), "");
        assert_eq!(
            validate_uri("http://example.com/page#section").unwrap(),
            "http://example.com/page"
        );
    }

    #[test]
    fn test_control_characters_are_rejected() {
        assert!(matches!(
            validate_uri("http://example.com/\r\nSet-Cookie: x"),
            Err(TimegateError::Validation(_))
        ));
        assert!(validate_uri("a\0b").is_err());
    }
}
