//! Key, duration and address helpers

use crate::common::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::Duration;

/// Percent-encoding set for keys placed in a URL path segment
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a key as one URL path segment
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Parse a duration such as `250ms`, `2s`, `5m` or `1h`. A bare number is milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let n: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid duration: {:?}", s)))?;

    match unit {
        "" | "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3_600)),
        other => Err(Error::InvalidConfig(format!(
            "unknown duration unit {:?} in {:?}",
            other, s
        ))),
    }
}

/// Turn a node id (`host:port`, `:port` or a full URL) into a base URL.
pub fn node_base_url(node: &str) -> String {
    let node = node.trim().trim_end_matches('/');
    if node.starts_with("http://") || node.starts_with("https://") {
        node.to_string()
    } else if node.starts_with(':') {
        format!("http://127.0.0.1{}", node)
    } else {
        format!("http://{}", node)
    }
}

/// Longest key accepted, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Keys must be non-empty, at most [`MAX_KEY_LEN`] bytes and free of control characters.
pub fn validate_key(key: &str) -> Result<()> {
    let problem = if key.is_empty() {
        "key is required".to_string()
    } else if key.len() > MAX_KEY_LEN {
        format!("key is {} bytes, limit is {}", key.len(), MAX_KEY_LEN)
    } else if key.chars().any(char::is_control) {
        "key contains control characters".to_string()
    } else {
        return Ok(());
    };
    Err(Error::Validation(problem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key_is_single_segment() {
        assert_eq!(encode_key("user:42"), "user:42");
        assert_eq!(encode_key("a/b c?d#e&f%"), "a%2Fb%20c%3Fd%23e%26f%25");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("750").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration(" 30s ").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_node_base_url() {
        assert_eq!(node_base_url(":6001"), "http://127.0.0.1:6001");
        assert_eq!(node_base_url("10.0.0.2:6001"), "http://10.0.0.2:6001");
        assert_eq!(node_base_url("http://node-a:6001/"), "http://node-a:6001");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("normal-key").is_ok());
        assert!(validate_key("path/to/key").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("bad\0key").is_err());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}
