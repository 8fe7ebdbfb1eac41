//! Raw AT response cleanup and payload extraction.
//!
//! Firmware echoes command text and protocol status tokens (`OK`)
//! interleaved with payload lines. The formatter isolates the payload
//! before pattern matching so verification regexes only ever see the
//! response body.

use log::debug;
use regex::Regex;

/// Strip noise from a raw serial response and extract a regex capture group.
///
/// Splits `raw` on newlines, drops blank lines and lines equal to exactly
/// `OK`, joins the survivors without separators, trims, then applies
/// `pattern` and returns capture group 1. Returns `None` when the pattern
/// does not match, has no capture group, or is invalid.
///
/// Applying the formatter twice is safe: it only removes `OK`/blank lines
/// and matches once, so re-formatting an extracted value either matches
/// again identically or returns the same value.
#[must_use]
pub fn format_response(raw: &str, pattern: &str) -> Option<String> {
    let cleaned: String = raw
        .lines()
        .filter(|line| {
            let line = line.trim();
            !line.is_empty() && line != "OK"
        })
        .collect();
    let cleaned = cleaned.trim();

    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            debug!("Invalid response pattern {pattern:?}: {e}");
            return None;
        },
    };

    regex
        .captures(cleaned)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_payload_between_echo_and_ok() {
        let raw = "Nordic Semiconductor ASA\r\nOK\r\n";
        assert_eq!(
            format_response(raw, "(.*)").as_deref(),
            Some("Nordic Semiconductor ASA")
        );
    }

    #[test]
    fn test_drops_blank_lines_and_ok_token() {
        let raw = "\r\n\r\n+CGSN: 352656100367872\r\n\r\nOK\r\n";
        assert_eq!(
            format_response(raw, r"\+CGSN: (\d+)").as_deref(),
            Some("352656100367872")
        );
    }

    #[test]
    fn test_keeps_lines_containing_ok_as_substring() {
        // Only lines equal to exactly "OK" are protocol tokens.
        let raw = "TOKYO\nOK\n";
        assert_eq!(format_response(raw, "(.*)").as_deref(), Some("TOKYO"));
    }

    #[test]
    fn test_no_match_returns_none() {
        assert_eq!(format_response("ERROR", r"\+CGMR: (.*)"), None);
    }

    #[test]
    fn test_no_capture_group_returns_none() {
        assert_eq!(format_response("mfw_nrf9160_1.3.2\nOK", r"mfw.*"), None);
    }

    #[test]
    fn test_invalid_pattern_returns_none() {
        assert_eq!(format_response("anything", "("), None);
    }

    #[test]
    fn test_idempotent_once_extracted() {
        let raw = "mfw_nrf9160_1.3.2\r\nOK\r\n";
        let pattern = "(mfw_[0-9a-z_.]+)";
        let once = format_response(raw, pattern).unwrap();
        let twice = format_response(&once, pattern).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multi_line_payload_joined_without_separator() {
        let raw = "%XICCID: 89450421\n180216216966\nOK";
        assert_eq!(
            format_response(raw, "%XICCID: (.*)").as_deref(),
            Some("89450421180216216966")
        );
    }
}
