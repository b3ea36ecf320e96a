//! Utility functions for hash files and size formatting

use std::sync::OnceLock;

use regex::Regex;

const MIB: u64 = 1024 * 1024;

fn md5_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern
        Regex::new(r"^[a-fA-F0-9]{32}$").unwrap()
    })
}

/// Whether `value` is a 32-character hex md5 digest (either case)
pub fn is_valid_md5(value: &str) -> bool {
    md5_pattern().is_match(value)
}

/// Extract the digest from an md5sum-style hash file
///
/// The digest is the first whitespace-delimited token. Returns the token
/// lowercased when valid, or the rejected token as the error value.
///
/// ```
/// use planet_mirrors::utils::parse_hash_file;
///
/// let body = "E3B0C44298FC1C149AFBF4C8996FB924  planet-240102.osm.pbf\n";
/// assert_eq!(
///     parse_hash_file(body),
///     Ok("e3b0c44298fc1c149afbf4c8996fb924".to_string())
/// );
/// ```
pub fn parse_hash_file(contents: &str) -> std::result::Result<String, String> {
    let token = contents.split_whitespace().next().unwrap_or_default();
    if is_valid_md5(token) {
        Ok(token.to_ascii_lowercase())
    } else {
        Err(token.to_string())
    }
}

/// Group digits in threes with commas: `1234567` -> `"1,234,567"`
pub fn comma_separated(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Human-readable byte length: `"<MiB> MB (<bytes>)"`, or `"Unknown"` for 0
pub fn format_size(length: u64) -> String {
    if length == 0 {
        return "Unknown".to_string();
    }
    format!("{} MB ({})", length / MIB, comma_separated(length))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_validation_accepts_both_cases() {
        assert!(is_valid_md5("0123456789abcdef0123456789ABCDEF"));
        assert!(!is_valid_md5("0123456789abcdef0123456789abcde"));
        assert!(!is_valid_md5("0123456789abcdef0123456789abcdeg"));
        assert!(!is_valid_md5(""));
    }

    #[test]
    fn hash_file_takes_first_token() {
        assert_eq!(
            parse_hash_file("  0123456789abcdef0123456789abcdef\tplanet.osm.pbf"),
            Ok("0123456789abcdef0123456789abcdef".to_string())
        );
    }

    #[test]
    fn hash_file_rejects_html_error_pages() {
        assert_eq!(
            parse_hash_file("<html><body>404</body></html>"),
            Err("<html><body>404</body></html>".to_string())
        );
        assert_eq!(parse_hash_file(""), Err(String::new()));
    }

    #[test]
    fn comma_grouping() {
        assert_eq!(comma_separated(0), "0");
        assert_eq!(comma_separated(999), "999");
        assert_eq!(comma_separated(1000), "1,000");
        assert_eq!(comma_separated(75_123_456_789), "75,123,456,789");
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "Unknown");
        assert_eq!(format_size(3 * MIB + 5), "3 MB (3,145,733)");
    }
}
