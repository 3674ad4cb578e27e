//! Utility functions

mod cursor;

pub use cursor::Cursor;

/// Parse an unsigned decimal field, returning `None` on anything else.
pub fn parse_u64(field: &str) -> Option<u64> {
    field.trim().parse().ok()
}

/// Format a float the way branch lengths are printed: the shortest
/// representation that round-trips, with negative zero printed as `0`.
pub fn format_length(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_lengths_compactly() {
        assert_eq!(format_length(1.0), "1");
        assert_eq!(format_length(0.25), "0.25");
        assert_eq!(format_length(0.0), "0");
        assert_eq!(format_length(-0.0), "0");
    }

    #[test]
    fn parses_unsigned_fields() {
        assert_eq!(parse_u64(" 42 "), Some(42));
        assert_eq!(parse_u64("-1"), None);
    }
}
