//! Human-readable byte sizes, for logs and CLI arguments.

/// Format a byte count with a binary unit suffix, e.g. `1.5 MiB`.
pub fn human_size(bytes: u64) -> String {
    let (value, suffix) = unbytify::bytify(bytes);
    format!("{value:.1} {suffix}")
}

/// Parse a human-readable size such as `"4k"` or `"1.5M"` into bytes.
/// Used as a clap value parser for the size bound flags.
pub fn parse_size(s: &str) -> Result<u64, String> {
    unbytify::unbytify(s).map_err(|_| format!("{s:?} is not a byte size"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_sizes() {
        assert_eq!(parse_size("1"), Ok(1));
        assert_eq!(parse_size("4K"), Ok(4 * 1024));
        assert_eq!(parse_size("2M"), Ok(2 * 1024 * 1024));
        assert!(parse_size("four").is_err());
    }

    #[test]
    fn formats_with_suffix() {
        assert_eq!(human_size(0), "0.0 B");
        assert_eq!(human_size(1536), "1.5 KiB");
    }
}
