//! Human-readable byte counts for dry-run cost estimates

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte count with binary (1024) thresholds
///
/// Below 1024 the integer count is printed as is (`"1023B"`); larger values
/// get exactly one decimal place (`"1.5KB"`, `"1.0GB"`).
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1}{}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_one_kilobyte() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1), "1B");
        assert_eq!(format_bytes(1023), "1023B");
    }

    #[test]
    fn one_decimal_above_threshold() {
        assert_eq!(format_bytes(1024), "1.0KB");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0GB");
        assert_eq!(format_bytes(5 * 1024u64.pow(4)), "5.0TB");
    }

    #[test]
    fn petabytes_is_the_largest_unit() {
        assert_eq!(format_bytes(1024u64.pow(5)), "1.0PB");
        assert_eq!(format_bytes(2048 * 1024u64.pow(5)), "2048.0PB");
    }
}
