//! Human-readable sizes and percentages.

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Allocation samples are recorded in megabytes.
pub fn mbytes_to_bytes(mbytes: f64) -> f64 {
    mbytes * MB
}

/// Pretty-print a byte count, keeping roughly three significant digits.
/// Trailing zeros are dropped: `20kb`, `1.5kb`.
pub fn pprint_bytes(bytes: f64) -> String {
    for (unit, suffix) in [(GB, "GB"), (MB, "MB"), (KB, "kb")] {
        if bytes > unit * 100.0 {
            return format!("{}{suffix}", round_to(bytes / unit, 1.0));
        }
        if bytes > unit * 10.0 {
            return format!("{}{suffix}", round_to(bytes / unit, 10.0));
        }
        if bytes > unit {
            return format!("{}{suffix}", round_to(bytes / unit, 100.0));
        }
    }
    format!("{}b", bytes.round())
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

/// Format a fraction (`0.25` → `"25%"`) with two significant digits.
pub fn format_percent(fraction: f64) -> String {
    if fraction > 0.1 {
        format!("{:.0}%", fraction * 100.0)
    } else if fraction > 0.01 {
        format!("{:.1}%", fraction * 100.0)
    } else {
        format!("{:.2}%", fraction * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_tiers() {
        assert_eq!(pprint_bytes(512.0), "512b");
        assert_eq!(pprint_bytes(1536.0), "1.5kb");
        assert_eq!(pprint_bytes(20.0 * KB), "20kb");
        assert_eq!(pprint_bytes(1.234 * KB), "1.23kb");
        assert_eq!(pprint_bytes(300.0 * KB), "300kb");
        assert_eq!(pprint_bytes(mbytes_to_bytes(2.5)), "2.5MB");
        assert_eq!(pprint_bytes(150.0 * MB), "150MB");
        assert_eq!(pprint_bytes(12.34 * GB), "12.3GB");
        assert_eq!(pprint_bytes(250.0 * GB), "250GB");
    }

    #[test]
    fn whole_values_drop_trailing_zeros() {
        assert_eq!(pprint_bytes(2.0 * MB), "2MB");
        assert_eq!(pprint_bytes(15.0 * MB), "15MB");
        assert_eq!(pprint_bytes(20.04 * GB), "20GB");
    }

    #[test]
    fn exact_unit_boundary_stays_in_lower_tier() {
        assert_eq!(pprint_bytes(KB), "1024b");
    }

    #[test]
    fn percent_precision() {
        assert_eq!(format_percent(0.5), "50%");
        assert_eq!(format_percent(0.05), "5.0%");
        assert_eq!(format_percent(0.0123), "1.23%");
        assert_eq!(format_percent(0.0), "0.00%");
    }
}
