//! Human-readable formatting helpers

const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

/// Format a byte count with binary units, right-aligned.
///
/// Below 1 KiB the count is printed as whole bytes (`"  42 bytes"`),
/// otherwise with one decimal and the largest fitting unit up to GiB.
pub fn human_size(size: u64) -> String {
    if size < 1024 {
        return format!("{:4} bytes", size);
    }

    let mut scaled = size as f64;
    for unit in UNITS {
        scaled /= 1024.0;
        if scaled < 1024.0 {
            return format!("{:6.1} {}", scaled, unit);
        }
    }
    format!("{:6.1} {}", scaled, UNITS[UNITS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "   0 bytes")]
    #[case(1023, "1023 bytes")]
    #[case(1024, "   1.0 KiB")]
    #[case(1536, "   1.5 KiB")]
    #[case(5 * 1024 * 1024, "   5.0 MiB")]
    #[case(3 * 1024 * 1024 * 1024, "   3.0 GiB")]
    #[case(2048 * 1024 * 1024 * 1024, "2048.0 GiB")]
    fn given_byte_count_when_human_size_then_uses_largest_unit(
        #[case] size: u64,
        #[case] expected: &str,
    ) {
        assert_eq!(human_size(size), expected);
    }
}
