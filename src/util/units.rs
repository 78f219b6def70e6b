//! Units formatting and conversion utilities
//!
//! Provides parsing of human-readable size strings and formatting of sizes,
//! durations and throughput.

use std::time::Duration;

use byte_unit::Byte;

use crate::{KvBenchError, Result};

/// Format bytes into human-readable size with appropriate units
///
/// # Examples
/// ```
/// use kvwritebench::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// assert_eq!(format_bytes(100), "100 B");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Parse a size such as `500mb`, `100b` or `2 KiB` into bytes
///
/// Decimal-looking suffixes (`kb`, `mb`, `gb`, `tb`) are taken as binary
/// multiples, so `1kb` is 1024 bytes.
///
/// # Examples
/// ```
/// use kvwritebench::util::units::parse_size;
///
/// assert_eq!(parse_size("100b").unwrap(), 100);
/// assert_eq!(parse_size("500mb").unwrap(), 500 * 1024 * 1024);
/// assert_eq!(parse_size("2 KiB").unwrap(), 2048);
/// ```
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(KvBenchError::ConfigError("empty size".to_string()));
    }

    let normalized = binary_suffix(trimmed);
    let byte = Byte::parse_str(&normalized, true)
        .map_err(|e| KvBenchError::ConfigError(format!("invalid size {:?}: {}", input, e)))?;
    Ok(byte.as_u64())
}

/// Rewrite `kb`/`mb`/`gb`/`tb` (any case) to their `KiB`-style spelling.
fn binary_suffix(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    for (suffix, binary) in [("kb", "KiB"), ("mb", "MiB"), ("gb", "GiB"), ("tb", "TiB")] {
        if let Some(number) = lower.strip_suffix(suffix) {
            return format!("{}{}", number.trim_end(), binary);
        }
    }
    input.to_string()
}

/// Format duration into human-readable string with millisecond precision
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use kvwritebench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_micros(1_500_250)), "1s 500ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let millis = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(millis).to_string()
}

/// Calculate throughput in MiB/s from bytes and duration
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use kvwritebench::util::units::calculate_throughput_mbps;
///
/// let throughput = calculate_throughput_mbps(1048576, Duration::from_secs(1));
/// assert!((throughput - 1.0).abs() < 0.01);
/// ```
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    let duration_secs = duration.as_secs_f64();
    let megabytes = bytes as f64 / 1_048_576.0;
    megabytes / duration_secs
}

/// Format throughput value with appropriate units
///
/// # Examples
/// ```
/// use kvwritebench::util::units::format_throughput;
///
/// assert_eq!(format_throughput(1024.0), "1.0 GiB/s");
/// assert_eq!(format_throughput(1.5), "1.5 MiB/s");
/// ```
pub fn format_throughput(mbps: f64) -> String {
    if mbps >= 1024.0 {
        format!("{:.1} GiB/s", mbps / 1024.0)
    } else if mbps >= 1.0 {
        format!("{:.1} MiB/s", mbps)
    } else if mbps >= 0.001 {
        format!("{:.1} KiB/s", mbps * 1024.0)
    } else {
        format!("{:.3} MiB/s", mbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_parse_size_reference_flags() {
        assert_eq!(parse_size("500mb").unwrap(), 500 * 1024 * 1024);
        assert_eq!(parse_size("100b").unwrap(), 100);
        assert_eq!(parse_size("32b").unwrap(), 32);
        assert_eq!(parse_size("100kb").unwrap(), 100 * 1024);
        assert_eq!(parse_size("5MB").unwrap(), 5 * 1024 * 1024);
        assert_eq!(parse_size("1gb").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_other_forms() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size(" 2 KiB ").unwrap(), 2048);
        assert_eq!(parse_size("3 kb").unwrap(), 3072);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(matches!(parse_size(""), Err(KvBenchError::ConfigError(_))));
        assert!(matches!(parse_size("lots"), Err(KvBenchError::ConfigError(_))));
        assert!(parse_size("12 parsecs").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_nanos(999)), "0s");
    }

    #[test]
    fn test_throughput() {
        assert_eq!(calculate_throughput_mbps(1024, Duration::ZERO), 0.0);
        let mbps = calculate_throughput_mbps(10 * 1_048_576, Duration::from_secs(2));
        assert!((mbps - 5.0).abs() < 1e-9);
        assert_eq!(format_throughput(0.5), "512.0 KiB/s");
    }
}
