/// Formatting helpers for the dashboard

use std::time::Duration;

/// Human-readable size in binary units: `512 B`, `1.50 KB`, `3.00 GB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    // Each unit is 2^10 of the previous one
    let exponent = ((63 - bytes.max(1).leading_zeros()) / 10).min(UNITS.len() as u32);
    match exponent {
        0 => format!("{} B", bytes),
        e => format!("{:.2} {}", bytes as f64 / (1u64 << (10 * e)) as f64, UNITS[e as usize - 1]),
    }
}

/// Format a sampling interval: `500ms`, `2s`, `1.5s`
pub fn format_interval(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", interval.as_secs_f64())
    }
}

/// Truncate string with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 << 40), "5.00 TB");
        assert_eq!(format_bytes(2048 << 40), "2048.00 TB");
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::from_millis(500)), "500ms");
        assert_eq!(format_interval(Duration::from_secs(2)), "2s");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("nginx", 10), "nginx");
        assert_eq!(truncate_string("postgres-writer", 10), "postgre...");
        assert_eq!(truncate_string("größenwahn", 6), "grö...");
    }
}
