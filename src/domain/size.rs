//! Size unit handling.
//!
//! All sizes are carried internally as integer megabytes. User-facing
//! literals like "3.5GB" or "550 MB" are normalized with [`to_mb`]; display
//! strings are produced by [`format_short`] and [`format_long`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{Error, Result};

/// Minimum headroom a virtual pool must leave above the measured cluster size
pub const MIN_HEADROOM_MB: i64 = 512;

static SIZE_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?) ?([KMGT])B?$").expect("valid size regex"));

fn unit_multiplier(unit: char) -> f64 {
    match unit {
        'K' => 1.0 / 1024.0,
        'M' => 1.0,
        'G' => 1024.0,
        'T' => 1024.0 * 1024.0,
        _ => unreachable!("regex only matches KMGT"),
    }
}

/// Parse a size literal into whole megabytes, rounding up.
///
/// Accepted forms: "550MB", "3.5GB", "1 TB", "2g". Fractions always round
/// toward more space so a requested size is never silently undercut.
pub fn to_mb(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    let captures = SIZE_LITERAL.captures(trimmed).ok_or_else(|| {
        Error::validation(format!(
            "Invalid size literal '{}': expected a number followed by KB/MB/GB/TB",
            input
        ))
    })?;

    let value: f64 = captures[1]
        .parse()
        .map_err(|_| Error::validation(format!("Invalid size value in '{}'", input)))?;
    let unit = captures[2].chars().next().expect("regex guarantees a unit").to_ascii_uppercase();

    Ok((value * unit_multiplier(unit)).ceil() as i64)
}

fn scaled(mb: i64) -> (f64, &'static str, &'static str) {
    const TB: i64 = 1024 * 1024;
    const GB: i64 = 1024;

    if mb >= TB {
        (mb as f64 / TB as f64, "TB", "Terabytes")
    } else if mb >= GB {
        (mb as f64 / GB as f64, "GB", "Gigabytes")
    } else {
        (mb as f64, "MB", "Megabytes")
    }
}

/// Compact display form, e.g. `1536 -> "1.50GB"`, `550 -> "550MB"`
pub fn format_short(mb: i64) -> String {
    let (value, unit, _) = scaled(mb);
    if unit == "MB" {
        format!("{}{}", mb, unit)
    } else {
        format!("{:.2}{}", value, unit)
    }
}

/// Long display form, e.g. `1536 -> "1.50 Gigabytes"`, `550 -> "550 Megabytes"`
pub fn format_long(mb: i64) -> String {
    let (value, _, name) = scaled(mb);
    if name == "Megabytes" {
        format!("{} {}", mb, name)
    } else {
        format!("{:.2} {}", value, name)
    }
}
