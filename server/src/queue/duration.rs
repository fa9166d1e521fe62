//! Recycle-duration parsing and formatting.
//!
//! Recycle strings look like `"10s"`, `"500ms"`, or `"1h10m30s"`: a sequence
//! of decimal-number/unit pairs summed together. No crate in this codebase's
//! dependency stack offers this (no `humantime`), so it is hand-rolled here,
//! mirroring the same small-grammar, no-crate style as the length-prefixed
//! codec in `store::codec`.

use std::time::Duration;

/// Parse a recycle string into a `Duration`. An empty string means "at-most-once"
/// delivery and parses to `Duration::ZERO`.
pub fn parse_recycle(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut chars = input.char_indices().peekable();
    let mut any_term = false;

    while let Some(&(start, c)) = chars.peek() {
        if !c.is_ascii_digit() && c != '.' {
            return Err(format!("invalid recycle duration '{input}': expected a number"));
        }
        let mut end = start;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = idx + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let number: f64 = input[start..end]
            .parse()
            .map_err(|_| format!("invalid recycle duration '{input}': bad number"))?;

        let unit_start = end;
        let mut unit_end = end;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_alphabetic() || c == 'µ' {
                unit_end = idx + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if unit_start == unit_end {
            return Err(format!(
                "invalid recycle duration '{input}': missing unit after number"
            ));
        }
        let unit = &input[unit_start..unit_end];
        let nanos_per_unit: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            other => return Err(format!("invalid recycle duration '{input}': unknown unit '{other}'")),
        };
        total += Duration::from_nanos((number * nanos_per_unit) as u64);
        any_term = true;
    }

    if !any_term {
        return Err(format!("invalid recycle duration '{input}': empty"));
    }
    Ok(total)
}

/// Format a `Duration` back into the canonical recycle string, used when
/// persisting `"<topic>/<line>:recycle"`.
pub fn format_recycle(duration: Duration) -> String {
    if duration.is_zero() {
        return String::new();
    }
    let total_nanos = duration.as_nanos();
    let hours = total_nanos / (3_600 * 1_000_000_000);
    let rem = total_nanos % (3_600 * 1_000_000_000);
    let minutes = rem / (60 * 1_000_000_000);
    let rem = rem % (60 * 1_000_000_000);
    let seconds = rem as f64 / 1_000_000_000.0;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0.0 || out.is_empty() {
        if seconds.fract() == 0.0 {
            out.push_str(&format!("{}s", seconds as u64));
        } else {
            out.push_str(&format!("{seconds}s"));
        }
    }
    out
}
