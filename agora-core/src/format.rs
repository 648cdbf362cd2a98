//! Short display form for like and vote counts.
//!
//! ```text
//! < 0.1      "0"
//! < 1        one decimal     "0.6"
//! < 1 000    whole number    "42"
//! < 10^6     thousands       "12K"
//! < 10^9     millions        "4M"
//! otherwise  "!!!"
//! ```

/// Compact rendering of a (possibly weighted) count.
pub fn count_format(n: f64) -> String {
    if n < 0.1 {
        "0".to_string()
    } else if n < 1.0 {
        format!("{n:.1}")
    } else if n < 1_000.0 {
        format!("{n:.0}")
    } else if n < 1_000_000.0 {
        format!("{:.0}K", n / 1_000.0)
    } else if n < 1_000_000_000.0 {
        format!("{:.0}M", n / 1_000_000.0)
    } else {
        "!!!".to_string()
    }
}
