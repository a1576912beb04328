//! Sortable 26-digit log identifiers.
//!
//! Format: `YYYYMMDDHHMISS` + 6-digit microseconds + 6-digit random
//! decimal suffix. Lexicographic order matches creation order, and the
//! random suffix makes collisions within one microsecond practically
//! impossible.

use chrono::Utc;
use rand::Rng;

/// Length of every generated log identifier.
pub const LOG_ID_LEN: usize = 26;

/// Generate a new 26-digit log identifier.
pub fn generate_log_id() -> String {
    let now = Utc::now();
    let random_part: u32 = rand::rng().random_range(0..1_000_000);
    format!("{}{:06}", now.format("%Y%m%d%H%M%S%6f"), random_part)
}
