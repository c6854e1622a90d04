//! Primary key generation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Length of every id returned by [`next_id`].
pub const ID_LEN: usize = 50;

/// Returns a new 50-character id for the current time.
pub fn next_id() -> String {
    next_id_at(Utc::now())
}

/// Returns a new 50-character id for `t`: the zero-padded 15-digit
/// millisecond timestamp, 32 random hex digits and a `000` suffix.
///
/// Ids generated later sort after ids generated earlier.
pub fn next_id_at(t: DateTime<Utc>) -> String {
    format!("{:015}{}000", t.timestamp_millis(), Uuid::new_v4().simple())
}
