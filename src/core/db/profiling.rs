//! Statement timing.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Statements slower than this are reported at `warn` level.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

/// Logs the wall-clock time elapsed since `start` for `sql`.
///
/// Returns `true` when the elapsed time exceeded `threshold`.
pub fn profiling(start: Instant, sql: &str, threshold: Duration) -> bool {
    let elapsed = start.elapsed();
    let slow = elapsed > threshold;
    if slow {
        warn!("[PROFILING] [DB] {:.6}s: {}", elapsed.as_secs_f64(), sql);
    } else {
        debug!("[PROFILING] [DB] {:.6}s: {}", elapsed.as_secs_f64(), sql);
    }
    slow
}
