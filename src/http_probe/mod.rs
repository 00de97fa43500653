pub mod cert;
pub mod probe;
pub mod resolver;
pub mod result;

pub mod prelude {
    pub use super::probe::{HealthChecker, ProbeSettings};
    pub use super::result::{AggregatedReport, NOT_OBTAINED, ProbeResult};
}

use std::fmt::Write;

/// Flattens an error and its sources into a single message.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}
