//! TTL expiry: the discrete-time wheel and the owner loop that drives it.
//!
//! All scheduling inside this module is expressed in **steps**: whole
//! multiples of the sweeper's tick interval.  Real-time TTLs configured in
//! the builder are converted once via [`steps_for`]; a zero TTL converts to
//! nothing at all (entries without a schedule live forever).

pub(crate) mod owner;
pub mod wheel;

use std::time::Duration;

pub use wheel::{ExpiryWheel, TtlAction};

/// Translates a real-time TTL into wheel steps, rounding up.
///
/// The effective worst-case lifetime of an entry is `ttl + tick`: the set is
/// deferred to the pending batch, so a freshly written entry always survives
/// the tick that is already in flight.
pub(crate) fn steps_for(ttl: Duration, tick: Duration) -> u64 {
    ttl.as_millis().div_ceil(tick.as_millis().max(1)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_round_up_to_whole_ticks() {
        let tick = Duration::from_millis(100);
        assert_eq!(steps_for(Duration::from_millis(1), tick), 1);
        assert_eq!(steps_for(Duration::from_millis(100), tick), 1);
        assert_eq!(steps_for(Duration::from_millis(101), tick), 2);
        assert_eq!(steps_for(Duration::from_millis(1_000), tick), 10);
        assert_eq!(steps_for(Duration::ZERO, tick), 0);
    }
}
