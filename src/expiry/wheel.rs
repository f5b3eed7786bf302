//! Discrete-time expiry wheel.
//!
//! ## Algorithm
//!
//! The wheel tracks a logical tick counter (`current_step`) and, for every
//! scheduled key, the absolute tick at which it falls due.  Keys due at the
//! same tick share a **bucket**, so advancing the clock emits exactly the
//! keys whose time has arrived without scanning the full key space:
//!
//! | structure | maps                                  | purpose            |
//! |-----------|---------------------------------------|--------------------|
//! | `buckets` | tick → set of keys due at that tick   | O(1) tick drain    |
//! | `due`     | key → (due tick, interval length)     | removal + renewal  |
//! | `pending` | key → deferred [`TtlAction`]          | batch until a tick |
//!
//! ### Deferred sets
//!
//! `set` never touches the buckets directly.  It records the intent in
//! `pending`, and `next_step` applies the whole batch at the tick boundary.
//! Any number of `set` calls for the same key between two ticks collapse to
//! a single effective action: the last numeric interval wins, and `Renew`
//! never downgrades a numeric interval that is already pending.  A key set
//! with interval `n` is therefore emitted by the `n`-th `next_step` call
//! *after* the one that flushed it out of `pending`.
//!
//! ### Normalization
//!
//! When the counter reaches `max_step`, every absolute tick in `buckets` and
//! `due` is rebased by subtracting `max_step` and the counter restarts at 0.
//! Keys whose rebased tick lands on 0 are drained by the same `next_step`
//! call, so eventual expiry timing is preserved across the wrap.
//!
//! The wheel is purely sequential: a single coordinator owns it and all
//! operations take `&mut self`.  No operation can fail; renewing a key the
//! wheel no longer tracks is a silent no-op, accepted as a race against
//! expiry.

use std::collections::hash_map::Entry;
use std::hash::Hash;

use ahash::{AHashMap, AHashSet};

/// A TTL mutation applied to the wheel at the next tick boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlAction {
    /// Schedule the key to fall due `n` ticks after the next tick boundary.
    /// `Steps(0)` is ignored: a zero interval means "keep forever".
    Steps(u64),
    /// Re-schedule the key using the interval it was last scheduled with.
    /// Ignored when the wheel no longer tracks the key.
    Renew,
}

/// Per-key scheduling state: the absolute due tick and the interval length
/// the key was scheduled with (needed to honor [`TtlAction::Renew`]).
#[derive(Clone, Copy)]
struct Due {
    at: u64,
    after: u64,
}

/// A bucketed, tick-indexed structure tracking which keys expire when.
pub struct ExpiryWheel<K> {
    /// Logical clock; wraps to 0 when it reaches `max_step`.
    current_step: u64,
    /// Horizon at which tick values are rebased.
    max_step: u64,
    /// Keys due at each future tick.  A bucket is removed when drained or
    /// when its last key is rescheduled away.
    buckets: AHashMap<u64, AHashSet<K>>,
    /// Canonical schedule for each tracked key.
    due: AHashMap<K, Due>,
    /// Sets deferred until the next tick boundary.
    pending: AHashMap<K, TtlAction>,
}

impl<K: Hash + Eq + Clone> ExpiryWheel<K> {
    /// Creates an empty wheel with the given horizon.
    pub fn new(max_step: u64) -> Self {
        assert!(max_step > 0, "max_step must be greater than 0");
        ExpiryWheel {
            current_step: 0,
            max_step,
            buckets: AHashMap::new(),
            due: AHashMap::new(),
            pending: AHashMap::new(),
        }
    }

    /// Records an intended TTL change, applied at the next [`next_step`].
    ///
    /// Merge policy for a key that already has a pending action: a numeric
    /// `Steps(n)` always overwrites, while `Renew` keeps whatever is already
    /// pending (renewing is idempotent and must not downgrade an explicit
    /// interval recorded in the same batch).
    ///
    /// [`next_step`]: ExpiryWheel::next_step
    pub fn set(&mut self, key: K, action: TtlAction) {
        match self.pending.entry(key) {
            Entry::Occupied(mut e) => {
                if matches!(action, TtlAction::Steps(_)) {
                    e.insert(action);
                }
            }
            Entry::Vacant(e) => {
                e.insert(action);
            }
        }
    }

    /// Advances the clock one tick and returns the keys that just fell due.
    ///
    /// In order: the counter advances (normalizing at the horizon), the
    /// pending batch is applied, and the bucket for the new current tick is
    /// drained.  Applying the batch first means a key renewed or re-set in
    /// the window before this tick escapes the drain.
    pub fn next_step(&mut self) -> Vec<K> {
        self.current_step += 1;
        if self.current_step == self.max_step {
            self.normalize();
            self.current_step = 0;
        }

        let pending = std::mem::take(&mut self.pending);
        for (key, action) in pending {
            match action {
                TtlAction::Steps(0) => {}
                TtlAction::Steps(n) => self.schedule(key, n),
                TtlAction::Renew => {
                    if let Some(due) = self.due.get(&key) {
                        let interval = due.after;
                        self.schedule(key, interval);
                    }
                }
            }
        }

        let expired: Vec<K> = match self.buckets.remove(&self.current_step) {
            Some(keys) => keys.into_iter().collect(),
            None => Vec::new(),
        };
        for key in &expired {
            self.due.remove(key);
        }
        expired
    }

    /// Moves `key` to the bucket `steps` ticks from now, dropping any slot
    /// it previously occupied.  `steps` must be non-zero.
    fn schedule(&mut self, key: K, steps: u64) {
        if let Some(prev) = self.due.get(&key) {
            if let Some(bucket) = self.buckets.get_mut(&prev.at) {
                bucket.remove(&key);
                if bucket.is_empty() {
                    self.buckets.remove(&prev.at);
                }
            }
        }
        let at = self.current_step.saturating_add(steps);
        self.buckets.entry(at).or_default().insert(key.clone());
        self.due.insert(key, Due { at, after: steps });
    }

    /// Rebases every absolute tick into the new epoch starting at 0.
    ///
    /// Called when the counter reaches `max_step`.  Every live bucket sits
    /// strictly above the pre-wrap counter, so rebased ticks are ≥ 0; a key
    /// that lands on 0 is due immediately and is drained by the enclosing
    /// `next_step` call.
    fn normalize(&mut self) {
        let shift = self.max_step;
        let old = std::mem::take(&mut self.buckets);
        for (tick, keys) in old {
            self.buckets
                .entry(tick.saturating_sub(shift))
                .or_default()
                .extend(keys);
        }
        for due in self.due.values_mut() {
            due.at = due.at.saturating_sub(shift);
        }
    }

    /// Number of keys currently scheduled (O(1)).
    pub fn len(&self) -> usize {
        self.due.len()
    }

    /// Returns `true` if no keys are scheduled.
    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn wheel() -> ExpiryWheel<&'static str> {
        ExpiryWheel::new(u64::MAX)
    }

    /// Drains the wheel through `n` ticks, collecting everything expired.
    fn run_ticks(w: &mut ExpiryWheel<&'static str>, n: usize) -> Vec<Vec<&'static str>> {
        (0..n).map(|_| w.next_step()).collect()
    }

    #[test]
    fn empty_wheel_stays_empty() {
        let mut w = wheel();
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert!(w.is_empty());
    }

    #[test]
    fn key_expires_after_exact_step_count() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(3));
        // Tick 1 flushes the pending batch; ticks 2 and 3 elapse; tick 4 drains.
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
        assert!(w.is_empty());
    }

    #[test]
    fn zero_steps_is_a_no_op() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(0));
        for expired in run_ticks(&mut w, 5) {
            assert!(expired.is_empty());
        }
        assert!(w.is_empty());
    }

    #[test]
    fn zero_steps_does_not_disturb_existing_schedule() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(2));
        assert!(w.next_step().is_empty());
        w.set("k", TtlAction::Steps(0));
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
    }

    #[test]
    fn renew_on_unknown_key_is_silent() {
        let mut w = wheel();
        w.set("ghost", TtlAction::Renew);
        for expired in run_ticks(&mut w, 4) {
            assert!(expired.is_empty());
        }
    }

    #[test]
    fn renew_reuses_original_interval() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(2));
        assert!(w.next_step().is_empty()); // scheduled, due in 2
        w.set("k", TtlAction::Renew);
        assert!(w.next_step().is_empty()); // renewed, due in 2 again
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
    }

    #[test]
    fn last_numeric_action_wins_within_a_batch() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(5));
        w.set("k", TtlAction::Steps(1));
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
    }

    #[test]
    fn renew_does_not_downgrade_pending_steps() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(2));
        w.set("k", TtlAction::Renew);
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
    }

    #[test]
    fn reschedule_moves_key_between_buckets() {
        let mut w = wheel();
        w.set("k", TtlAction::Steps(1));
        assert!(w.next_step().is_empty()); // due next tick
        w.set("k", TtlAction::Steps(3)); // pushed out before it fires
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["k"]);
    }

    #[test]
    fn normalization_preserves_expiry_timing() {
        // Mirrors a short-horizon wheel wrapping twice around its epoch.
        let mut w: ExpiryWheel<&'static str> = ExpiryWheel::new(3);
        w.set("foo", TtlAction::Steps(1));
        w.set("bar", TtlAction::Steps(4));
        assert!(w.next_step().is_empty());
        assert_eq!(w.next_step(), vec!["foo"]);
        assert!(w.next_step().is_empty()); // wraps: counter rebased to 0
        w.set("foo", TtlAction::Steps(1));
        assert!(w.next_step().is_empty());
        let mut expired = w.next_step();
        expired.sort();
        assert_eq!(expired, vec!["bar", "foo"]);
        assert!(w.is_empty());
    }

    #[test]
    fn len_tracks_scheduled_keys() {
        let mut w = wheel();
        assert_eq!(w.len(), 0);
        w.set("a", TtlAction::Steps(2));
        w.set("b", TtlAction::Steps(3));
        assert_eq!(w.len(), 0); // still pending, not yet scheduled
        w.next_step();
        assert_eq!(w.len(), 2);
        w.next_step();
        w.next_step();
        w.next_step();
        assert_eq!(w.len(), 0);
    }

    // -----------------------------------------------------------------------
    // Property tests: the wheel against a naive reference model
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum WheelOp {
        Set(u8, u64),
        Renew(u8),
        Tick,
    }

    fn wheel_op() -> impl Strategy<Value = WheelOp> {
        prop_oneof![
            (0u8..8, 0u64..6).prop_map(|(k, n)| WheelOp::Set(k, n)),
            (0u8..8).prop_map(WheelOp::Renew),
            Just(WheelOp::Tick),
        ]
    }

    /// Naive model: same deferred-batch semantics, O(n) scan per tick.
    #[derive(Default)]
    struct Model {
        now: u64,
        due: AHashMap<u8, (u64, u64)>,
        pending: AHashMap<u8, TtlAction>,
    }

    impl Model {
        fn set(&mut self, key: u8, action: TtlAction) {
            match self.pending.entry(key) {
                Entry::Occupied(mut e) => {
                    if matches!(action, TtlAction::Steps(_)) {
                        e.insert(action);
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(action);
                }
            }
        }

        fn tick(&mut self) -> Vec<u8> {
            self.now += 1;
            for (key, action) in std::mem::take(&mut self.pending) {
                match action {
                    TtlAction::Steps(0) => {}
                    TtlAction::Steps(n) => {
                        self.due.insert(key, (self.now + n, n));
                    }
                    TtlAction::Renew => {
                        if let Some(&(_, n)) = self.due.get(&key) {
                            self.due.insert(key, (self.now + n, n));
                        }
                    }
                }
            }
            let now = self.now;
            let expired: Vec<u8> = self
                .due
                .iter()
                .filter(|(_, &(at, _))| at == now)
                .map(|(&k, _)| k)
                .collect();
            for key in &expired {
                self.due.remove(key);
            }
            expired
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// The wheel agrees with the naive model for any op sequence, and its
        /// internal maps stay mutually consistent after every tick.
        #[test]
        fn wheel_matches_reference_model(ops in prop::collection::vec(wheel_op(), 1..80)) {
            let mut w: ExpiryWheel<u8> = ExpiryWheel::new(u64::MAX);
            let mut model = Model::default();

            for op in ops {
                match op {
                    WheelOp::Set(k, n) => {
                        w.set(k, TtlAction::Steps(n));
                        model.set(k, TtlAction::Steps(n));
                    }
                    WheelOp::Renew(k) => {
                        w.set(k, TtlAction::Renew);
                        model.set(k, TtlAction::Renew);
                    }
                    WheelOp::Tick => {
                        let mut got = w.next_step();
                        let mut want = model.tick();
                        got.sort_unstable();
                        want.sort_unstable();
                        prop_assert_eq!(got, want);

                        // due and buckets must describe the same schedule.
                        prop_assert!(w.pending.is_empty());
                        for (key, due) in &w.due {
                            let bucket = w.buckets.get(&due.at);
                            prop_assert!(bucket.is_some_and(|b| b.contains(key)));
                        }
                        let scheduled: usize = w.buckets.values().map(|b| b.len()).sum();
                        prop_assert_eq!(scheduled, w.due.len());
                    }
                }
            }
        }

        /// Normalization at a small horizon never loses or reorders expiries.
        #[test]
        fn small_horizon_agrees_with_unbounded(
            ops in prop::collection::vec(wheel_op(), 1..60),
            horizon in 2u64..12,
        ) {
            let mut small: ExpiryWheel<u8> = ExpiryWheel::new(horizon);
            let mut large: ExpiryWheel<u8> = ExpiryWheel::new(u64::MAX);

            for op in ops {
                match op {
                    WheelOp::Set(k, n) => {
                        small.set(k, TtlAction::Steps(n));
                        large.set(k, TtlAction::Steps(n));
                    }
                    WheelOp::Renew(k) => {
                        small.set(k, TtlAction::Renew);
                        large.set(k, TtlAction::Renew);
                    }
                    WheelOp::Tick => {
                        let mut got = small.next_step();
                        let mut want = large.next_step();
                        got.sort_unstable();
                        want.sort_unstable();
                        prop_assert_eq!(got, want);
                    }
                }
            }
        }
    }
}
