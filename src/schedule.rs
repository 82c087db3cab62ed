//! Classification of timing configurations.
//!
//! A builder may be given any combination of a start delay, a timeout and a
//! repeating interval. [`classify`] maps the presence of each to one of eight
//! [`Schedule`] states, which decide how the dispatcher launches the work.
//! [`TimingConfig`] stores the three values and memoizes the classification
//! until one of them is set again.

use std::time::Duration;

/// Which timing controls are configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// Nothing configured.
    NoSchedule,
    /// Delay only.
    Delay,
    /// Timeout only.
    Timeout,
    /// Interval only.
    Interval,
    DelayAndTimeout,
    DelayAndInterval,
    TimeoutAndInterval,
    /// Delay, timeout and interval.
    All,
}

impl Schedule {
    /// `true` when a timeout guard must be attached.
    #[must_use]
    pub const fn has_timeout(self) -> bool {
        matches!(
            self,
            Schedule::Timeout
                | Schedule::DelayAndTimeout
                | Schedule::TimeoutAndInterval
                | Schedule::All
        )
    }

    /// `true` when the work repeats and yields a periodic handle.
    #[must_use]
    pub const fn is_periodic(self) -> bool {
        matches!(
            self,
            Schedule::Interval
                | Schedule::DelayAndInterval
                | Schedule::TimeoutAndInterval
                | Schedule::All
        )
    }
}

/// Maps the presence of each timing value to a [`Schedule`].
///
/// Every combination is valid.
#[must_use]
pub fn classify(
    delay: Option<Duration>,
    timeout: Option<Duration>,
    interval: Option<Duration>,
) -> Schedule {
    match (delay.is_some(), timeout.is_some(), interval.is_some()) {
        (false, false, false) => Schedule::NoSchedule,
        (true, false, false) => Schedule::Delay,
        (false, true, false) => Schedule::Timeout,
        (false, false, true) => Schedule::Interval,
        (true, true, false) => Schedule::DelayAndTimeout,
        (true, false, true) => Schedule::DelayAndInterval,
        (false, true, true) => Schedule::TimeoutAndInterval,
        (true, true, true) => Schedule::All,
    }
}

/// Delay, timeout and interval of a builder, with a cached [`Schedule`].
#[derive(Clone, Debug, Default)]
pub struct TimingConfig {
    delay: Option<Duration>,
    timeout: Option<Duration>,
    interval: Option<Duration>,
    classification: Option<Schedule>,
}

impl TimingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start delay and invalidates the cached classification.
    pub fn set_delay(&mut self, delay: Duration) -> &mut Self {
        self.delay = Some(delay);
        self.classification = None;
        self
    }

    /// Sets the timeout and invalidates the cached classification.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self.classification = None;
        self
    }

    /// Sets the repeating interval and invalidates the cached classification.
    pub fn set_interval(&mut self, interval: Duration) -> &mut Self {
        self.interval = Some(interval);
        self.classification = None;
        self
    }

    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Returns the classification, computing it only if no cached value exists.
    pub fn classification(&mut self) -> Schedule {
        let (delay, timeout, interval) = (self.delay, self.timeout, self.interval);
        *self
            .classification
            .get_or_insert_with(|| classify(delay, timeout, interval))
    }

    /// The memoized classification, if one was computed since the last setter call.
    #[must_use]
    pub fn cached(&self) -> Option<Schedule> {
        self.classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Option<Duration> = Some(Duration::from_millis(10));

    #[test]
    fn every_combination_is_classified() {
        let cases = [
            ((None, None, None), Schedule::NoSchedule),
            ((D, None, None), Schedule::Delay),
            ((None, D, None), Schedule::Timeout),
            ((None, None, D), Schedule::Interval),
            ((D, D, None), Schedule::DelayAndTimeout),
            ((D, None, D), Schedule::DelayAndInterval),
            ((None, D, D), Schedule::TimeoutAndInterval),
            ((D, D, D), Schedule::All),
        ];
        for ((delay, timeout, interval), expected) in cases {
            assert_eq!(classify(delay, timeout, interval), expected);
        }
    }

    #[test]
    fn timeout_and_periodic_predicates() {
        assert!(Schedule::All.has_timeout() && Schedule::All.is_periodic());
        assert!(Schedule::Timeout.has_timeout() && !Schedule::Timeout.is_periodic());
        assert!(!Schedule::Interval.has_timeout() && Schedule::Interval.is_periodic());
        assert!(!Schedule::NoSchedule.has_timeout() && !Schedule::NoSchedule.is_periodic());
        assert!(!Schedule::DelayAndInterval.has_timeout());
    }

    #[test]
    fn classification_is_memoized_until_a_setter_runs() {
        let mut timing = TimingConfig::new();
        assert_eq!(timing.cached(), None);

        assert_eq!(timing.classification(), Schedule::NoSchedule);
        assert_eq!(timing.cached(), Some(Schedule::NoSchedule));
        assert_eq!(timing.classification(), Schedule::NoSchedule);

        timing.set_delay(Duration::from_millis(5));
        assert_eq!(timing.cached(), None, "setter must invalidate the cache");
        assert_eq!(timing.classification(), Schedule::Delay);

        timing
            .set_timeout(Duration::from_millis(5))
            .set_interval(Duration::from_millis(5));
        assert_eq!(timing.cached(), None);
        assert_eq!(timing.classification(), Schedule::All);
        assert_eq!(timing.cached(), Some(Schedule::All));
    }

    #[test]
    fn resetting_a_value_invalidates_even_if_unchanged() {
        let mut timing = TimingConfig::new();
        timing.set_interval(Duration::from_millis(5));
        assert_eq!(timing.classification(), Schedule::Interval);
        timing.set_interval(Duration::from_millis(5));
        assert_eq!(timing.cached(), None);
    }
}
