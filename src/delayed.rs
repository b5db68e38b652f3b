use std::time::{Duration, Instant};

/// Stand-in expiry for delays too large to be represented as an `Instant`. Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A value that is delayed until some `Instant`.
///
/// The wait list orders its entries by this `Instant`, so it must not change while a value
/// is held by a queue.
pub trait Delayed {
    /// Returns the `Instant` until which this value is delayed.
    fn delayed_until(&self) -> Instant;
}

/// A value together with the delay it was inserted with and the `Instant` at which it matures.
///
/// A `DelayItem` is immutable once built. Two items are equal iff their wrapped `value`s are
/// equal and they share the same delay and expiry.
///
/// # Examples
///
/// Basic usage:
///
/// ```
/// use polling_delay_queue::{DelayItem, Delayed};
/// use std::time::{Duration, Instant};
///
/// let delayed_one_hour = DelayItem::for_duration(123, Duration::from_secs(3600));
/// let delayed_now = DelayItem::until_instant("abc", Instant::now());
///
/// assert!(delayed_one_hour.delayed_until() > delayed_now.delayed_until());
/// assert_eq!(delayed_one_hour.value, 123);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct DelayItem<T> {
    /// The value that is delayed.
    pub value: T,

    /// The delay requested at construction.
    delay: Duration,

    /// The `Instant` until which `value` is delayed.
    until: Instant,
}

impl<T> DelayItem<T> {
    /// Creates a new `DelayItem` holding `value` that matures at the given `Instant`.
    ///
    /// The recorded delay is the time left until `until`, or zero if it already passed.
    pub fn until_instant(value: T, until: Instant) -> DelayItem<T> {
        let delay = until.saturating_duration_since(Instant::now());
        DelayItem { value, delay, until }
    }

    /// Creates a new `DelayItem` holding `value` that matures once `delay` has elapsed.
    ///
    /// A delay that overflows `Instant` is clamped to a far-future expiry.
    ///
    /// # Examples
    ///
    /// ```
    /// use polling_delay_queue::DelayItem;
    /// use std::time::Duration;
    ///
    /// let item = DelayItem::for_duration("abc", Duration::from_secs(3600));
    /// assert_eq!(item.delay(), Duration::from_secs(3600));
    /// ```
    pub fn for_duration(value: T, delay: Duration) -> DelayItem<T> {
        let now = Instant::now();
        let until = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        DelayItem { value, delay, until }
    }

    /// The delay this item was created with.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true once the expiry `Instant` is at or before `now`.
    pub fn is_matured_at(&self, now: Instant) -> bool {
        now >= self.until
    }

    /// Time left until expiry, measured from `now`. Zero once matured.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.until.saturating_duration_since(now)
    }

    /// Unwraps the delayed value.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Delayed for DelayItem<T> {
    fn delayed_until(&self) -> Instant {
        self.until
    }
}

impl<T: Default> Default for DelayItem<T> {
    fn default() -> DelayItem<T> {
        DelayItem::for_duration(Default::default(), Duration::from_secs(0))
    }
}

#[cfg(test)]
mod tests {
    use super::{DelayItem, Delayed};
    use std::time::{Duration, Instant};

    #[test]
    fn compare_until() {
        let delayed_one_hour = DelayItem::for_duration(123, Duration::from_secs(3600));
        let delayed_now = DelayItem::until_instant("abc", Instant::now());

        assert!(delayed_one_hour.delayed_until() > delayed_now.delayed_until());
    }

    #[test]
    fn correct_value() {
        let delayed_one_hour = DelayItem::for_duration(123, Duration::from_secs(3600));
        let delayed_now = DelayItem::until_instant("abc", Instant::now());

        assert_eq!(delayed_one_hour.value, 123);
        assert_eq!(delayed_now.into_value(), "abc");
    }

    #[test]
    fn past_instant_has_zero_delay() {
        let now = Instant::now();
        let item = DelayItem::until_instant("late", now);

        assert_eq!(item.delay(), Duration::from_secs(0));
        assert!(item.is_matured_at(now));
        assert_eq!(item.remaining_at(now + Duration::from_secs(1)), Duration::from_secs(0));
    }

    #[test]
    fn huge_delay_is_clamped() {
        let item = DelayItem::for_duration("never", Duration::MAX);

        assert_eq!(item.delay(), Duration::MAX);
        assert!(!item.is_matured_at(Instant::now()));
        assert!(item.delayed_until() > Instant::now() + Duration::from_secs(86400 * 365));
    }

    #[test]
    fn maturity() {
        let item = DelayItem::for_duration((), Duration::from_secs(60));
        let now = Instant::now();

        assert!(!item.is_matured_at(now));
        assert!(item.remaining_at(now) > Duration::from_secs(59));
        assert!(item.is_matured_at(item.delayed_until()));
    }
}
