//! Output rate limiting with last-value-wins semantics.
//!
//! The engine filters every input frame; only publication to consumers is
//! throttled.

/// Holds the newest value and releases it at most once per `interval` seconds
#[derive(Debug, Clone)]
pub struct RateLimited<T> {
    interval: f64,
    pending: Option<T>,
    published: Option<T>,
    last_publish: Option<f64>,
}

impl<T: Clone> RateLimited<T> {
    /// A non-positive interval publishes every new value
    #[must_use]
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(0.0),
            pending: None,
            published: None,
            last_publish: None,
        }
    }

    /// Offer a value; it replaces any value not yet published
    pub fn set(&mut self, value: T) {
        self.pending = Some(value);
    }

    /// Publish the pending value if the interval has elapsed.
    ///
    /// Returns the newly published value, or `None` if nothing new is due.
    pub fn sample(&mut self, now: f64) -> Option<&T> {
        let due = self.last_publish.map_or(true, |last| now - last >= self.interval);
        if !due {
            return None;
        }
        let value = self.pending.take()?;
        self.published = Some(value);
        self.last_publish = Some(now);
        self.published.as_ref()
    }

    /// Most recently published value
    #[must_use]
    pub fn current(&self) -> Option<&T> {
        self.published.as_ref()
    }

    #[must_use]
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Change the interval; takes effect on the next sample
    pub fn set_interval(&mut self, interval: f64) {
        self.interval = interval.max(0.0);
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.published = None;
        self.last_publish = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_value_wins() {
        let mut limited = RateLimited::new(0.1);
        limited.set(1);
        assert_eq!(limited.sample(0.0), Some(&1));

        limited.set(2);
        limited.set(3);
        assert_eq!(limited.sample(0.05), None);
        assert_eq!(limited.current(), Some(&1));

        assert_eq!(limited.sample(0.1), Some(&3));
        assert_eq!(limited.sample(0.5), None); // nothing new
        assert_eq!(limited.current(), Some(&3));
    }

    #[test]
    fn test_zero_interval_publishes_everything() {
        let mut limited = RateLimited::new(0.0);
        for i in 0..5 {
            limited.set(i);
            assert_eq!(limited.sample(0.0), Some(&i));
        }
    }
}
