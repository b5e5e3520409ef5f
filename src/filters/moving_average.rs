use crate::history::RingBuffer;
use nalgebra::Vector3;

/// Moving average over a fixed window of vectors.
///
/// Keeps a running sum so each update is O(1) regardless of window size.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window: RingBuffer<Vector3<f64>>,
    sum: Vector3<f64>,
}

impl MovingAverageFilter {
    /// Create a filter averaging the last `window_size` values
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "Window size must be greater than 0");
        Self {
            window: RingBuffer::new(window_size),
            sum: Vector3::zeros(),
        }
    }

    /// Add a value and return the mean of the window
    pub fn apply(&mut self, value: &Vector3<f64>) -> Vector3<f64> {
        if let Some(evicted) = self.window.push(*value) {
            self.sum -= evicted;
        }
        self.sum += value;
        self.mean()
    }

    /// Mean of the current window, zero when empty
    #[must_use]
    pub fn mean(&self) -> Vector3<f64> {
        if self.window.is_empty() {
            return Vector3::zeros();
        }
        self.sum / self.window.len() as f64
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window.capacity()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = Vector3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(x, y, 0.0)
    }

    #[test]
    fn test_moving_average() {
        let mut filter = MovingAverageFilter::new(3);

        assert_eq!(filter.apply(&v(10.0, 20.0)), v(10.0, 20.0));
        assert_eq!(filter.apply(&v(20.0, 30.0)), v(15.0, 25.0));
        assert_eq!(filter.apply(&v(30.0, 40.0)), v(20.0, 30.0));

        // Window is full, oldest value should be dropped
        assert_eq!(filter.apply(&v(40.0, 50.0)), v(30.0, 40.0));
    }

    #[test]
    fn test_running_sum_matches_recomputed_mean() {
        let mut filter = MovingAverageFilter::new(7);
        let mut all = Vec::new();
        for i in 0..500 {
            let value = v((f64::from(i) * 0.37).sin() * 100.0, f64::from(i % 13));
            all.push(value);
            let mean = filter.apply(&value);
            let window = &all[all.len().saturating_sub(7)..];
            let expected = window.iter().sum::<Vector3<f64>>() / window.len() as f64;
            assert!((mean - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn test_reset() {
        let mut filter = MovingAverageFilter::new(2);
        filter.apply(&v(5.0, 5.0));
        filter.reset();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&v(1.0, 1.0)), v(1.0, 1.0));
    }
}
