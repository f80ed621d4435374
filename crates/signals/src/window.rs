use std::collections::VecDeque;

/// Fixed-capacity FIFO of f64 samples with a running sum, so push/evict and
/// window totals stay O(1) instead of resumming on every update.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Pushes a sample, returning the evicted oldest sample once full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.buf.len() == self.capacity {
            let old = self.buf.pop_front();
            if let Some(old) = old {
                self.sum -= old;
            }
            old
        } else {
            None
        };
        self.buf.push_back(value);
        self.sum += value;
        evicted
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn front(&self) -> Option<f64> {
        self.buf.front().copied()
    }

    #[must_use]
    pub fn back(&self) -> Option<f64> {
        self.buf.back().copied()
    }

    /// Oldest-first iterator over the retained samples.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }

    /// Mean of all retained samples except the most recent one.
    #[must_use]
    pub fn trailing_mean(&self) -> Option<f64> {
        let prior = self.buf.len().checked_sub(1)?;
        if prior == 0 {
            return None;
        }
        let last = self.buf.back().copied().unwrap_or(0.0);
        Some((self.sum - last) / prior as f64)
    }
}
