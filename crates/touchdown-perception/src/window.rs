//! Fixed-capacity FIFO window with a pluggable summary.
//!
//! [`SlidingWindow`] keeps the `N` most recent samples in arrival order and
//! reduces them on demand with a caller-supplied function (mean, max, …).
//! The summary is only defined once the window is full.
//!
//! # Example
//!
//! ```rust
//! use touchdown_perception::window::SlidingWindow;
//! use touchdown_types::Vec3;
//!
//! let mut w = SlidingWindow::mean(2);
//! w.append(Vec3::new(0.0, 0.0, -1.0));
//! assert!(w.value().is_none());
//! w.append(Vec3::new(0.0, 0.0, -3.0));
//! assert_eq!(w.value(), Some(Vec3::new(0.0, 0.0, -2.0)));
//! ```

use std::collections::VecDeque;

use touchdown_types::Vec3;

/// Summarization function applied over the window contents
/// (oldest → newest).
pub type Reducer<T> = fn(&VecDeque<T>) -> T;

/// A sliding window over a stream of samples in FIFO order.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T, F = Reducer<T>> {
    samples: VecDeque<T>,
    capacity: usize,
    reducer: F,
}

impl<T, F> SlidingWindow<T, F>
where
    F: Fn(&VecDeque<T>) -> T,
{
    /// Create a window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize, reducer: F) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            reducer,
        }
    }

    /// Insert `value` as the newest sample, evicting the oldest first when
    /// the window is full.
    pub fn append(&mut self, value: T) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// `true` once `capacity` samples have been appended since the last
    /// [`clear`](Self::clear).
    pub fn valid(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// The summarized value, or `None` while the window is not yet full.
    pub fn value(&self) -> Option<T> {
        self.valid().then(|| (self.reducer)(&self.samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    /// Drop every sample; the window becomes invalid again.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl SlidingWindow<Vec3> {
    /// Window summarized by the component-wise arithmetic mean.
    pub fn mean(capacity: usize) -> Self {
        Self::new(capacity, mean_vec3)
    }
}

/// Component-wise arithmetic mean; the zero vector for an empty input.
pub fn mean_vec3(samples: &VecDeque<Vec3>) -> Vec3 {
    if samples.is_empty() {
        return Vec3::zero();
    }
    let sum = samples.iter().fold(Vec3::zero(), |acc, v| acc + *v);
    sum / samples.len() as f64
}
