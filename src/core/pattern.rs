// src/core/pattern.rs
//
// Rolling energy history and the on/off run-length pattern matcher.

use log::trace;

use crate::config::{DetectorConfig, MismatchPolicy};

/// Alternating run-lengths of expected peak state, starting with "on".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternShape {
    runs: Vec<usize>,
}

impl PatternShape {
    /// Returns `None` for an empty pattern or one with an empty run.
    pub fn new(runs: Vec<usize>) -> Option<Self> {
        if runs.is_empty() || runs.contains(&0) {
            return None;
        }
        Some(Self { runs })
    }

    pub fn runs(&self) -> &[usize] {
        &self.runs
    }

    /// Window length the pattern spans
    pub fn len(&self) -> usize {
        self.runs.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Expected peak state at each window position
    pub fn expected_states(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.runs
            .iter()
            .enumerate()
            .flat_map(|(segment, &run)| std::iter::repeat((segment, segment % 2 == 0)).take(run))
    }
}

impl Default for PatternShape {
    fn default() -> Self {
        Self { runs: vec![3, 1, 3] }
    }
}

/// Peak rule: a value is "on" when it reaches half the window mean, but
/// never below the configured floor.
#[inline]
pub fn is_peak(mean: f64, value: f64, floor: f64) -> bool {
    let threshold = (mean / 2.0).max(floor);
    value >= threshold
}

/// Fixed-capacity FIFO of band energies that evaluates the pattern each
/// time the window fills. Capacity is the pattern length by construction.
#[derive(Debug, Clone)]
pub struct PatternHistory {
    shape: PatternShape,
    values: Box<[f64]>,
    head: usize,
    len: usize,
    peak_floor: f64,
    policy: MismatchPolicy,
}

impl PatternHistory {
    pub fn new(shape: PatternShape, peak_floor: f64, policy: MismatchPolicy) -> Self {
        let capacity = shape.len();
        Self {
            shape,
            values: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            peak_floor,
            policy,
        }
    }

    /// Build from a validated configuration. Falls back to the default
    /// `{3,1,3}` shape if the configured pattern is unusable.
    pub fn from_config(config: &DetectorConfig) -> Self {
        let shape = PatternShape::new(config.pattern.clone()).unwrap_or_default();
        Self::new(shape, config.peak_floor, config.mismatch_policy)
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the next push completes a window and yields a verdict. Once
    /// primed the history holds `capacity - 1` values between pushes, so
    /// `len() == capacity()` is never observed.
    pub fn is_primed(&self) -> bool {
        self.len + 1 >= self.capacity()
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Stored values, oldest first
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| self.values[(self.head + i) % capacity])
    }

    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.values().sum::<f64>() / self.len as f64
    }

    /// Insert a value. When this fills the window, the full window is
    /// evaluated, the oldest value is evicted and the verdict is returned.
    pub fn push(&mut self, value: f64) -> Option<bool> {
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        self.values[tail] = value;
        self.len += 1;

        if self.len < capacity {
            return None;
        }

        let verdict = self.evaluate();
        self.head = (self.head + 1) % capacity;
        self.len -= 1;
        Some(verdict)
    }

    fn evaluate(&self) -> bool {
        let mean = self.mean();
        let mut errors = 0usize;
        let mut segment = 0usize;
        let mut segment_hit = false;

        for (value, (index, expected)) in self.values().zip(self.shape.expected_states()) {
            if index != segment {
                // A forgiven mismatch may not stand in for a whole segment.
                if !segment_hit {
                    trace!("window rejected (segment {segment} unmatched) mean={mean:.1}");
                    return false;
                }
                segment = index;
                segment_hit = false;
            }

            if is_peak(mean, value, self.peak_floor) == expected {
                segment_hit = true;
                errors = 0;
                continue;
            }

            match self.policy {
                MismatchPolicy::Strict => {
                    trace!("window rejected (strict) mean={mean:.1}");
                    return false;
                }
                MismatchPolicy::Tolerant => {
                    if errors > 0 {
                        trace!("window rejected (two mismatches) mean={mean:.1}");
                        return false;
                    }
                    errors += 1;
                }
            }
        }

        trace!("window evaluated mean={mean:.1} matched={segment_hit}");
        segment_hit
    }
}

impl Default for PatternHistory {
    fn default() -> Self {
        Self::new(PatternShape::default(), 5000.0, MismatchPolicy::Tolerant)
    }
}
