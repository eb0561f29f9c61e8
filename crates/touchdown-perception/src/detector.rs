//! Ground-contact detector.
//!
//! [`GroundDetector`] watches the tip of a descending manipulator and
//! declares contact when the direction of its trending velocity diverges
//! from the direction it had while falling freely.
//!
//! Every accepted position is differentiated against the previous one and the
//! resulting velocity is pushed into a [`SlidingWindow`] averaged over
//! `window_size` samples.  Once the window is full, `skip_samples` further
//! readings are ignored to let the start-of-motion jerk settle, after which
//! the window mean becomes the *reference* velocity.  From then on the
//! cosine similarity between the reference and the current window mean is
//! compared with `direction_tolerance`; dropping below it latches detection
//! until [`GroundDetector::reset`].
//!
//! ```text
//! CollectingFirstSample ─► AwaitingWindowFill ─► SkippingTransient ─► BaselineSet ─► Detected
//!          ▲                                                                            │
//!          └──────────────────────────────── reset() ◄──────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use touchdown_perception::detector::GroundDetector;
//! use touchdown_perception::source::ScriptedSource;
//! use touchdown_types::{DetectorConfig, PoseSample, Vec3};
//!
//! // Straight down for 4 s, then sideways.
//! let mut script = ScriptedSource::new();
//! for t in 0..=4 {
//!     script.push(PoseSample::new(Vec3::new(0.0, 0.0, -(t as f64)), t as f64));
//! }
//! for t in 5..=8 {
//!     script.push(PoseSample::new(Vec3::new((t - 4) as f64, 0.0, -4.0), t as f64));
//! }
//!
//! let config = DetectorConfig { window_size: 2, skip_samples: 0, ..DetectorConfig::default() };
//! let mut detector = GroundDetector::with_config(script, config);
//! let hit = (0..9).position(|_| detector.detect());
//! assert_eq!(hit, Some(5));
//! assert_eq!(detector.ground_position(), Some(Vec3::new(1.0, 0.0, -4.0)));
//! ```

use touchdown_types::{DetectorConfig, Point, PoseSample, Vec3};
use tracing::{debug, info};

use crate::source::{Acquisition, PoseSource};
use crate::window::SlidingWindow;

/// Similarity assigned when the trending velocity has no direction.
const NO_DIRECTION_SIMILARITY: f64 = -1.0;

/// Where the detector is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionState {
    /// No position seen yet; nothing to differentiate against.
    CollectingFirstSample,
    /// Velocities are accumulating but the window is not yet full.
    AwaitingWindowFill,
    /// The window is full; `skipped` readings have been discarded so far.
    SkippingTransient { skipped: u32 },
    /// Baseline established; each accepted sample is compared against it.
    BaselineSet { reference: Vec3 },
    /// Contact latched.
    Detected { reference: Vec3 },
}

/// Detects ground contact from the tip positions delivered by `S`.
#[derive(Debug)]
pub struct GroundDetector<S> {
    source: S,
    config: DetectorConfig,
    state: DetectionState,
    last: Option<PoseSample>,
    trending_velocity: SlidingWindow<Vec3>,
}

impl<S: PoseSource> GroundDetector<S> {
    /// Detector with the default tuning (window 5, skip 5, tolerance 0.95).
    pub fn new(source: S) -> Self {
        Self::with_config(source, DetectorConfig::default())
    }

    pub fn with_config(source: S, config: DetectorConfig) -> Self {
        Self {
            source,
            trending_velocity: SlidingWindow::mean(config.window_size),
            config,
            state: DetectionState::CollectingFirstSample,
            last: None,
        }
    }

    /// Forget everything about the previous descent, including samples the
    /// source queued while the detector was latched.
    pub fn reset(&mut self) {
        self.state = DetectionState::CollectingFirstSample;
        self.last = None;
        self.trending_velocity.clear();
        self.source.reset();
        self.source.discard_pending();
        debug!("GroundDetector reset");
    }

    /// Run one evaluation step and return whether contact has been detected.
    ///
    /// Push sources have every pending sample consumed (stopping at the
    /// first detection); pull sources are asked for a single sample.  Once
    /// latched, samples that keep arriving are dropped unread.
    pub fn detect(&mut self) -> bool {
        if self.is_detected() {
            self.source.discard_pending();
            return true;
        }
        match self.source.acquisition() {
            Acquisition::Push => {
                while let Some(sample) = self.source.next_sample() {
                    if self.feed(sample) {
                        break;
                    }
                }
            }
            Acquisition::Pull => {
                if let Some(sample) = self.source.next_sample() {
                    self.feed(sample);
                }
            }
        }
        self.is_detected()
    }

    /// The most recently known tip position in the arm's reference frame.
    ///
    /// Meant to be read once [`detect`](Self::detect) has returned `true`.
    /// `None` if no position has been observed yet.
    pub fn ground_position(&mut self) -> Option<Point> {
        self.source
            .ground_position()
            .or_else(|| self.last.map(|s| s.position))
    }

    /// Process one position sample; returns the latched detection state.
    ///
    /// Samples arriving within `min_time_step` of the previous one are
    /// dropped without touching any state.
    pub fn feed(&mut self, sample: PoseSample) -> bool {
        if self.is_detected() {
            return true;
        }

        let Some(last) = self.last else {
            self.last = Some(sample);
            self.state = DetectionState::AwaitingWindowFill;
            return false;
        };

        let dt = sample.stamp - last.stamp;
        if dt.abs() <= self.config.min_time_step {
            return false;
        }

        let velocity = (sample.position - last.position) / dt;
        self.last = Some(sample);
        self.trending_velocity.append(velocity);
        debug!(stamp = sample.stamp, %velocity, "velocity sample");

        let Some(trending) = self.trending_velocity.value() else {
            return false;
        };

        match self.state {
            DetectionState::CollectingFirstSample | DetectionState::AwaitingWindowFill => {
                self.skip_or_establish(1, trending)
            }
            DetectionState::SkippingTransient { skipped } => {
                self.skip_or_establish(skipped.saturating_add(1), trending)
            }
            DetectionState::BaselineSet { reference } => {
                let similarity = reference
                    .cosine_similarity(trending)
                    .unwrap_or(NO_DIRECTION_SIMILARITY);
                if similarity < self.config.direction_tolerance {
                    self.state = DetectionState::Detected { reference };
                    info!(
                        similarity,
                        %reference,
                        %trending,
                        position = %sample.position,
                        "ground contact detected"
                    );
                    true
                } else {
                    false
                }
            }
            DetectionState::Detected { .. } => true,
        }
    }

    fn skip_or_establish(&mut self, skipped: u32, trending: Vec3) -> bool {
        if skipped <= self.config.skip_samples || trending.normalized().is_none() {
            self.state = DetectionState::SkippingTransient { skipped };
            return false;
        }
        self.state = DetectionState::BaselineSet {
            reference: trending,
        };
        info!(reference = %trending, "baseline velocity established");
        false
    }

    pub fn is_detected(&self) -> bool {
        matches!(self.state, DetectionState::Detected { .. })
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn reference_velocity(&self) -> Option<Vec3> {
        match self.state {
            DetectionState::BaselineSet { reference } | DetectionState::Detected { reference } => {
                Some(reference)
            }
            _ => None,
        }
    }

    /// The last sample accepted past the time-step guard.
    pub fn last_sample(&self) -> Option<PoseSample> {
        self.last
    }

    /// Current window mean, once the window is full.
    pub fn trending_velocity(&self) -> Option<Vec3> {
        self.trending_velocity.value()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
