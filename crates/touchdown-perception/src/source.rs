//! Pose acquisition strategies.
//!
//! A [`PoseSource`] produces time-stamped tip positions for the
//! [`GroundDetector`][crate::detector::GroundDetector].  Two production
//! strategies exist and one is chosen per detector at construction time:
//!
//! - [`LinkStateSource`] – **push**: snapshots of every named link arrive on
//!   the [`EventBus`]; the source picks out one link by name.
//! - [`TfLookupSource`] – **pull**: each call performs a bounded-wait lookup
//!   of the tip frame relative to the arm base frame in a shared
//!   [`TfBuffer`][crate::transform::TfBuffer].
//!
//! [`ScriptedSource`] replays a fixed sequence and is used for offline
//! replays and tests.
//!
//! Failures (missing link, failed lookup) are logged and reported as "no
//! sample"; they never propagate as errors.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;
use touchdown_middleware::{EventBus, Topic, TopicReceiver};
use touchdown_types::{EventPayload, PoseSample, Vec3};
use tracing::{debug, error, warn};

use crate::transform::{LookupTime, SharedTfBuffer, lookup_with_timeout};

/// How a source delivers samples to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Samples accumulate independently of the detector; every pending one
    /// is consumed on each evaluation step.
    Push,
    /// At most one sample is fetched per evaluation step.
    Pull,
}

/// Something that can produce the manipulator tip position.
pub trait PoseSource {
    fn acquisition(&self) -> Acquisition;

    /// Attempt to produce the next position, or `None` when no sample is
    /// available right now.
    fn next_sample(&mut self) -> Option<PoseSample>;

    /// Position to report as the ground position, expressed in the arm's
    /// reference frame.  `None` lets the detector fall back to the last
    /// position it accepted.
    fn ground_position(&mut self) -> Option<Vec3> {
        None
    }

    /// Drop every sample that is already waiting.  Called while the
    /// detector is latched and on reset, so stale motion never reaches a
    /// fresh detection cycle.
    fn discard_pending(&mut self) {}

    /// Forget any per-cycle state, such as a remembered position.
    fn reset(&mut self) {}
}

impl<S: PoseSource + ?Sized> PoseSource for Box<S> {
    fn acquisition(&self) -> Acquisition {
        (**self).acquisition()
    }

    fn next_sample(&mut self) -> Option<PoseSample> {
        (**self).next_sample()
    }

    fn ground_position(&mut self) -> Option<Vec3> {
        (**self).ground_position()
    }

    fn discard_pending(&mut self) {
        (**self).discard_pending()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Lets an error be logged at most once per `interval`.
#[derive(Debug)]
struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl LogThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// A frame-graph lookup: pose of `source_frame` in `target_frame`.
#[derive(Debug, Clone)]
pub struct FrameLookup {
    pub buffer: SharedTfBuffer,
    pub target_frame: String,
    pub source_frame: String,
    pub timeout: Duration,
}

impl FrameLookup {
    pub fn new(
        buffer: SharedTfBuffer,
        target_frame: impl Into<String>,
        source_frame: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            buffer,
            target_frame: target_frame.into(),
            source_frame: source_frame.into(),
            timeout,
        }
    }

    /// Run the lookup at the latest available time, logging a warning on
    /// failure.
    fn sample(&self) -> Option<PoseSample> {
        match lookup_with_timeout(
            &self.buffer,
            &self.target_frame,
            &self.source_frame,
            LookupTime::Latest,
            self.timeout,
        ) {
            Ok(t) => Some(PoseSample::new(t.transform.translation, t.stamp)),
            Err(e) => {
                warn!(
                    target_frame = %self.target_frame,
                    source_frame = %self.source_frame,
                    error = %e,
                    "GroundDetector: transform lookup failed"
                );
                None
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Push: link states
// ────────────────────────────────────────────────────────────────────────────

/// Push-based source fed by [`Topic::LinkStates`] snapshots.
#[derive(Debug)]
pub struct LinkStateSource {
    receiver: TopicReceiver,
    link_name: String,
    reference: Option<FrameLookup>,
    missing_link_log: LogThrottle,
}

impl LinkStateSource {
    /// Subscribe to `bus` and track the link called `link_name`
    /// (e.g. `"lander::l_scoop_tip"`).
    ///
    /// Only snapshots published after this call are seen.
    pub fn new(bus: &EventBus, link_name: impl Into<String>) -> Self {
        Self {
            receiver: bus.subscribe_to(Topic::LinkStates),
            link_name: link_name.into(),
            reference: None,
            missing_link_log: LogThrottle::new(Duration::from_secs(1)),
        }
    }

    /// Report the ground position through `lookup` instead of in the
    /// snapshot's world coordinates.
    pub fn with_reference_lookup(mut self, lookup: FrameLookup) -> Self {
        self.reference = Some(lookup);
        self
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }
}

impl PoseSource for LinkStateSource {
    fn acquisition(&self) -> Acquisition {
        Acquisition::Push
    }

    fn next_sample(&mut self) -> Option<PoseSample> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let EventPayload::LinkStates(snapshot) = event.payload else {
                        continue;
                    };
                    match snapshot.position_of(&self.link_name) {
                        Some(position) => return Some(PoseSample::new(position, snapshot.stamp)),
                        None => {
                            if self.missing_link_log.ready() {
                                error!(
                                    link = %self.link_name,
                                    "GroundDetector: link not found in link states"
                                );
                            }
                        }
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(link = %self.link_name, lagged_by = n, "LinkStateSource lagged");
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    debug!(link = %self.link_name, "link-state channel closed");
                    return None;
                }
            }
        }
    }

    fn ground_position(&mut self) -> Option<Vec3> {
        self.reference
            .as_ref()
            .and_then(FrameLookup::sample)
            .map(|s| s.position)
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        loop {
            match self.receiver.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if dropped > 0 {
            debug!(link = %self.link_name, dropped, "discarded pending link states");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pull: transform lookup
// ────────────────────────────────────────────────────────────────────────────

/// Pull-based source that looks the tip up in a shared TF buffer.
#[derive(Debug)]
pub struct TfLookupSource {
    lookup: FrameLookup,
    last_position: Option<Vec3>,
}

impl TfLookupSource {
    pub fn new(lookup: FrameLookup) -> Self {
        Self {
            lookup,
            last_position: None,
        }
    }
}

impl PoseSource for TfLookupSource {
    fn acquisition(&self) -> Acquisition {
        Acquisition::Pull
    }

    fn next_sample(&mut self) -> Option<PoseSample> {
        let sample = self.lookup.sample()?;
        self.last_position = Some(sample.position);
        Some(sample)
    }

    /// The last successfully retrieved position, even before contact.
    fn ground_position(&mut self) -> Option<Vec3> {
        self.last_position
    }

    fn reset(&mut self) {
        self.last_position = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted
// ────────────────────────────────────────────────────────────────────────────

/// Pull-based source replaying a fixed script.  A `None` entry stands for a
/// failed lookup.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    script: VecDeque<Option<PoseSample>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script made of `(position, stamp)` pairs with no gaps.
    pub fn from_samples(samples: impl IntoIterator<Item = PoseSample>) -> Self {
        Self {
            script: samples.into_iter().map(Some).collect(),
        }
    }

    pub fn push(&mut self, sample: PoseSample) {
        self.script.push_back(Some(sample));
    }

    /// Queue one "no sample" step.
    pub fn push_gap(&mut self) {
        self.script.push_back(None);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl PoseSource for ScriptedSource {
    fn acquisition(&self) -> Acquisition {
        Acquisition::Pull
    }

    fn next_sample(&mut self) -> Option<PoseSample> {
        self.script.pop_front().flatten()
    }
}
