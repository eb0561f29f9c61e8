use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};
use thiserror::Error;
use uuid::Uuid;

/// Norms at or below this value are treated as zero-length vectors.
pub const NORM_EPSILON: f64 = 1e-9;

/// A 3-D vector (metres for positions, metres per second for velocities).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A position expressed in some reference frame.
pub type Point = Vec3;

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector pointing the same way, or `None` when the length is
    /// within [`NORM_EPSILON`] of zero (or not finite).
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if !n.is_finite() || n <= NORM_EPSILON {
            return None;
        }
        Some(self / n)
    }

    /// Cosine of the angle between `self` and `rhs`.
    ///
    /// Returns `None` if either vector has no direction.
    pub fn cosine_similarity(self, rhs: Self) -> Option<f64> {
        Some(self.normalized()?.dot(rhs.normalized()?))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}

/// A position paired with the time (seconds, monotonic) it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub position: Vec3,
    pub stamp: f64,
}

impl PoseSample {
    pub fn new(position: Vec3, stamp: f64) -> Self {
        Self { position, stamp }
    }
}

/// Snapshot of every named link known to the simulator at one instant.
///
/// `names[i]` is the identity of the link located at `positions[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub stamp: f64,
    pub names: Vec<String>,
    pub positions: Vec<Vec3>,
}

impl PoseSnapshot {
    pub fn new(stamp: f64) -> Self {
        Self {
            stamp,
            ..Self::default()
        }
    }

    /// Builder-style helper that appends one named link.
    pub fn with_link(mut self, name: impl Into<String>, position: Vec3) -> Self {
        self.names.push(name.into());
        self.positions.push(position);
        self
    }

    /// Position of the link called `name`, if it is part of this snapshot.
    pub fn position_of(&self, name: &str) -> Option<Vec3> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.positions.get(idx).copied()
    }
}

/// Tunable parameters of the ground-contact detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Number of velocity samples in the rolling average.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Number of window-valid readings discarded before the baseline is
    /// trusted.
    #[serde(default = "default_skip_samples")]
    pub skip_samples: u32,
    /// Cosine similarity below which the trending velocity is considered to
    /// have diverged from the baseline.
    #[serde(default = "default_direction_tolerance")]
    pub direction_tolerance: f64,
    /// Samples closer than this (seconds) to the previous one are dropped.
    #[serde(default = "default_min_time_step")]
    pub min_time_step: f64,
}

fn default_window_size() -> usize {
    5
}
fn default_skip_samples() -> u32 {
    5
}
fn default_direction_tolerance() -> f64 {
    0.95
}
fn default_min_time_step() -> f64 {
    1e-4
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            skip_samples: default_skip_samples(),
            direction_tolerance: default_direction_tolerance(),
            min_time_step: default_min_time_step(),
        }
    }
}

/// Unified event wrapper for the pose bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "touchdown-runtime::sim"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped event.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Poses of all simulated links.
    LinkStates(PoseSnapshot),
    /// The ground detector latched; `position` is the tip position at contact.
    ContactDetected { position: Point, stamp: f64 },
    /// Something went wrong in a component; informational only.
    Fault { component: String, message: String },
}

/// Why a frame-graph lookup did not produce a transform.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LookupError {
    #[error("frame '{0}' does not exist")]
    Unavailable(String),

    #[error("frames '{from}' and '{to}' are not connected")]
    Disconnected { from: String, to: String },

    #[error("lookup at t={requested:.4} outside buffered range [{earliest:.4}, {latest:.4}]")]
    Extrapolation {
        requested: f64,
        earliest: f64,
        latest: f64,
    },
}

/// Error type for the outer glue: bus, configuration and motion execution.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum TouchdownError {
    #[error("Transform lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Bus channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Motion execution failed: {0}")]
    Motion(String),

    #[error("Descent aborted: {0}")]
    Aborted(String),
}
