//! Transform Frame (TF) buffer.
//!
//! Maintains a graph of named reference frames and the stamped 3-D rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Each
//! parent → child edge keeps a short time-ordered history so that lookups can
//! be made either at the latest available time or interpolated at a specific
//! stamp.  Edges can be traversed in both directions; walking child → parent
//! uses the inverse transform.
//!
//! # Example
//!
//! ```rust
//! use touchdown_perception::transform::{LookupTime, Quaternion, TfBuffer, Transform3D};
//! use touchdown_types::Vec3;
//!
//! let mut tf = TfBuffer::new();
//! tf.set_static_transform("world", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_transform("base_link", "l_scoop_tip",
//!     Transform3D::new(Vec3::new(0.5, 0.0, -0.2), Quaternion::identity()), 3.0);
//!
//! let t = tf.lookup("world", "l_scoop_tip", LookupTime::Latest).unwrap();
//! assert!((t.transform.translation.x - 1.5).abs() < 1e-9);
//! assert!((t.stamp - 3.0).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use touchdown_types::{LookupError, Vec3};

/// How long (seconds) each dynamic edge keeps its history.
pub const DEFAULT_CACHE_SECS: f64 = 10.0;

/// A buffer shared between the publisher and any number of readers.
pub type SharedTfBuffer = Arc<RwLock<TfBuffer>>;

/// Sleep between retries of a bounded-wait lookup.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` around the Z axis.
    pub fn from_yaw(angle_rad: f64) -> Self {
        let half = angle_rad / 2.0;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Rescale to unit length; a degenerate quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = self.dot(self).sqrt();
        if n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Normalised linear interpolation along the shorter arc.
    pub fn nlerp(self, rhs: Self, t: f64) -> Self {
        let rhs = if self.dot(rhs) < 0.0 {
            Self::new(-rhs.w, -rhs.x, -rhs.y, -rhs.z)
        } else {
            rhs
        };
        Self::new(
            self.w + (rhs.w - self.w) * t,
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
        .normalized()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation + self.rotation.rotate(other.translation);
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_A_B → T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(-inv_rot.rotate(self.translation), inv_rot)
    }

    /// Map a point expressed in frame B into frame A.
    pub fn apply(self, point: Vec3) -> Vec3 {
        self.translation + self.rotation.rotate(point)
    }

    /// Interpolate between `self` (t = 0) and `other` (t = 1).
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self::new(
            self.translation + (other.translation - self.translation) * t,
            self.rotation.nlerp(other.rotation, t),
        )
    }
}

/// A transform valid at `stamp` (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedTransform {
    pub transform: Transform3D,
    pub stamp: f64,
}

/// The instant at which a lookup should be evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupTime {
    /// Newest data on every edge of the chain.
    Latest,
    /// Interpolated at the given stamp; fails outside the buffered range.
    At(f64),
}

// ────────────────────────────────────────────────────────────────────────────
// Edge history
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Edge {
    Static(Transform3D),
    Dynamic(VecDeque<StampedTransform>),
}

impl Edge {
    fn insert(&mut self, entry: StampedTransform, cache_secs: f64) {
        if let Edge::Static(_) = self {
            *self = Edge::Dynamic(VecDeque::new());
        }
        let Edge::Dynamic(history) = self else {
            return;
        };

        match history.iter().position(|e| e.stamp >= entry.stamp) {
            Some(idx) if history[idx].stamp == entry.stamp => history[idx] = entry,
            Some(idx) => history.insert(idx, entry),
            None => history.push_back(entry),
        }

        if let Some(newest) = history.back().map(|e| e.stamp) {
            while history
                .front()
                .is_some_and(|e| e.stamp < newest - cache_secs)
            {
                history.pop_front();
            }
        }
    }

    /// Transform of this edge at `time`; `None` stamp for static edges.
    fn sample(&self, time: LookupTime) -> Result<(Transform3D, Option<f64>), LookupError> {
        let history = match self {
            Edge::Static(t) => return Ok((*t, None)),
            Edge::Dynamic(h) => h,
        };
        let (Some(oldest), Some(newest)) = (history.front(), history.back()) else {
            return Err(LookupError::Extrapolation {
                requested: match time {
                    LookupTime::At(t) => t,
                    LookupTime::Latest => 0.0,
                },
                earliest: 0.0,
                latest: 0.0,
            });
        };

        match time {
            LookupTime::Latest => Ok((newest.transform, Some(newest.stamp))),
            LookupTime::At(t) if t < oldest.stamp || t > newest.stamp => {
                Err(LookupError::Extrapolation {
                    requested: t,
                    earliest: oldest.stamp,
                    latest: newest.stamp,
                })
            }
            LookupTime::At(t) => {
                let upper = history
                    .iter()
                    .position(|e| e.stamp >= t)
                    .unwrap_or(history.len() - 1);
                let after = history[upper];
                if upper == 0 || after.stamp == t {
                    return Ok((after.transform, Some(t)));
                }
                let before = history[upper - 1];
                let ratio = (t - before.stamp) / (after.stamp - before.stamp);
                Ok((before.transform.interpolate(after.transform, ratio), Some(t)))
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// A graph of named reference frames and the stamped [`Transform3D`]s that
/// relate them.
///
/// Frames are identified by arbitrary string names (e.g. `"world"`,
/// `"base_link"`, `"l_scoop_tip"`).  An edge `"A" → "B"` stores the pose of
/// `B` in `A`; lookups may traverse it backwards.
#[derive(Debug)]
pub struct TfBuffer {
    /// `edges[(parent, child)]`
    edges: HashMap<(String, String), Edge>,
    /// Undirected adjacency used by the BFS.
    neighbours: HashMap<String, HashSet<String>>,
    cache_secs: f64,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::with_cache_duration(DEFAULT_CACHE_SECS)
    }
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: an empty buffer wrapped for sharing.
    pub fn shared() -> SharedTfBuffer {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Create a buffer whose dynamic edges keep `cache_secs` of history.
    pub fn with_cache_duration(cache_secs: f64) -> Self {
        Self {
            edges: HashMap::new(),
            neighbours: HashMap::new(),
            cache_secs: cache_secs.max(0.0),
        }
    }

    /// Record the pose of `child_frame` in `parent_frame` at `stamp`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: f64,
    ) {
        let entry = StampedTransform { transform, stamp };
        let cache_secs = self.cache_secs;
        self.edge_mut(parent_frame, child_frame)
            .insert(entry, cache_secs);
    }

    /// Register a transform that is valid at every instant.
    pub fn set_static_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
    ) {
        *self.edge_mut(parent_frame, child_frame) = Edge::Static(transform);
    }

    /// Whether `frame` has appeared on any edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.neighbours.contains_key(frame)
    }

    /// Compute the pose of `source_frame` expressed in `target_frame`
    /// (i.e. the transform mapping points in `source_frame` into
    /// `target_frame`).
    ///
    /// The returned stamp is the oldest of the edge stamps used, or `0.0`
    /// when the whole chain is static.
    pub fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<StampedTransform, LookupError> {
        for frame in [target_frame, source_frame] {
            if !self.has_frame(frame) {
                return Err(LookupError::Unavailable(frame.to_string()));
            }
        }

        let path = self
            .path(target_frame, source_frame)
            .ok_or_else(|| LookupError::Disconnected {
                from: target_frame.to_string(),
                to: source_frame.to_string(),
            })?;

        let mut accumulated = Transform3D::identity();
        let mut stamp: Option<f64> = None;
        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let (step, edge_stamp) = match self.edges.get(&(from.clone(), to.clone())) {
                Some(edge) => edge.sample(time)?,
                None => {
                    // Walking child → parent.
                    let edge = self
                        .edges
                        .get(&(to.clone(), from.clone()))
                        .ok_or_else(|| LookupError::Disconnected {
                            from: from.clone(),
                            to: to.clone(),
                        })?;
                    let (t, s) = edge.sample(time)?;
                    (t.inverse(), s)
                }
            };
            accumulated = accumulated.compose(step);
            if let Some(s) = edge_stamp {
                stamp = Some(stamp.map_or(s, |cur| cur.min(s)));
            }
        }

        Ok(StampedTransform {
            transform: accumulated,
            stamp: stamp.unwrap_or(0.0),
        })
    }

    fn edge_mut(&mut self, parent: &str, child: &str) -> &mut Edge {
        self.neighbours
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.neighbours
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.edges
            .entry((parent.to_string(), child.to_string()))
            .or_insert_with(|| Edge::Dynamic(VecDeque::new()))
    }

    /// Shortest frame path from `start` to `goal` (inclusive) via BFS.
    fn path(&self, start: &str, goal: &str) -> Option<Vec<String>> {
        if start == goal {
            return Some(vec![start.to_string()]);
        }
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut came_from: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back(start.to_string());
        visited.insert(start.to_string());

        while let Some(current) = queue.pop_front() {
            let Some(neighbours) = self.neighbours.get(&current) else {
                continue;
            };
            for next in neighbours {
                if !visited.insert(next.clone()) {
                    continue;
                }
                came_from.insert(next.clone(), current.clone());
                if next == goal {
                    let mut path = vec![next.clone()];
                    let mut node = next.clone();
                    while let Some(prev) = came_from.get(&node) {
                        path.push(prev.clone());
                        node = prev.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next.clone());
            }
        }
        None
    }
}

/// Retry [`TfBuffer::lookup`] on a shared buffer until it succeeds or
/// `timeout` elapses.  A zero timeout makes exactly one attempt.
///
/// Returns the error of the final attempt on timeout.
pub fn lookup_with_timeout(
    buffer: &RwLock<TfBuffer>,
    target_frame: &str,
    source_frame: &str,
    time: LookupTime,
    timeout: Duration,
) -> Result<StampedTransform, LookupError> {
    let deadline = Instant::now() + timeout;
    loop {
        let result = match buffer.read() {
            Ok(guard) => guard.lookup(target_frame, source_frame, time),
            Err(poisoned) => poisoned
                .into_inner()
                .lookup(target_frame, source_frame, time),
        };
        let err = match result {
            Ok(t) => return Ok(t),
            Err(e) => e,
        };
        let now = Instant::now();
        if now >= deadline {
            return Err(err);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn translation(x: f64, y: f64, z: f64) -> Transform3D {
        Transform3D::from_translation(Vec3::new(x, y, z))
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let r = Quaternion::from_yaw(FRAC_PI_2).rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-9);
    }

    #[test]
    fn nlerp_halfway_between_yaws() {
        let q = Quaternion::identity().nlerp(Quaternion::from_yaw(FRAC_PI_2), 0.5);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((r.x - expected).abs() < 1e-9);
        assert!((r.y - expected).abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_compose_translations_add() {
        let composed = translation(1.0, 0.0, 0.0).compose(translation(2.0, 0.0, 0.0));
        assert!((composed.translation.x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn transform_inverse_undoes_transform() {
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), Quaternion::from_yaw(0.7));
        let round = t.compose(t.inverse());
        assert!(round.translation.norm() < 1e-9);
        let p = Vec3::new(0.3, 0.4, 0.5);
        let back = t.inverse().apply(t.apply(p));
        assert!((back - p).norm() < 1e-9);
    }

    // ── TfBuffer ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let mut tf = TfBuffer::new();
        tf.set_static_transform("world", "base_link", translation(1.0, 0.0, 0.0));
        let t = tf.lookup("world", "world", LookupTime::Latest).unwrap();
        assert_eq!(t.transform, Transform3D::identity());
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfBuffer::new();
        tf.set_static_transform("world", "base_link", translation(1.0, 0.0, 0.0));
        tf.set_transform("base_link", "l_scoop_tip", translation(0.5, 0.0, 0.0), 2.0);

        let t = tf.lookup("world", "l_scoop_tip", LookupTime::Latest).unwrap();
        assert!((t.transform.translation.x - 1.5).abs() < 1e-12);
        assert!((t.stamp - 2.0).abs() < 1e-12);
    }

    #[test]
    fn lookup_walks_edges_backwards() {
        let mut tf = TfBuffer::new();
        tf.set_static_transform("world", "base_link", translation(1.0, 0.0, 0.0));
        let t = tf.lookup("base_link", "world", LookupTime::Latest).unwrap();
        assert!((t.transform.translation.x + 1.0).abs() < 1e-12);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base_link at world origin, yawed 90°; tip 1 m along base_link +X.
        let mut tf = TfBuffer::new();
        tf.set_static_transform(
            "world",
            "base_link",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(FRAC_PI_2)),
        );
        tf.set_transform("base_link", "tip", translation(1.0, 0.0, 0.0), 0.0);

        let t = tf.lookup("world", "tip", LookupTime::Latest).unwrap();
        let p = t.transform.translation;
        assert!(p.x.abs() < 1e-9, "x={}", p.x);
        assert!((p.y - 1.0).abs() < 1e-9, "y={}", p.y);
    }

    #[test]
    fn unknown_frame_is_unavailable() {
        let mut tf = TfBuffer::new();
        tf.set_static_transform("world", "base_link", translation(1.0, 0.0, 0.0));
        let err = tf.lookup("base_link", "ghost", LookupTime::Latest).unwrap_err();
        assert_eq!(err, LookupError::Unavailable("ghost".into()));
    }

    #[test]
    fn separate_trees_are_disconnected() {
        let mut tf = TfBuffer::new();
        tf.set_static_transform("world", "base_link", translation(1.0, 0.0, 0.0));
        tf.set_static_transform("map", "camera", translation(0.0, 1.0, 0.0));
        let err = tf.lookup("base_link", "camera", LookupTime::Latest).unwrap_err();
        assert!(matches!(err, LookupError::Disconnected { .. }));
    }

    #[test]
    fn lookup_at_interpolates_between_samples() {
        let mut tf = TfBuffer::new();
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 1.0), 1.0);
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 0.0), 2.0);

        let t = tf.lookup("base_link", "tip", LookupTime::At(1.25)).unwrap();
        assert!((t.transform.translation.z - 0.75).abs() < 1e-12);
        assert!((t.stamp - 1.25).abs() < 1e-12);
    }

    #[test]
    fn lookup_outside_history_is_extrapolation() {
        let mut tf = TfBuffer::new();
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 1.0), 1.0);
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 0.0), 2.0);

        let err = tf.lookup("base_link", "tip", LookupTime::At(2.5)).unwrap_err();
        assert_eq!(
            err,
            LookupError::Extrapolation {
                requested: 2.5,
                earliest: 1.0,
                latest: 2.0
            }
        );
    }

    #[test]
    fn history_older_than_cache_is_evicted() {
        let mut tf = TfBuffer::with_cache_duration(1.0);
        for i in 0..5 {
            tf.set_transform("base_link", "tip", translation(0.0, 0.0, i as f64), i as f64);
        }
        assert!(tf.lookup("base_link", "tip", LookupTime::At(3.0)).is_ok());
        assert!(matches!(
            tf.lookup("base_link", "tip", LookupTime::At(1.0)),
            Err(LookupError::Extrapolation { .. })
        ));
    }

    #[test]
    fn out_of_order_samples_are_sorted() {
        let mut tf = TfBuffer::new();
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 2.0), 2.0);
        tf.set_transform("base_link", "tip", translation(0.0, 0.0, 1.0), 1.0);
        let latest = tf.lookup("base_link", "tip", LookupTime::Latest).unwrap();
        assert!((latest.stamp - 2.0).abs() < 1e-12);
        assert!((latest.transform.translation.z - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_timeout_makes_single_attempt() {
        let buffer = RwLock::new(TfBuffer::new());
        let started = Instant::now();
        let err =
            lookup_with_timeout(&buffer, "base_link", "tip", LookupTime::Latest, Duration::ZERO)
                .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn bounded_wait_sees_late_publisher() {
        let buffer = Arc::new(RwLock::new(TfBuffer::new()));
        let writer = buffer.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer
                .write()
                .unwrap()
                .set_transform("base_link", "tip", translation(0.0, 0.0, 0.3), 1.0);
        });

        let t = lookup_with_timeout(
            &buffer,
            "base_link",
            "tip",
            LookupTime::Latest,
            Duration::from_secs(2),
        )
        .unwrap();
        assert!((t.transform.translation.z - 0.3).abs() < 1e-12);
        handle.join().unwrap();
    }
}
