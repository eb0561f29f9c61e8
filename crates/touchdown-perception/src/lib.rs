//! `touchdown-perception` – ground-contact detection.
//!
//! Turns a noisy stream of manipulator tip positions into a single
//! "we touched the ground" decision.
//!
//! # Modules
//!
//! - [`window`] – [`SlidingWindow`][window::SlidingWindow]: fixed-capacity
//!   FIFO buffer with a pluggable summary (e.g. component-wise mean).
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer]: graph of named
//!   reference frames with stamped transforms and bounded-wait lookups.
//! - [`source`] – [`PoseSource`][source::PoseSource]: push (link-state
//!   stream) and pull (frame lookup) strategies for obtaining tip positions.
//! - [`detector`] – [`GroundDetector`][detector::GroundDetector]: baseline /
//!   divergence detection over the velocity window, with an explicit latch.

pub mod detector;
pub mod source;
pub mod transform;
pub mod window;

pub use detector::{DetectionState, GroundDetector};
pub use source::{
    Acquisition, FrameLookup, LinkStateSource, PoseSource, ScriptedSource, TfLookupSource,
};
pub use transform::{LookupTime, SharedTfBuffer, StampedTransform, TfBuffer, Transform3D};
pub use window::SlidingWindow;
