//! `touchdown-runtime` – guarded motion on top of the ground detector.
//!
//! # Modules
//!
//! - [`descent`] – [`GuardedDescent`][descent::GuardedDescent]: steps an
//!   [`ArmDriver`][descent::ArmDriver] toward a target and stops it as soon
//!   as the [`GroundDetector`][touchdown_perception::GroundDetector] latches,
//!   announcing the contact on the alerts topic.
//! - [`motion`] – [`MotionClient`][motion::MotionClient] and
//!   [`SimMotionClient`][motion::SimMotionClient]: goal-style "move to this
//!   point, tell me where the ground was" requests.
//! - [`sim`] – [`SimulatedArm`][sim::SimulatedArm]: a kinematic arm that
//!   publishes link states and TF the way the real lander does.
//! - [`config`] – strategy, frame and simulator settings.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging with optional OTLP span export.

pub mod config;
pub mod descent;
pub mod motion;
pub mod sim;
pub mod telemetry;

pub use config::{FrameConfig, SimConfig, Strategy};
pub use descent::{ArmDriver, ArmStatus, DescentOutcome, GuardedDescent};
pub use motion::{MotionClient, MotionResult, SimMotionClient};
pub use sim::SimulatedArm;
