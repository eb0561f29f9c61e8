//! Goal-based motion requests.
//!
//! A [`MotionClient`] accepts a target point and performs a guarded move
//! toward it, reporting where the tip ended up and whether the ground got in
//! the way.  [`SimMotionClient`] serves requests with a fresh simulated arm
//! and a ground detector wired up for the configured [`Strategy`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::info;
use touchdown_middleware::EventBus;
use touchdown_perception::{
    FrameLookup, GroundDetector, LinkStateSource, PoseSource, SharedTfBuffer, TfBuffer,
    TfLookupSource,
};
use touchdown_types::{DetectorConfig, Point, TouchdownError};

use crate::config::{FrameConfig, SimConfig, Strategy};
use crate::descent::{DescentOutcome, GuardedDescent};
use crate::sim::SimulatedArm;

/// Result of one guarded move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionResult {
    /// Ground position on contact, otherwise where the tip stopped.
    pub final_position: Point,
    pub ground_detected: bool,
    /// Control steps the move took.
    pub ticks: u32,
}

impl From<DescentOutcome> for MotionResult {
    fn from(outcome: DescentOutcome) -> Self {
        match outcome {
            DescentOutcome::Contact {
                ground_position,
                ticks,
            } => MotionResult {
                final_position: ground_position,
                ground_detected: true,
                ticks,
            },
            DescentOutcome::ReachedTarget { position, ticks } => MotionResult {
                final_position: position,
                ground_detected: false,
                ticks,
            },
        }
    }
}

/// Anything that can carry out a guarded move to a point.
pub trait MotionClient {
    fn execute(&mut self, target: Point) -> Result<MotionResult, TouchdownError>;
}

/// Serves guarded moves against [`SimulatedArm`].
#[derive(Debug, Clone)]
pub struct SimMotionClient {
    strategy: Strategy,
    detector: DetectorConfig,
    frames: FrameConfig,
    sim: SimConfig,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
}

impl SimMotionClient {
    pub fn new(
        strategy: Strategy,
        detector: DetectorConfig,
        frames: FrameConfig,
        sim: SimConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            strategy,
            detector,
            frames,
            sim,
            bus,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Pose source for the configured strategy.  Must be built before the
    /// arm publishes anything so the push source does not miss snapshots.
    fn pose_source(&self, tf: &SharedTfBuffer) -> Box<dyn PoseSource> {
        match self.strategy {
            Strategy::Push => Box::new(
                LinkStateSource::new(&self.bus, self.frames.tip_link.clone()).with_reference_lookup(
                    FrameLookup::new(
                        Arc::clone(tf),
                        self.frames.reference_frame.clone(),
                        self.frames.tip_frame.clone(),
                        self.frames.ground_lookup_timeout(),
                    ),
                ),
            ),
            Strategy::Pull => Box::new(TfLookupSource::new(FrameLookup::new(
                Arc::clone(tf),
                self.frames.reference_frame.clone(),
                self.frames.tip_frame.clone(),
                self.frames.lookup_timeout(),
            ))),
        }
    }
}

impl MotionClient for SimMotionClient {
    fn execute(&mut self, target: Point) -> Result<MotionResult, TouchdownError> {
        if !target.is_finite() {
            return Err(TouchdownError::Motion(format!("target {target} is not finite")));
        }
        info!(strategy = %self.strategy, %target, "guarded move requested");

        let tf = TfBuffer::shared();
        let mut detector = GroundDetector::with_config(self.pose_source(&tf), self.detector);
        let mut arm =
            SimulatedArm::new(self.sim.clone(), self.frames.clone(), self.bus.clone(), tf)?;

        let descent = GuardedDescent::new(self.bus.clone(), self.sim.max_ticks)
            .with_shutdown(Arc::clone(&self.shutdown));
        let outcome = descent.run(&mut arm, &mut detector, target)?;
        Ok(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use touchdown_middleware::Topic;
    use touchdown_types::{EventPayload, Vec3};

    fn client(strategy: Strategy, sim: SimConfig) -> SimMotionClient {
        SimMotionClient::new(
            strategy,
            DetectorConfig::default(),
            FrameConfig::default(),
            sim,
            EventBus::default(),
        )
    }

    fn below_ground() -> Point {
        let start = SimConfig::default().start;
        Vec3::new(start.x, start.y, start.z - 0.5)
    }

    #[test]
    fn both_strategies_find_the_ground() {
        for strategy in [Strategy::Push, Strategy::Pull] {
            let mut c = client(strategy, SimConfig::default());
            let result = c.execute(below_ground()).unwrap();
            assert!(result.ground_detected, "{strategy} missed the ground");
            assert!(
                (result.final_position.z - 0.3).abs() < 0.01,
                "{strategy}: ground at {}",
                result.final_position
            );
            assert!((result.final_position.y - 0.8).abs() < 0.01);
            // 0.35 m at 5 mm per tick, plus a handful of ticks to notice.
            assert!(result.ticks > 70 && result.ticks < 85, "{strategy}: {} ticks", result.ticks);
        }
    }

    #[test]
    fn noiseless_runs_agree_across_strategies() {
        let sim = SimConfig {
            noise_std: 0.0,
            ..SimConfig::default()
        };
        let push = client(Strategy::Push, sim.clone()).execute(below_ground()).unwrap();
        let pull = client(Strategy::Pull, sim).execute(below_ground()).unwrap();
        assert_eq!(push.ticks, pull.ticks);
        assert!((push.final_position - pull.final_position).norm() < 1e-9);
    }

    #[test]
    fn target_above_ground_is_reached() {
        let sim = SimConfig {
            noise_std: 0.0,
            ..SimConfig::default()
        };
        let target = Vec3::new(1.5, 0.8, 0.45);
        let result = client(Strategy::Pull, sim).execute(target).unwrap();
        assert!(!result.ground_detected);
        assert_eq!(result.final_position, target);
    }

    #[test]
    fn contact_is_announced_on_alerts() {
        let mut c = client(Strategy::Pull, SimConfig::default());
        let mut alerts = c.bus.subscribe_to(Topic::Alerts);
        let result = c.execute(below_ground()).unwrap();
        match alerts.try_recv().unwrap().payload {
            EventPayload::ContactDetected { position, .. } => {
                assert_eq!(position, result.final_position)
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[test]
    fn shutdown_aborts_the_move() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut c = client(Strategy::Push, SimConfig::default()).with_shutdown(Arc::clone(&flag));
        let err = c.execute(below_ground()).unwrap_err();
        assert!(matches!(err, TouchdownError::Aborted(_)));
        flag.store(false, Ordering::SeqCst);
        assert!(c.execute(below_ground()).is_ok());
    }

    #[test]
    fn rejects_non_finite_target() {
        let mut c = client(Strategy::Pull, SimConfig::default());
        let err = c.execute(Vec3::new(f64::NAN, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, TouchdownError::Motion(_)));
    }
}
