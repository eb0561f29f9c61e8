//! Guarded descent: drive the arm toward a target and stop it the moment the
//! ground detector latches.
//!
//! One iteration of the loop advances the arm by a single step and then asks
//! the detector for its verdict.  The loop ends on contact, when the arm
//! reaches its target, when the tick budget runs out, or when the shutdown
//! flag is raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument, warn};
use touchdown_middleware::{EventBus, Topic};
use touchdown_perception::{GroundDetector, PoseSource};
use touchdown_types::{Event, EventPayload, Point, TouchdownError};

const DESCENT_SOURCE: &str = "touchdown-runtime::descent";

/// What the arm reports after one motion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmStatus {
    /// Still travelling toward the target.
    Moving,
    /// Something is in the way; the commanded motion is not being followed.
    Blocked,
    /// The tip is at the commanded target (or there is no target).
    ReachedTarget,
    /// The arm was halted.
    Stopped,
}

/// Minimal control surface a guarded descent needs from an arm.
pub trait ArmDriver {
    /// Command a straight-line move toward `target`.
    fn command(&mut self, target: Point);

    /// Execute one control step.
    fn advance(&mut self) -> Result<ArmStatus, TouchdownError>;

    /// Halt immediately.  Further calls to `advance` report
    /// [`ArmStatus::Stopped`].
    fn stop(&mut self);

    /// Current tip position.
    fn position(&self) -> Point;
}

/// How a descent that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescentOutcome {
    /// The detector latched; `ground_position` is where the tip was.
    Contact { ground_position: Point, ticks: u32 },
    /// The arm got to its target without meeting the ground.
    ReachedTarget { position: Point, ticks: u32 },
}

impl DescentOutcome {
    pub fn ticks(&self) -> u32 {
        match self {
            DescentOutcome::Contact { ticks, .. } | DescentOutcome::ReachedTarget { ticks, .. } => {
                *ticks
            }
        }
    }
}

/// Runs guarded descents and announces contacts on [`Topic::Alerts`].
#[derive(Debug, Clone)]
pub struct GuardedDescent {
    bus: EventBus,
    max_ticks: u32,
    shutdown: Arc<AtomicBool>,
}

impl GuardedDescent {
    pub fn new(bus: EventBus, max_ticks: u32) -> Self {
        Self {
            bus,
            max_ticks,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag (e.g. a Ctrl-C handler).
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Move `arm` toward `target` until `detector` reports contact.
    ///
    /// The detector is reset first so a detector reused across descents
    /// starts from a clean slate.
    ///
    /// # Errors
    ///
    /// * [`TouchdownError::Aborted`] – shutdown was requested, the arm was
    ///   stopped by someone else, or `max_ticks` elapsed without an outcome.
    /// * Any error returned by [`ArmDriver::advance`].
    #[instrument(skip_all, fields(target = %target, max_ticks = self.max_ticks))]
    pub fn run<A, S>(
        &self,
        arm: &mut A,
        detector: &mut GroundDetector<S>,
        target: Point,
    ) -> Result<DescentOutcome, TouchdownError>
    where
        A: ArmDriver,
        S: PoseSource,
    {
        detector.reset();
        arm.command(target);
        info!("guarded descent started");

        for tick in 1..=self.max_ticks {
            if self.shutdown.load(Ordering::SeqCst) {
                arm.stop();
                warn!(tick, "shutdown requested, descent aborted");
                return Err(TouchdownError::Aborted("shutdown requested".to_string()));
            }

            let status = arm.advance()?;

            if detector.detect() {
                arm.stop();
                let ground_position = detector.ground_position().ok_or_else(|| {
                    TouchdownError::Motion("contact latched without a tip position".to_string())
                })?;
                let stamp = detector.last_sample().map(|s| s.stamp).unwrap_or_default();
                info!(tick, %ground_position, "ground found, arm stopped");
                self.announce_contact(ground_position, stamp);
                return Ok(DescentOutcome::Contact {
                    ground_position,
                    ticks: tick,
                });
            }

            match status {
                ArmStatus::ReachedTarget => {
                    let position = arm.position();
                    info!(tick, %position, "target reached without contact");
                    return Ok(DescentOutcome::ReachedTarget {
                        position,
                        ticks: tick,
                    });
                }
                ArmStatus::Stopped => {
                    return Err(TouchdownError::Aborted(
                        "arm stopped before contact".to_string(),
                    ));
                }
                ArmStatus::Moving | ArmStatus::Blocked => {}
            }
        }

        arm.stop();
        warn!(max_ticks = self.max_ticks, "tick budget exhausted");
        Err(TouchdownError::Aborted(format!(
            "no outcome within {} ticks",
            self.max_ticks
        )))
    }

    fn announce_contact(&self, position: Point, stamp: f64) {
        let event = Event::new(
            DESCENT_SOURCE,
            EventPayload::ContactDetected { position, stamp },
        );
        if let Err(e) = self.bus.publish_to(Topic::Alerts, event) {
            warn!(error = %e, "failed to publish contact alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchdown_perception::ScriptedSource;
    use touchdown_types::{PoseSample, Vec3};

    #[derive(Default)]
    struct FakeArm {
        target: Option<Point>,
        ticks: u32,
        reach_after: Option<u32>,
        stopped: bool,
    }

    impl ArmDriver for FakeArm {
        fn command(&mut self, target: Point) {
            self.target = Some(target);
        }

        fn advance(&mut self) -> Result<ArmStatus, TouchdownError> {
            if self.stopped {
                return Ok(ArmStatus::Stopped);
            }
            self.ticks += 1;
            match self.reach_after {
                Some(n) if self.ticks >= n => Ok(ArmStatus::ReachedTarget),
                _ => Ok(ArmStatus::Moving),
            }
        }

        fn stop(&mut self) {
            self.stopped = true;
        }

        fn position(&self) -> Point {
            self.target.unwrap_or_default()
        }
    }

    /// Straight down for 12 s, then sliding along +X.
    fn descend_then_slide() -> ScriptedSource {
        ScriptedSource::from_samples((0..40u32).map(|i| {
            let x = i.saturating_sub(12) as f64;
            let z = -(i.min(12) as f64);
            PoseSample::new(Vec3::new(x, 0.0, z), i as f64)
        }))
    }

    #[test]
    fn stops_arm_on_contact_and_reports_position() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let descent = GuardedDescent::new(bus, 100);
        let mut arm = FakeArm::default();
        let mut detector = GroundDetector::new(descend_then_slide());

        let outcome = descent
            .run(&mut arm, &mut detector, Vec3::new(0.0, 0.0, -50.0))
            .unwrap();

        assert_eq!(
            outcome,
            DescentOutcome::Contact {
                ground_position: Vec3::new(2.0, 0.0, -12.0),
                ticks: 15,
            }
        );
        assert!(arm.stopped);
        assert_eq!(arm.target, Some(Vec3::new(0.0, 0.0, -50.0)));

        let event = alerts.try_recv().expect("contact alert");
        match event.payload {
            EventPayload::ContactDetected { position, stamp } => {
                assert_eq!(position, Vec3::new(2.0, 0.0, -12.0));
                assert!((stamp - 14.0).abs() < 1e-12);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn reaching_target_is_not_an_error() {
        let descent = GuardedDescent::new(EventBus::default(), 100);
        let mut arm = FakeArm {
            reach_after: Some(3),
            ..Default::default()
        };
        let mut detector = GroundDetector::new(descend_then_slide());
        let target = Vec3::new(0.0, 0.0, -3.0);

        let outcome = descent.run(&mut arm, &mut detector, target).unwrap();
        assert_eq!(
            outcome,
            DescentOutcome::ReachedTarget {
                position: target,
                ticks: 3
            }
        );
        assert_eq!(outcome.ticks(), 3);
        assert!(!arm.stopped);
    }

    #[test]
    fn tick_budget_exhaustion_aborts() {
        let descent = GuardedDescent::new(EventBus::default(), 4);
        let mut arm = FakeArm::default();
        let mut detector = GroundDetector::new(descend_then_slide());

        let err = descent
            .run(&mut arm, &mut detector, Vec3::zero())
            .unwrap_err();
        assert!(matches!(err, TouchdownError::Aborted(_)));
        assert!(arm.stopped);
        assert_eq!(arm.ticks, 4);
    }

    #[test]
    fn shutdown_flag_aborts_before_moving() {
        let descent = GuardedDescent::new(EventBus::default(), 100);
        descent.shutdown_flag().store(true, Ordering::SeqCst);
        let mut arm = FakeArm::default();
        let mut detector = GroundDetector::new(descend_then_slide());

        let err = descent
            .run(&mut arm, &mut detector, Vec3::zero())
            .unwrap_err();
        assert!(matches!(err, TouchdownError::Aborted(ref m) if m.contains("shutdown")));
        assert_eq!(arm.ticks, 0);
        assert!(arm.stopped);
    }

    #[test]
    fn externally_stopped_arm_aborts() {
        let descent = GuardedDescent::new(EventBus::default(), 100);
        let mut arm = FakeArm {
            stopped: true,
            ..Default::default()
        };
        let mut detector = GroundDetector::new(ScriptedSource::new());

        let err = descent
            .run(&mut arm, &mut detector, Vec3::zero())
            .unwrap_err();
        assert!(matches!(err, TouchdownError::Aborted(_)));
    }

    #[test]
    fn detector_is_reset_between_runs() {
        let descent = GuardedDescent::new(EventBus::default(), 100);
        let mut detector = GroundDetector::new(descend_then_slide());
        descent
            .run(&mut FakeArm::default(), &mut detector, Vec3::zero())
            .unwrap();
        assert!(detector.is_detected());

        // Feed a fresh descent through the same detector.
        *detector.source_mut() = descend_then_slide();
        let outcome = descent
            .run(&mut FakeArm::default(), &mut detector, Vec3::zero())
            .unwrap();
        assert_eq!(outcome.ticks(), 15);
    }
}
