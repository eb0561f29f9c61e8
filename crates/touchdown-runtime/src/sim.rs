//! Kinematic stand-in for the lander arm.
//!
//! [`SimulatedArm`] moves the scoop tip in a straight line toward the
//! commanded target at constant speed.  When the tip would pass through the
//! ground plane it is clamped onto it and from then on only creeps along +X
//! at `slip_speed`, the way a scoop drags once it is pressed into regolith.
//!
//! Every step publishes the observed (optionally noisy) pose twice:
//!
//! * a [`PoseSnapshot`] on [`Topic::LinkStates`](touchdown_middleware::Topic)
//!   with world-frame link positions, for push-based detection;
//! * a stamped `reference_frame → tip_frame` transform in the shared TF
//!   buffer, for pull-based detection.
//!
//! Time is simulated: each step advances the clock by `tick_s`, so stamps
//! are deterministic and independent of the wall clock.

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};
use touchdown_middleware::EventBus;
use touchdown_perception::{SharedTfBuffer, Transform3D};
use touchdown_types::{Point, PoseSnapshot, TouchdownError, Vec3};

use crate::config::{FrameConfig, SimConfig};
use crate::descent::{ArmDriver, ArmStatus};

/// Root of the simulated TF tree.
pub const WORLD_FRAME: &str = "world";
/// Link name of the arm base in link-state snapshots.
pub const BASE_LINK: &str = "lander::base_link";

const SIM_SOURCE: &str = "touchdown-runtime::sim";

pub struct SimulatedArm {
    config: SimConfig,
    frames: FrameConfig,
    bus: EventBus,
    tf: SharedTfBuffer,
    position: Vec3,
    target: Option<Vec3>,
    time: f64,
    grounded: bool,
    stopped: bool,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
}

impl SimulatedArm {
    /// Build the arm at `config.start` and register the static
    /// `world → reference_frame` transform in `tf`.
    ///
    /// # Errors
    ///
    /// [`TouchdownError::Config`] when speed, tick or noise parameters are
    /// not usable.
    pub fn new(
        config: SimConfig,
        frames: FrameConfig,
        bus: EventBus,
        tf: SharedTfBuffer,
    ) -> Result<Self, TouchdownError> {
        if !(config.speed.is_finite() && config.speed > 0.0) {
            return Err(TouchdownError::Config(format!(
                "sim.speed must be positive, got {}",
                config.speed
            )));
        }
        if !(config.tick_s.is_finite() && config.tick_s > 0.0) {
            return Err(TouchdownError::Config(format!(
                "sim.tick_s must be positive, got {}",
                config.tick_s
            )));
        }
        let noise = if config.noise_std > 0.0 {
            Some(Normal::new(0.0, config.noise_std).map_err(|e| {
                TouchdownError::Config(format!("sim.noise_std: {e}"))
            })?)
        } else if config.noise_std == 0.0 {
            None
        } else {
            return Err(TouchdownError::Config(format!(
                "sim.noise_std must be >= 0, got {}",
                config.noise_std
            )));
        };

        {
            let mut buffer = tf
                .write()
                .map_err(|_| TouchdownError::Channel("TF buffer lock poisoned".to_string()))?;
            buffer.set_static_transform(
                WORLD_FRAME,
                &frames.reference_frame,
                Transform3D::from_translation(config.base_position),
            );
        }

        info!(
            start = %config.start,
            ground_z = config.ground_z,
            seed = config.seed,
            "simulated arm ready"
        );

        Ok(Self {
            position: config.start,
            grounded: config.start.z <= config.ground_z,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            frames,
            bus,
            tf,
            target: None,
            time: 0.0,
            stopped: false,
            noise,
        })
    }

    /// Simulated time of the last published pose.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Whether the tip is resting on the ground plane.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    fn step(&mut self) -> ArmStatus {
        if self.stopped {
            return ArmStatus::Stopped;
        }
        if self.grounded {
            self.position.x += self.config.slip_speed * self.config.tick_s;
            return ArmStatus::Blocked;
        }
        let Some(target) = self.target else {
            return ArmStatus::ReachedTarget;
        };

        let remaining = target - self.position;
        let distance = remaining.norm();
        let step = self.config.speed * self.config.tick_s;
        let mut next = if distance <= step {
            target
        } else {
            self.position + remaining * (step / distance)
        };

        if next.z < self.config.ground_z {
            next.z = self.config.ground_z;
            self.position = next;
            self.grounded = true;
            debug!(position = %next, "tip touched the ground plane");
            return ArmStatus::Blocked;
        }

        self.position = next;
        if next == target {
            ArmStatus::ReachedTarget
        } else {
            ArmStatus::Moving
        }
    }

    fn observe(&mut self) -> Vec3 {
        match &self.noise {
            Some(noise) => {
                let jitter = Vec3::new(
                    noise.sample(&mut self.rng),
                    noise.sample(&mut self.rng),
                    noise.sample(&mut self.rng),
                );
                self.position + jitter
            }
            None => self.position,
        }
    }

    fn publish(&mut self, observed: Vec3) -> Result<(), TouchdownError> {
        {
            let mut buffer = self
                .tf
                .write()
                .map_err(|_| TouchdownError::Channel("TF buffer lock poisoned".to_string()))?;
            buffer.set_transform(
                &self.frames.reference_frame,
                &self.frames.tip_frame,
                Transform3D::from_translation(observed),
                self.time,
            );
        }

        let base = self.config.base_position;
        let snapshot = PoseSnapshot::new(self.time)
            .with_link(BASE_LINK, base)
            .with_link(self.frames.tip_link.clone(), base + observed);
        self.bus.publish_link_states(SIM_SOURCE, snapshot)?;
        Ok(())
    }
}

impl ArmDriver for SimulatedArm {
    fn command(&mut self, target: Point) {
        if !target.is_finite() {
            warn!(%target, "ignoring non-finite target");
            return;
        }
        self.target = Some(target);
        self.stopped = false;
    }

    fn advance(&mut self) -> Result<ArmStatus, TouchdownError> {
        if self.config.realtime {
            std::thread::sleep(Duration::from_secs_f64(self.config.tick_s));
        }
        let status = self.step();
        self.time += self.config.tick_s;
        let observed = self.observe();
        self.publish(observed)?;
        Ok(status)
    }

    fn stop(&mut self) {
        if !self.stopped {
            debug!(position = %self.position, "arm stopped");
        }
        self.stopped = true;
    }

    fn position(&self) -> Point {
        self.position
    }
}
