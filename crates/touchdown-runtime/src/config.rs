//! Runtime configuration blocks shared by the simulator, the motion client
//! and the CLI config file.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use touchdown_types::{TouchdownError, Vec3};

/// Which pose-acquisition strategy the detector uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Consume link-state snapshots from the bus.
    Push,
    /// Look the tip frame up in the TF buffer on every `detect()`.
    #[default]
    Pull,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Push => write!(f, "push"),
            Strategy::Pull => write!(f, "pull"),
        }
    }
}

impl FromStr for Strategy {
    type Err = TouchdownError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" | "link_states" => Ok(Strategy::Push),
            "pull" | "tf" => Ok(Strategy::Pull),
            other => Err(TouchdownError::Config(format!(
                "unknown strategy '{other}' (expected 'push' or 'pull')"
            ))),
        }
    }
}

/// Names of the frames and links the detector looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Frame the ground position is reported in.
    #[serde(default = "default_reference_frame")]
    pub reference_frame: String,
    /// TF frame of the manipulator tip.
    #[serde(default = "default_tip_frame")]
    pub tip_frame: String,
    /// Link name of the tip in link-state snapshots.
    #[serde(default = "default_tip_link")]
    pub tip_link: String,
    /// Bounded wait of the per-`detect()` lookup (pull strategy).
    #[serde(default)]
    pub lookup_timeout_ms: u64,
    /// Bounded wait of the ground-position lookup (push strategy).
    #[serde(default = "default_ground_lookup_timeout_ms")]
    pub ground_lookup_timeout_ms: u64,
}

fn default_reference_frame() -> String {
    "base_link".to_string()
}
fn default_tip_frame() -> String {
    "l_scoop_tip".to_string()
}
fn default_tip_link() -> String {
    "lander::l_scoop_tip".to_string()
}
fn default_ground_lookup_timeout_ms() -> u64 {
    10_000
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            reference_frame: default_reference_frame(),
            tip_frame: default_tip_frame(),
            tip_link: default_tip_link(),
            lookup_timeout_ms: 0,
            ground_lookup_timeout_ms: default_ground_lookup_timeout_ms(),
        }
    }
}

impl FrameConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn ground_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.ground_lookup_timeout_ms)
    }
}

/// Parameters of the simulated arm.  Positions are in the arm base frame
/// unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Where the tip starts.
    #[serde(default = "default_start")]
    pub start: Vec3,
    /// Position of the arm base in the world frame.
    #[serde(default)]
    pub base_position: Vec3,
    /// Height of the ground plane.
    #[serde(default = "default_ground_z")]
    pub ground_z: f64,
    /// Tip speed while moving toward the target (m/s).
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Simulated time per tick (s).
    #[serde(default = "default_tick_s")]
    pub tick_s: f64,
    /// Speed the tip drags along +X once it is on the ground (m/s).
    #[serde(default = "default_slip_speed")]
    pub slip_speed: f64,
    /// Standard deviation of the Gaussian noise added to observed positions.
    #[serde(default = "default_noise_std")]
    pub noise_std: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Give up after this many ticks.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
    /// Sleep `tick_s` of wall time per tick.
    #[serde(default)]
    pub realtime: bool,
}

fn default_start() -> Vec3 {
    Vec3::new(1.5, 0.8, 0.65)
}
fn default_ground_z() -> f64 {
    0.3
}
fn default_speed() -> f64 {
    0.05
}
fn default_tick_s() -> f64 {
    0.1
}
fn default_slip_speed() -> f64 {
    0.02
}
fn default_noise_std() -> f64 {
    0.0005
}
fn default_seed() -> u64 {
    7
}
fn default_max_ticks() -> u32 {
    1_000
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            base_position: Vec3::zero(),
            ground_z: default_ground_z(),
            speed: default_speed(),
            tick_s: default_tick_s(),
            slip_speed: default_slip_speed(),
            noise_std: default_noise_std(),
            seed: default_seed(),
            max_ticks: default_max_ticks(),
            realtime: false,
        }
    }
}
