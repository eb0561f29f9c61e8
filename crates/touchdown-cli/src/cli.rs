use std::path::PathBuf;

use clap::Parser;
use touchdown_runtime::Strategy;
use touchdown_types::{Point, Vec3};

use crate::config::Config;

/// Touchdown: lower the scoop until it finds the ground.
///
/// Runs a guarded move straight down from the start point against the
/// simulated arm and reports where contact was detected.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, allow_negative_numbers = true)]
pub struct Cli {
    /// Start X in the arm base frame [default: from config, 1.5].
    pub x: Option<f64>,
    /// Start Y in the arm base frame [default: from config, 0.8].
    pub y: Option<f64>,
    /// Start Z in the arm base frame [default: from config, 0.65].
    pub z: Option<f64>,

    /// How far below the start point to search for the ground (m).
    #[arg(short = 'd', long, default_value_t = 0.5)]
    pub search_distance: f64,

    /// Pose acquisition strategy: `push` (link states) or `pull` (TF).
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Config file to use instead of `~/.touchdown/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration back to the config file.
    #[arg(long, default_value_t = false)]
    pub save_config: bool,

    /// Pace the simulation in wall-clock time.
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Fold command-line overrides into `cfg`.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy;
        }
        if let Some(x) = self.x {
            cfg.sim.start.x = x;
        }
        if let Some(y) = self.y {
            cfg.sim.start.y = y;
        }
        if let Some(z) = self.z {
            cfg.sim.start.z = z;
        }
        if self.realtime {
            cfg.sim.realtime = true;
        }
    }

    /// End point of the guarded move for a descent starting at `start`.
    pub fn target(&self, start: Point) -> Point {
        start - Vec3::new(0.0, 0.0, self.search_distance.abs())
    }
}
