// src/motion/mod.rs - Motion commands, piece moves, planner and stepper driver

pub mod planner;
pub mod stepper;

pub use planner::{MotionPlan, MotionPlanner, PathStrategy, PlanError, RehomePolicy};
pub use stepper::{DriverError, DriverSettings, StepperDriver};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One gantry motion, in motor steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionCommand {
    /// Absolute target instead of a displacement from the current position.
    pub absolute: bool,
    pub dx_steps: i32,
    pub dy_steps: i32,
    pub magnet_engaged: bool,
}

impl MotionCommand {
    pub fn relative(dx_steps: i32, dy_steps: i32, magnet_engaged: bool) -> Self {
        Self {
            absolute: false,
            dx_steps,
            dy_steps,
            magnet_engaged,
        }
    }

    pub fn goto(x_steps: i32, y_steps: i32, magnet_engaged: bool) -> Self {
        Self {
            absolute: true,
            dx_steps: x_steps,
            dy_steps: y_steps,
            magnet_engaged,
        }
    }

    /// Zero-displacement command that drops the magnet where the carriage is.
    pub fn release() -> Self {
        Self::relative(0, 0, false)
    }
}

/// A piece relocation in board-cell coordinates. Graveyard files (-2, -1, 8, 9)
/// are valid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceMove {
    pub source_x: i32,
    pub source_y: i32,
    pub dest_x: i32,
    pub dest_y: i32,
}

impl PieceMove {
    pub fn new(source_x: i32, source_y: i32, dest_x: i32, dest_y: i32) -> Self {
        Self {
            source_x,
            source_y,
            dest_x,
            dest_y,
        }
    }
}

impl fmt::Display for PieceMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.source_x, self.source_y, self.dest_x, self.dest_y
        )
    }
}
