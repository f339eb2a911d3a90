// src/hardware/mod.rs - Collaborator traits for the step timer and digital I/O
//!
//! The core never touches pins or timer registers directly. It talks to the
//! hardware through the two traits below, which a board support layer (or the
//! simulator in [`simulated`]) implements. Both are shared between the main
//! loop and the tick context, so every method takes `&self`.

pub mod simulated;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// Periodic timer shared by both axes. Each overflow emits one step pulse on
/// every enabled axis and invokes the driver's tick handler.
pub trait PulseTimer: Send + Sync {
    /// Programs the overflow period. Does not start the timer.
    fn set_period(&self, micros: u32);
    /// Halts the timer and therefore every pulse output.
    fn stop(&self);
    /// Enables pulse output on `axis`; resumes the timer if it was stopped.
    fn start_axis_pulses(&self, axis: Axis);
    fn stop_axis_pulses(&self, axis: Axis);
}

pub trait DigitalIo: Send + Sync {
    /// `negative` selects the direction of decreasing coordinates.
    fn set_direction(&self, axis: Axis, negative: bool);
    /// True while the carriage presses the home switch of `axis`.
    fn read_limit_switch(&self, axis: Axis) -> bool;
    fn set_magnet(&self, engaged: bool);
}
