// src/lib.rs - Control core of a gantry chessboard
//!
//! A magnet carriage under the board drags pieces between cells. The crate
//! models the board, resolves symbolic moves, plans gantry paths, queues them
//! and counts stepper pulses from a timer tick.

pub mod board;
pub mod chessboard;
pub mod config;
pub mod hardware;
pub mod motion;
pub mod queue;

pub use board::{BoardMatrix, Indication, Piece, PieceKind, Player};
pub use chessboard::{BoardController, BoardError, BoardReport, ControllerSettings, ControllerState, LogSink};
pub use config::{Config, ConfigError, load_config};
pub use hardware::{Axis, DigitalIo, PulseTimer};
pub use motion::{MotionCommand, MotionPlanner, PieceMove, StepperDriver};
pub use queue::{BoundedPoolQueue, QueueError};
