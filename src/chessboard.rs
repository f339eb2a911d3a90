// src/chessboard.rs - Board controller: queues, board model and the drain loop
//!
//! `BoardController` is driven from the cooperative main loop. Callers queue
//! piece moves (by coordinates or symbolically) and raw gantry motions; each
//! call to [`BoardController::handle`] does at most one small step of work and
//! returns, so the loop stays free to poll the limit switches.
//!
//! The board model is updated when a piece move is planned, not when the
//! gantry has finished moving it. Until the motion queue drains, the model is
//! ahead of the carriage.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::board::{
    BoardMatrix, Indication, MoveResolver, OutOfGrid, Piece, Resolution, ResolveError, is_field, is_on_grid,
};
use crate::hardware::{Axis, DigitalIo};
use crate::motion::{
    DriverError, MotionCommand, MotionPlanner, PieceMove, PlanError, RehomePolicy, StepperDriver,
};
use crate::queue::{BoundedPoolQueue, QueueError, UsageStats};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
    #[error(transparent)]
    OffGrid(#[from] OutOfGrid),
    #[error("'{0}' is not a piece code")]
    UnknownPiece(char),
    #[error("{axis} limit switch never closed during homing")]
    Homing { axis: Axis },
}

/// Line-oriented sink for host-facing reports.
pub trait LogSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Forwards report lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::info!(target: "board_log", "{}", line);
    }
}

/// Keeps every line; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().iter().any(|l| l == line)
    }
}

impl LogSink for MemorySink {
    fn line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardReport {
    Ready,
    PieceMoveQueued(PieceMove),
    LocationEmpty,
    DestinationOccupied,
    WrongMove,
    /// A queued piece move could not be planned at execution time.
    MoveDropped,
    QueuesDrained,
    Matrix(String),
}

impl fmt::Display for BoardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardReport::Ready => write!(f, "[LOG] READY"),
            BoardReport::PieceMoveQueued(mv) => write!(f, "[LOG] MP {}", mv),
            BoardReport::LocationEmpty => write!(f, "[LOG] ERR_LOCATION_EMPTY"),
            BoardReport::DestinationOccupied => write!(f, "[LOG] ERR_DESTINATION_OCCUPIED"),
            BoardReport::WrongMove => write!(f, "[LOG] ERR_WRONG_MOVE"),
            BoardReport::MoveDropped => write!(f, "[LOG] ERR_MOVE_DROPPED"),
            BoardReport::QueuesDrained => write!(f, "[LOG] QE"),
            BoardReport::Matrix(line) => write!(f, "[LOG] {}", line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Driver idle and both queues empty.
    Idle,
    DrainingMotions,
    DrainingPieceMoves,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub steps_per_unit: i32,
    pub carry_speed: u32,
    pub travel_speed: u32,
    pub homing_speed: u32,
    /// Steps from the X switch to file 0; the Y switch sits on rank 0.
    pub working_offset_x: i32,
    pub seek_steps: i32,
    pub backoff_steps: i32,
    pub limit_switch_polling: bool,
    pub motion_capacity: usize,
    pub piece_move_capacity: usize,
    pub rehome: RehomePolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            steps_per_unit: 200,
            carry_speed: 100,
            travel_speed: 300,
            homing_speed: 100,
            working_offset_x: 430,
            seek_steps: 2000,
            backoff_steps: 25,
            limit_switch_polling: true,
            motion_capacity: 32,
            piece_move_capacity: 8,
            rehome: RehomePolicy::default(),
        }
    }
}

pub struct BoardController {
    board: BoardMatrix,
    motions: BoundedPoolQueue<MotionCommand>,
    piece_moves: BoundedPoolQueue<PieceMove>,
    planner: MotionPlanner,
    driver: Arc<StepperDriver>,
    io: Arc<dyn DigitalIo>,
    settings: ControllerSettings,
    /// Tracked carriage position in steps; cell (0, 0) is the origin.
    position: (i32, i32),
    state: ControllerState,
    logger: Option<Box<dyn LogSink>>,
}

impl BoardController {
    pub fn new(driver: Arc<StepperDriver>, io: Arc<dyn DigitalIo>, settings: ControllerSettings) -> Self {
        io.set_magnet(false);
        Self {
            board: BoardMatrix::new(),
            motions: BoundedPoolQueue::new(settings.motion_capacity),
            piece_moves: BoundedPoolQueue::new(settings.piece_move_capacity),
            planner: MotionPlanner::new(settings.steps_per_unit, settings.rehome),
            driver,
            io,
            settings,
            position: (0, 0),
            state: ControllerState::Idle,
            logger: None,
        }
    }

    /// Puts the pieces in their opening cells and announces readiness.
    pub fn begin(&mut self) {
        self.reset_matrix();
        self.position = (0, 0);
        self.state = ControllerState::Idle;
        self.report(BoardReport::Ready);
        tracing::info!("chessboard controller ready");
    }

    pub fn attach_logger(&mut self, logger: Box<dyn LogSink>) {
        self.logger = Some(logger);
    }

    pub fn reset_matrix(&mut self) {
        self.board.reset();
    }

    pub fn board(&self) -> &BoardMatrix {
        &self.board
    }

    /// Direct access for setting up positions. Moves already queued are not
    /// re-validated until they execute.
    pub fn board_mut(&mut self) -> &mut BoardMatrix {
        &mut self.board
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn driver(&self) -> &Arc<StepperDriver> {
        &self.driver
    }

    pub fn pending_motions(&self) -> usize {
        self.motions.count()
    }

    pub fn pending_piece_moves(&self) -> usize {
        self.piece_moves.count()
    }

    pub fn queue_stats(&self) -> UsageStats {
        self.motions.usage_stats()
    }

    pub fn piece_queue_stats(&self) -> UsageStats {
        self.piece_moves.usage_stats()
    }

    pub fn set_moving_speed(&self, speed: u32) -> Result<(), BoardError> {
        Ok(self.driver.set_speed(speed)?)
    }

    pub fn set_moving_microsteps(&self, microsteps: u32) -> Result<(), BoardError> {
        Ok(self.driver.set_microsteps(microsteps)?)
    }

    /// Queues a move between explicit cells. With `eliminate`, a piece found on
    /// the destination is first sent to its owner's graveyard.
    pub fn queue_piece_move_by_coordinates(
        &mut self,
        sx: i32,
        sy: i32,
        dx: i32,
        dy: i32,
        eliminate: bool,
    ) -> Result<(), BoardError> {
        if let Some((x, y)) = [(sx, sy), (dx, dy)].into_iter().find(|&(x, y)| !is_on_grid(x, y)) {
            tracing::warn!(sx, sy, dx, dy, "piece move off the grid");
            self.report(BoardReport::WrongMove);
            return Err(OutOfGrid { x, y }.into());
        }
        let capture = match self.board.get(dx, dy) {
            Some(taken) if eliminate => {
                let reserved = self.reserved_graveyard_slots();
                let (gx, gy) = MoveResolver::new(&self.board)
                    .with_reserved(&reserved)
                    .graveyard_slot(taken.player)
                    .ok_or(ResolveError::GraveyardFull {
                        player: taken.player,
                    })?;
                Some(PieceMove::new(dx, dy, gx, gy))
            }
            _ => None,
        };
        self.enqueue_piece_moves(capture, PieceMove::new(sx, sy, dx, dy))
    }

    /// Resolves which `piece_code` piece can reach `(dx, dy)` and queues the
    /// resulting move(s).
    pub fn queue_piece_move_by_type(
        &mut self,
        piece_code: char,
        dx: i32,
        dy: i32,
        indication: Indication,
    ) -> Result<Resolution, BoardError> {
        let Some(piece) = Piece::from_code(piece_code) else {
            self.report(BoardReport::WrongMove);
            return Err(BoardError::UnknownPiece(piece_code));
        };
        let reserved = self.reserved_graveyard_slots();
        let resolution = match MoveResolver::new(&self.board)
            .with_reserved(&reserved)
            .resolve(piece, dx, dy, indication)
        {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(piece = %piece_code, dx, dy, "move rejected: {}", e);
                self.report(BoardReport::WrongMove);
                return Err(e.into());
            }
        };
        self.enqueue_piece_moves(resolution.capture, resolution.primary)?;
        Ok(resolution)
    }

    /// Queues a gantry motion given in cells. `relative == false` makes it an
    /// absolute go-to.
    pub fn queue_raw_motion(
        &mut self,
        x_units: f32,
        y_units: f32,
        relative: bool,
        magnet: bool,
    ) -> Result<(), BoardError> {
        let x = self.planner.units_to_steps(x_units);
        let y = self.planner.units_to_steps(y_units);
        let command = if relative {
            MotionCommand::relative(x, y, magnet)
        } else {
            MotionCommand::goto(x, y, magnet)
        };
        self.motions.push(command)?;
        Ok(())
    }

    /// Queues a run into both switches followed by a return to cell (0, 0).
    /// The limit-switch polling in `handle` ends the run and fixes the tracked
    /// position.
    pub fn request_home(&mut self) -> Result<(), BoardError> {
        let commands = self.planner.home_commands();
        if self.motions.free() < commands.len() {
            return Err(QueueError::Full {
                capacity: self.motions.capacity(),
            }
            .into());
        }
        for command in commands {
            self.motions.push(command)?;
        }
        Ok(())
    }

    /// One scheduling step. Issues the next motion when the driver is idle,
    /// otherwise plans the next piece move once every motion has been issued.
    /// Always polls the limit switches afterwards.
    pub fn handle(&mut self) -> ControllerState {
        if !self.driver.is_moving_any() {
            if let Some(command) = self.motions.pop() {
                self.state = ControllerState::DrainingMotions;
                self.issue(command);
            } else if let Some(mv) = self.piece_moves.pop() {
                self.state = ControllerState::DrainingPieceMoves;
                self.execute_piece_move(mv);
            } else {
                self.state = ControllerState::Idle;
            }
        }

        if self.settings.limit_switch_polling {
            self.poll_limit_switches();
        }
        self.state
    }

    /// Calls `handle` until the driver is idle and both queues are empty.
    /// Needs the tick handler running in another context.
    pub fn run_until_idle(&mut self) {
        while self.handle() != ControllerState::Idle {
            std::thread::yield_now();
        }
    }

    /// Blocking homing routine: seek both switches, back off and re-approach
    /// slowly, then park X at file 0. Must not run while another context is
    /// draining the queues.
    pub fn go_home(&mut self) -> Result<(), BoardError> {
        tracing::info!("homing");
        self.io.set_magnet(false);
        self.driver.stop_all(false);

        for axis in Axis::ALL {
            if !self.io.read_limit_switch(axis) {
                self.driver.move_axis(axis, -self.settings.seek_steps);
            }
        }
        self.wait_for_axes(true);
        self.driver.stop_all(false);
        for axis in Axis::ALL {
            if !self.io.read_limit_switch(axis) {
                tracing::error!(%axis, "limit switch not reached");
                return Err(BoardError::Homing { axis });
            }
        }

        let old_speed = self.driver.speed();
        self.driver.set_speed(self.settings.homing_speed)?;
        let backoff = self.settings.backoff_steps;
        for axis in Axis::ALL {
            self.driver.move_axis(axis, backoff);
        }
        self.wait_for_axes(false);
        for axis in Axis::ALL {
            self.driver.move_axis(axis, -2 * backoff);
        }
        self.wait_for_axes(true);
        self.driver.stop_all(false);
        self.driver.set_speed(old_speed)?;

        self.driver.move_axis(Axis::X, self.settings.working_offset_x);
        self.wait_for_axes(false);

        self.position = (0, 0);
        self.planner.note_homed();
        tracing::info!("homing complete");
        Ok(())
    }

    pub fn render_matrix(&self) -> String {
        self.board.render()
    }

    pub fn snapshot_line(&self) -> String {
        self.board.snapshot_line()
    }

    /// Sends the one-line board snapshot to the attached logger.
    pub fn log_matrix(&self) {
        self.report(BoardReport::Matrix(self.board.snapshot_line()));
    }

    fn issue(&mut self, command: MotionCommand) {
        let speed = if command.magnet_engaged {
            self.settings.carry_speed
        } else {
            self.settings.travel_speed
        };
        if let Err(e) = self.driver.set_speed(speed) {
            tracing::warn!("keeping previous speed: {}", e);
        }
        self.io.set_magnet(command.magnet_engaged);

        let (mut move_x, mut move_y) = (command.dx_steps, command.dy_steps);
        if command.absolute {
            move_x -= self.position.0;
            move_y -= self.position.1;
        }
        tracing::debug!(
            ?command,
            move_x,
            move_y,
            current_x = self.position.0,
            current_y = self.position.1,
            "issuing motion"
        );

        self.driver.stop_all(false);
        self.driver.move_axis(Axis::X, move_x);
        self.driver.move_axis(Axis::Y, move_y);
        self.position.0 += move_x;
        self.position.1 += move_y;

        if self.motions.is_empty() {
            let stats = self.motions.usage_stats();
            tracing::info!(max = stats.max, avg = stats.avg, "motion queue drained");
            tracing::debug!("\n{}", self.board.render());
            if self.piece_moves.is_empty() {
                self.report(BoardReport::QueuesDrained);
            }
        }
    }

    fn execute_piece_move(&mut self, mv: PieceMove) {
        match self.planner.execute(&mut self.board, &mut self.motions, mv) {
            Ok(plan) => {
                tracing::info!(mv = %mv, commands = plan.len(), "piece move started");
            }
            Err(PlanError::EmptySource { .. }) => {
                tracing::warn!(mv = %mv, "source cell empty");
                self.report(BoardReport::LocationEmpty);
            }
            Err(PlanError::OccupiedDestination { .. }) => {
                tracing::warn!(mv = %mv, "destination cell occupied");
                self.report(BoardReport::DestinationOccupied);
            }
            Err(e) => {
                tracing::error!(mv = %mv, "piece move dropped: {}", e);
                self.report(BoardReport::MoveDropped);
            }
        }
    }

    fn poll_limit_switches(&mut self) {
        if self.io.read_limit_switch(Axis::X) && self.driver.left(Axis::X) < 0 {
            self.driver.stop_axis(Axis::X, false);
            self.position.0 = -self.settings.working_offset_x;
            tracing::info!("x stop");
        }
        if self.io.read_limit_switch(Axis::Y) && self.driver.left(Axis::Y) < 0 {
            self.driver.stop_axis(Axis::Y, false);
            self.position.1 = 0;
            tracing::info!("y stop");
        }
    }

    fn wait_for_axes(&self, stop_on_switch: bool) {
        while self.driver.is_moving_any() {
            if stop_on_switch {
                for axis in Axis::ALL {
                    if self.io.read_limit_switch(axis) {
                        self.driver.stop_axis(axis, false);
                    }
                }
            }
            std::thread::yield_now();
        }
    }

    fn enqueue_piece_moves(&mut self, capture: Option<PieceMove>, primary: PieceMove) -> Result<(), BoardError> {
        let needed = 1 + usize::from(capture.is_some());
        if self.piece_moves.free() < needed {
            tracing::warn!(needed, "piece-move queue full");
            return Err(QueueError::Full {
                capacity: self.piece_moves.capacity(),
            }
            .into());
        }
        for mv in capture.into_iter().chain(std::iter::once(primary)) {
            self.piece_moves.push(mv)?;
            self.report(BoardReport::PieceMoveQueued(mv));
        }
        Ok(())
    }

    // Graveyard cells targeted by queued moves that have not reached the board.
    fn reserved_graveyard_slots(&self) -> Vec<(i32, i32)> {
        self.piece_moves
            .iter()
            .filter(|mv| !is_field(mv.dest_x, mv.dest_y))
            .map(|mv| (mv.dest_x, mv.dest_y))
            .collect()
    }

    fn report(&self, report: BoardReport) {
        if let Some(logger) = &self.logger {
            logger.line(&report.to_string());
        }
    }
}
