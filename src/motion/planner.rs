// src/motion/planner.rs - Turns one piece relocation into gantry motions
//!
//! The carriage first drives under the source cell with the magnet off, then
//! drags the piece to the destination. A clear diagonal is travelled in one
//! stroke. Anything else is split into a Y leg and an X leg, with a half-cell
//! sideways dodge when another piece sits on the way so the carried piece
//! slides between its neighbours instead of into them.

use thiserror::Error;

use super::{MotionCommand, PieceMove};
use crate::board::{BoardMatrix, is_on_grid};
use crate::queue::{BoundedPoolQueue, QueueError};

/// Longest sequence a single piece move can produce: go-to, five dodge-path
/// motions and the two re-home motions.
pub const MAX_PLAN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("cell ({x}, {y}) is outside the board grid")]
    OutOfBounds { x: i32, y: i32 },
    #[error("no piece at ({x}, {y})")]
    EmptySource { x: i32, y: i32 },
    #[error("destination ({x}, {y}) is occupied")]
    OccupiedDestination { x: i32, y: i32 },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStrategy {
    Diagonal,
    /// Y leg then X leg; the flags tell which legs needed a half-cell dodge.
    Legs { dodge_x: bool, dodge_y: bool },
}

/// When a move ending near the origin also re-homes the gantry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RehomePolicy {
    /// Destination file and rank must both be at most this many cells.
    pub zone: i32,
    /// Piece moves that must run between two re-homes; 0 re-homes on every
    /// move into the zone.
    pub min_moves_between: u32,
    /// Negative travel, in cells, queued to run both axes into their switches.
    pub travel_units: i32,
}

impl Default for RehomePolicy {
    fn default() -> Self {
        Self {
            zone: 2,
            min_moves_between: 0,
            travel_units: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionPlan {
    commands: [MotionCommand; MAX_PLAN_LEN],
    len: usize,
    strategy: PathStrategy,
    rehome: bool,
}

impl MotionPlan {
    fn new(strategy: PathStrategy) -> Self {
        Self {
            commands: [MotionCommand::release(); MAX_PLAN_LEN],
            len: 0,
            strategy,
            rehome: false,
        }
    }

    fn push(&mut self, command: MotionCommand) {
        debug_assert!(self.len < MAX_PLAN_LEN);
        if self.len < MAX_PLAN_LEN {
            self.commands[self.len] = command;
            self.len += 1;
        }
    }

    pub fn commands(&self) -> &[MotionCommand] {
        &self.commands[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn strategy(&self) -> PathStrategy {
        self.strategy
    }

    pub fn includes_rehome(&self) -> bool {
        self.rehome
    }
}

#[derive(Debug, Clone)]
pub struct MotionPlanner {
    steps_per_unit: i32,
    policy: RehomePolicy,
    moves_since_rehome: u32,
}

impl MotionPlanner {
    pub fn new(steps_per_unit: i32, policy: RehomePolicy) -> Self {
        Self {
            steps_per_unit,
            policy,
            // the first move into the zone is always eligible
            moves_since_rehome: policy.min_moves_between,
        }
    }

    pub fn steps_per_unit(&self) -> i32 {
        self.steps_per_unit
    }

    pub fn policy(&self) -> RehomePolicy {
        self.policy
    }

    /// Restarts the re-home spacing after an explicit homing run.
    pub fn note_homed(&mut self) {
        self.moves_since_rehome = 0;
    }

    /// Converts cells to motor steps, truncating toward zero.
    pub fn units_to_steps(&self, units: f32) -> i32 {
        (units * self.steps_per_unit as f32) as i32
    }

    /// Run both axes into the switches, then come back to cell (0, 0).
    pub fn home_commands(&self) -> [MotionCommand; 2] {
        let travel = -self.policy.travel_units * self.steps_per_unit;
        [
            MotionCommand::relative(travel, travel, false),
            MotionCommand::goto(0, 0, false),
        ]
    }

    /// Builds the motion sequence for `mv` against the current board without
    /// changing anything.
    pub fn plan(&self, board: &BoardMatrix, mv: &PieceMove) -> Result<MotionPlan, PlanError> {
        let (sx, sy, dx, dy) = (mv.source_x, mv.source_y, mv.dest_x, mv.dest_y);
        for (x, y) in [(sx, sy), (dx, dy)] {
            if !is_on_grid(x, y) {
                return Err(PlanError::OutOfBounds { x, y });
            }
        }
        if board.is_empty_at(sx, sy) {
            return Err(PlanError::EmptySource { x: sx, y: sy });
        }
        if !board.is_empty_at(dx, dy) {
            return Err(PlanError::OccupiedDestination { x: dx, y: dy });
        }

        let spu = self.steps_per_unit;
        let half = spu / 2;
        let diff_x = dx - sx;
        let diff_y = dy - sy;
        let walk_x = diff_x.signum();
        let walk_y = diff_y.signum();

        let diagonal = diff_x.abs() == diff_y.abs()
            && (1..=diff_x.abs()).all(|i| board.is_empty_at(sx + i * walk_x, sy + i * walk_y));

        let mut plan;
        if diagonal {
            plan = MotionPlan::new(PathStrategy::Diagonal);
            plan.push(MotionCommand::goto(sx * spu, sy * spu, false));
            plan.push(MotionCommand::relative(diff_x * spu, diff_y * spu, true));
            plan.push(MotionCommand::release());
        } else {
            // The Y leg runs along the source file; an obstruction there is
            // dodged sideways in X, and the other way round for the X leg.
            let dodge_y = walk_y != 0
                && (1..=diff_y.abs()).any(|i| !board.is_empty_at(sx, sy + i * walk_y));
            let dodge_x = diff_y != 0
                && (0..diff_x.abs()).any(|i| !board.is_empty_at(sx + i * walk_x, dy));

            let offset_x = if dodge_y { half } else { 0 };
            let offset_y = if dodge_x { half } else { 0 };

            plan = MotionPlan::new(PathStrategy::Legs { dodge_x, dodge_y });
            plan.push(MotionCommand::goto(sx * spu, sy * spu, false));
            push_engaged(&mut plan, offset_x, offset_y);
            push_engaged(&mut plan, 0, diff_y * spu);
            if diff_x > 0 && dodge_y {
                // the two sideways halves add up to the skipped cell
                push_engaged(&mut plan, (diff_x - 1) * spu, 0);
                push_engaged(&mut plan, spu - half, -offset_y);
            } else {
                push_engaged(&mut plan, diff_x * spu, 0);
                push_engaged(&mut plan, -offset_x, -offset_y);
            }
            plan.push(MotionCommand::release());
        }

        if dx <= self.policy.zone
            && dy <= self.policy.zone
            && self.moves_since_rehome >= self.policy.min_moves_between
        {
            for command in self.home_commands() {
                plan.push(command);
            }
            plan.rehome = true;
        }

        Ok(plan)
    }

    /// Plans `mv`, queues its motions and applies it to the board. Either the
    /// whole sequence is queued or nothing is.
    pub fn execute(
        &mut self,
        board: &mut BoardMatrix,
        queue: &mut BoundedPoolQueue<MotionCommand>,
        mv: PieceMove,
    ) -> Result<MotionPlan, PlanError> {
        let plan = self.plan(board, &mv)?;
        if queue.free() < plan.len() {
            return Err(PlanError::Queue(QueueError::Full {
                capacity: queue.capacity(),
            }));
        }
        for command in plan.commands() {
            queue.push(*command)?;
        }

        if plan.includes_rehome() {
            self.moves_since_rehome = 0;
        } else {
            self.moves_since_rehome = self.moves_since_rehome.saturating_add(1);
        }

        board
            .relocate(mv.source_x, mv.source_y, mv.dest_x, mv.dest_y)
            .map_err(|e| PlanError::OutOfBounds { x: e.x, y: e.y })?;

        tracing::debug!(
            mv = %mv,
            strategy = ?plan.strategy(),
            commands = plan.len(),
            rehome = plan.includes_rehome(),
            "piece move planned"
        );
        Ok(plan)
    }
}

// Magnet-engaged legs of zero length are left out.
fn push_engaged(plan: &mut MotionPlan, dx_steps: i32, dy_steps: i32) {
    if dx_steps != 0 || dy_steps != 0 {
        plan.push(MotionCommand::relative(dx_steps, dy_steps, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;

    fn planner() -> MotionPlanner {
        MotionPlanner::new(200, RehomePolicy::default())
    }

    fn board_with(pieces: &[(char, i32, i32)]) -> BoardMatrix {
        let mut board = BoardMatrix::empty();
        for &(c, x, y) in pieces {
            board.set(x, y, Piece::from_code(c)).unwrap();
        }
        board
    }

    #[test]
    fn test_clear_diagonal_is_one_stroke() {
        let mut board = board_with(&[('A', 2, 3)]);
        let mut queue = BoundedPoolQueue::new(32);
        let plan = planner()
            .execute(&mut board, &mut queue, PieceMove::new(2, 3, 5, 6))
            .unwrap();
        assert_eq!(plan.strategy(), PathStrategy::Diagonal);
        assert_eq!(
            plan.commands(),
            &[
                MotionCommand::goto(400, 600, false),
                MotionCommand::relative(600, 600, true),
                MotionCommand::release(),
            ]
        );
        assert_eq!(queue.count(), 3);
        assert!(board.is_empty_at(2, 3));
        assert_eq!(board.get(5, 6).map(Piece::code), Some('A'));
    }

    #[test]
    fn test_blocked_diagonal_uses_legs() {
        let board = board_with(&[('A', 2, 3), ('p', 3, 4)]);
        let plan = planner().plan(&board, &PieceMove::new(2, 3, 4, 5)).unwrap();
        assert!(matches!(plan.strategy(), PathStrategy::Legs { .. }));
    }

    #[test]
    fn test_straight_file_move_has_no_dodge() {
        let board = board_with(&[('T', 0, 3)]);
        let plan = planner().plan(&board, &PieceMove::new(0, 3, 0, 6)).unwrap();
        assert_eq!(
            plan.strategy(),
            PathStrategy::Legs {
                dodge_x: false,
                dodge_y: false
            }
        );
        assert_eq!(
            plan.commands(),
            &[
                MotionCommand::goto(0, 600, false),
                MotionCommand::relative(0, 600, true),
                MotionCommand::release(),
            ]
        );
    }

    #[test]
    fn test_knight_over_pieces_dodges() {
        // knight from (1,0) to (2,2) in the opening: (1,1) blocks the Y leg
        let board = BoardMatrix::new();
        let plan = planner().plan(&board, &PieceMove::new(1, 0, 2, 2)).unwrap();
        assert_eq!(
            plan.strategy(),
            PathStrategy::Legs {
                dodge_x: false,
                dodge_y: true
            }
        );
        let moves: Vec<MotionCommand> = plan.commands()[..5].to_vec();
        assert_eq!(
            moves,
            vec![
                MotionCommand::goto(200, 0, false),
                MotionCommand::relative(100, 0, true),
                MotionCommand::relative(0, 400, true),
                MotionCommand::relative(100, 0, true),
                MotionCommand::release(),
            ]
        );
        // net engaged displacement equals the move
        let (nx, ny) = plan.commands()[1..4]
            .iter()
            .fold((0, 0), |(x, y), c| (x + c.dx_steps, y + c.dy_steps));
        assert_eq!((nx, ny), (200, 400));
        // ends in the homing zone
        assert!(plan.includes_rehome());
        assert_eq!(plan.commands()[5], MotionCommand::relative(-20_000, -20_000, false));
        assert_eq!(plan.commands()[6], MotionCommand::goto(0, 0, false));
    }

    #[test]
    fn test_dodge_keeps_full_cell_with_odd_steps_per_unit() {
        let board = BoardMatrix::new();
        let p = MotionPlanner::new(201, RehomePolicy::default());
        let plan = p.plan(&board, &PieceMove::new(1, 0, 2, 2)).unwrap();
        let (nx, ny) = plan
            .commands()
            .iter()
            .filter(|c| c.magnet_engaged)
            .fold((0, 0), |(x, y), c| (x + c.dx_steps, y + c.dy_steps));
        assert_eq!((nx, ny), (201, 402));
    }

    #[test]
    fn test_leftward_dodge_both_axes() {
        let board = board_with(&[('C', 5, 2), ('P', 5, 3), ('P', 4, 4)]);
        let plan = planner().plan(&board, &PieceMove::new(5, 2, 4, 4)).unwrap();
        assert_eq!(
            plan.strategy(),
            PathStrategy::Legs {
                dodge_x: true,
                dodge_y: true
            }
        );
        let engaged: Vec<MotionCommand> = plan
            .commands()
            .iter()
            .copied()
            .filter(|c| c.magnet_engaged)
            .collect();
        assert_eq!(
            engaged,
            vec![
                MotionCommand::relative(100, 100, true),
                MotionCommand::relative(0, 400, true),
                MotionCommand::relative(-200, 0, true),
                MotionCommand::relative(-100, -100, true),
            ]
        );
    }

    #[test]
    fn test_execution_guards() {
        let board = board_with(&[('T', 0, 0), ('P', 0, 1)]);
        let p = planner();
        assert_eq!(
            p.plan(&board, &PieceMove::new(3, 3, 4, 4)),
            Err(PlanError::EmptySource { x: 3, y: 3 })
        );
        assert_eq!(
            p.plan(&board, &PieceMove::new(0, 0, 0, 1)),
            Err(PlanError::OccupiedDestination { x: 0, y: 1 })
        );
        assert_eq!(
            p.plan(&board, &PieceMove::new(0, 0, 10, 1)),
            Err(PlanError::OutOfBounds { x: 10, y: 1 })
        );
    }

    #[test]
    fn test_full_queue_leaves_board_untouched() {
        let mut board = board_with(&[('A', 2, 3)]);
        let mut queue = BoundedPoolQueue::new(2);
        let result = planner().execute(&mut board, &mut queue, PieceMove::new(2, 3, 5, 6));
        assert_eq!(result, Err(PlanError::Queue(QueueError::Full { capacity: 2 })));
        assert!(queue.is_empty());
        assert_eq!(board.get(2, 3).map(Piece::code), Some('A'));
    }

    #[test]
    fn test_rehome_spacing() {
        let mut board = board_with(&[('R', 0, 0)]);
        let mut queue = BoundedPoolQueue::new(64);
        let policy = RehomePolicy {
            min_moves_between: 2,
            ..RehomePolicy::default()
        };
        let mut p = MotionPlanner::new(200, policy);

        let first = p.execute(&mut board, &mut queue, PieceMove::new(0, 0, 1, 0)).unwrap();
        assert!(first.includes_rehome());
        let second = p.execute(&mut board, &mut queue, PieceMove::new(1, 0, 0, 0)).unwrap();
        assert!(!second.includes_rehome());
        let third = p.execute(&mut board, &mut queue, PieceMove::new(0, 0, 1, 0)).unwrap();
        assert!(!third.includes_rehome());
        let fourth = p.execute(&mut board, &mut queue, PieceMove::new(1, 0, 0, 0)).unwrap();
        assert!(fourth.includes_rehome());
    }

    #[test]
    fn test_capture_into_low_graveyard_rehomes() {
        let board = board_with(&[('p', 3, 3)]);
        let plan = planner().plan(&board, &PieceMove::new(3, 3, -2, 0)).unwrap();
        assert!(plan.includes_rehome());
        assert_eq!(plan.commands()[0], MotionCommand::goto(600, 600, false));
    }

    #[test]
    fn test_units_to_steps_truncates() {
        let p = planner();
        assert_eq!(p.units_to_steps(1.5), 300);
        assert_eq!(p.units_to_steps(-0.501), -100);
    }
}
