// src/board/resolver.rs - Finds which piece a symbolic move refers to
//!
//! A symbolic move names a piece code and a destination. The resolver scans the
//! field for pieces with that code, keeps the ones that can geometrically reach
//! the destination, and turns the single survivor into one or two piece moves
//! (a capture first parks the taken piece in its owner's graveyard).
//!
//! This is not a rules engine: there is no check detection, castling, en
//! passant or promotion. A pawn may double-step from any rank as long as the
//! cell it passes over is empty.

use thiserror::Error;

use super::{BoardMatrix, Piece, PieceKind, Player, is_field};
use crate::motion::PieceMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("destination ({x}, {y}) is not on the playing field")]
    OutOfBounds { x: i32, y: i32 },
    #[error("destination ({x}, {y}) holds a piece that cannot be taken")]
    IllegalDestination { x: i32, y: i32 },
    #[error("no piece can reach the destination")]
    NoCandidate,
    #[error("{count} pieces can reach the destination")]
    AmbiguousCandidate { count: usize },
    #[error("graveyard of player {player} is full")]
    GraveyardFull { player: Player },
}

/// Hint naming which of several candidates is meant, by where it stands on
/// the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Indication {
    #[default]
    None,
    /// Highest rank.
    Top,
    /// Lowest rank.
    Bottom,
    /// Lowest file.
    Left,
    /// Highest file.
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Moves the taken piece off the destination; runs before `primary`.
    pub capture: Option<PieceMove>,
    pub primary: PieceMove,
}

impl Resolution {
    pub fn moves(&self) -> impl Iterator<Item = PieceMove> {
        self.capture.into_iter().chain(std::iter::once(self.primary))
    }
}

pub struct MoveResolver<'a> {
    board: &'a BoardMatrix,
    reserved: &'a [(i32, i32)],
}

impl<'a> MoveResolver<'a> {
    pub fn new(board: &'a BoardMatrix) -> Self {
        Self {
            board,
            reserved: &[],
        }
    }

    /// Graveyard cells already promised to queued moves that have not been
    /// applied to the board yet.
    pub fn with_reserved(mut self, reserved: &'a [(i32, i32)]) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn resolve(
        &self,
        piece: Piece,
        dest_x: i32,
        dest_y: i32,
        indication: Indication,
    ) -> Result<Resolution, ResolveError> {
        if !is_field(dest_x, dest_y) {
            return Err(ResolveError::OutOfBounds {
                x: dest_x,
                y: dest_y,
            });
        }

        let target = self.board.get(dest_x, dest_y);
        let is_capture = match target {
            None => false,
            Some(taken) if taken.player == piece.player.opponent() => true,
            Some(_) => {
                return Err(ResolveError::IllegalDestination {
                    x: dest_x,
                    y: dest_y,
                });
            }
        };

        let candidates: Vec<(i32, i32)> = self
            .board
            .positions_of(piece)
            .filter(|&(x, y)| self.can_reach(piece, (x, y), (dest_x, dest_y), is_capture))
            .collect();

        let (sx, sy) = match candidates.as_slice() {
            [] => return Err(ResolveError::NoCandidate),
            [only] => *only,
            many => break_tie(many, indication).ok_or(ResolveError::AmbiguousCandidate {
                count: many.len(),
            })?,
        };

        let capture = match target {
            Some(taken) if is_capture => {
                let (gx, gy) = self
                    .graveyard_slot(taken.player)
                    .ok_or(ResolveError::GraveyardFull {
                        player: taken.player,
                    })?;
                Some(PieceMove::new(dest_x, dest_y, gx, gy))
            }
            _ => None,
        };

        tracing::debug!(
            piece = %piece.code(),
            sx, sy, dest_x, dest_y, is_capture,
            "resolved symbolic move"
        );
        Ok(Resolution {
            capture,
            primary: PieceMove::new(sx, sy, dest_x, dest_y),
        })
    }

    /// Whether `piece` standing on `from` may move to `to` given the current
    /// occupancy. Knights jump; every other sliding move needs a clear path.
    pub fn can_reach(&self, piece: Piece, from: (i32, i32), to: (i32, i32), capture: bool) -> bool {
        if from == to {
            return false;
        }
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        match piece.kind {
            PieceKind::Pawn => {
                let forward = piece.player.forward();
                if capture {
                    dx.abs() == 1 && dy == forward
                } else {
                    dx == 0
                        && (dy == forward
                            || (dy == 2 * forward
                                && self.board.is_empty_at(from.0, from.1 + forward)))
                }
            }
            PieceKind::Rook => self.straight_clear(from, to),
            PieceKind::Bishop => self.diagonal_clear(from, to),
            PieceKind::Queen => self.straight_clear(from, to) || self.diagonal_clear(from, to),
            PieceKind::King => dx.abs().max(dy.abs()) == 1,
            PieceKind::Knight => matches!((dx.abs(), dy.abs()), (1, 2) | (2, 1)),
        }
    }

    fn straight_clear(&self, from: (i32, i32), to: (i32, i32)) -> bool {
        let same_file = from.0 == to.0;
        let same_rank = from.1 == to.1;
        same_file != same_rank && self.path_clear(from, to)
    }

    fn diagonal_clear(&self, from: (i32, i32), to: (i32, i32)) -> bool {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        dx != 0 && dx.abs() == dy.abs() && self.path_clear(from, to)
    }

    // Cells strictly between `from` and `to` along a straight or diagonal line.
    fn path_clear(&self, from: (i32, i32), to: (i32, i32)) -> bool {
        let step = ((to.0 - from.0).signum(), (to.1 - from.1).signum());
        let mut cell = (from.0 + step.0, from.1 + step.1);
        while cell != to {
            if !self.board.is_empty_at(cell.0, cell.1) {
                return false;
            }
            cell = (cell.0 + step.0, cell.1 + step.1);
        }
        true
    }

    /// First free graveyard cell for a captured piece of `player`, skipping
    /// reserved cells.
    pub fn graveyard_slot(&self, player: Player) -> Option<(i32, i32)> {
        BoardMatrix::graveyard_slots(player)
            .find(|&(x, y)| self.board.is_empty_at(x, y) && !self.reserved.contains(&(x, y)))
    }
}

fn break_tie(candidates: &[(i32, i32)], indication: Indication) -> Option<(i32, i32)> {
    let key = |&(x, y): &(i32, i32)| match indication {
        Indication::None => 0,
        Indication::Top => y,
        Indication::Bottom => -y,
        Indication::Left => -x,
        Indication::Right => x,
    };
    if indication == Indication::None {
        return None;
    }
    let best = candidates.iter().map(key).max()?;
    let mut winners = candidates.iter().filter(|c| key(*c) == best);
    match (winners.next(), winners.next()) {
        (Some(winner), None) => Some(*winner),
        _ => None,
    }
}
