// src/board/mod.rs - Authoritative model of which piece sits in which cell
//!
//! The grid is 8 ranks by 12 files: files 0..=7 are the playing field, files
//! -2/-1 hold pieces captured from player B and files 8/9 hold pieces captured
//! from player A.

pub mod resolver;

pub use resolver::{Indication, MoveResolver, Resolution, ResolveError};

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub const RANKS: i32 = 8;
pub const FILES: i32 = 8;
pub const MIN_FILE: i32 = -2;
pub const MAX_FILE: i32 = 9;
const GRID_COLUMNS: usize = 12;

/// Opening rank from file 0 to file 7, player A's letters.
const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cell ({x}, {y}) is outside the board grid")]
pub struct OutOfGrid {
    pub x: i32,
    pub y: i32,
}

/// Uppercase letters belong to `A`, who starts on ranks 0-1 and advances
/// toward higher ranks. Lowercase letters belong to `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Player {
    A,
    B,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::A => Player::B,
            Player::B => Player::A,
        }
    }

    /// Rank delta of a pawn step.
    pub fn forward(self) -> i32 {
        match self {
            Player::A => 1,
            Player::B => -1,
        }
    }

    /// Files where this player's captured pieces are parked.
    pub fn graveyard_files(self) -> [i32; 2] {
        match self {
            Player::A => [8, 9],
            Player::B => [-2, -1],
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::A => write!(f, "A"),
            Player::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    King,
    Queen,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::King,
        PieceKind::Queen,
    ];

    /// Uppercase board letter.
    pub const fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Rook => 'T',
            PieceKind::Knight => 'C',
            PieceKind::Bishop => 'A',
            PieceKind::King => 'R',
            PieceKind::Queen => 'G',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.letter() == upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub player: Player,
}

impl Piece {
    pub const fn new(kind: PieceKind, player: Player) -> Self {
        Self { kind, player }
    }

    pub fn from_code(code: char) -> Option<Self> {
        if !code.is_ascii_alphabetic() {
            return None;
        }
        let kind = PieceKind::from_letter(code)?;
        let player = if code.is_ascii_uppercase() {
            Player::A
        } else {
            Player::B
        };
        Some(Self { kind, player })
    }

    pub fn code(self) -> char {
        match self.player {
            Player::A => self.kind.letter(),
            Player::B => self.kind.letter().to_ascii_lowercase(),
        }
    }
}

fn cell_char(cell: Option<Piece>) -> char {
    cell.map_or(' ', Piece::code)
}

/// Inside the 8x8 playing field.
pub fn is_field(x: i32, y: i32) -> bool {
    (0..FILES).contains(&x) && (0..RANKS).contains(&y)
}

/// Inside the playing field or a graveyard.
pub fn is_on_grid(x: i32, y: i32) -> bool {
    (MIN_FILE..=MAX_FILE).contains(&x) && (0..RANKS).contains(&y)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardMatrix {
    cells: [[Option<Piece>; GRID_COLUMNS]; RANKS as usize],
}

impl Default for BoardMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardMatrix {
    /// Board in the opening layout with empty graveyards.
    pub fn new() -> Self {
        let mut board = Self::empty();
        board.reset();
        board
    }

    pub fn empty() -> Self {
        Self {
            cells: [[None; GRID_COLUMNS]; RANKS as usize],
        }
    }

    pub fn reset(&mut self) {
        self.cells = [[None; GRID_COLUMNS]; RANKS as usize];
        for (x, kind) in (0..FILES).zip(BACK_RANK) {
            self.place(x, 0, Piece::new(kind, Player::A));
            self.place(x, 1, Piece::new(PieceKind::Pawn, Player::A));
            self.place(x, 6, Piece::new(PieceKind::Pawn, Player::B));
        }
        // player B's back rank is the mirror image of player A's
        for (x, kind) in (0..FILES).zip(BACK_RANK.iter().rev()) {
            self.place(x, 7, Piece::new(*kind, Player::B));
        }
    }

    /// Piece at `(x, y)`; `None` for an empty cell or a coordinate off the grid.
    pub fn get(&self, x: i32, y: i32) -> Option<Piece> {
        Self::index(x, y).and_then(|(row, col)| self.cells[row][col])
    }

    pub fn is_empty_at(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_none()
    }

    pub fn set(&mut self, x: i32, y: i32, cell: Option<Piece>) -> Result<(), OutOfGrid> {
        let (row, col) = Self::index(x, y).ok_or(OutOfGrid { x, y })?;
        self.cells[row][col] = cell;
        Ok(())
    }

    /// Moves whatever is on the source cell to the destination and clears
    /// the source.
    pub fn relocate(&mut self, sx: i32, sy: i32, dx: i32, dy: i32) -> Result<(), OutOfGrid> {
        let (src_row, src_col) = Self::index(sx, sy).ok_or(OutOfGrid { x: sx, y: sy })?;
        let (dst_row, dst_col) = Self::index(dx, dy).ok_or(OutOfGrid { x: dx, y: dy })?;
        let piece = self.cells[src_row][src_col].take();
        self.cells[dst_row][dst_col] = piece;
        Ok(())
    }

    /// Playing-field cells holding exactly `piece`.
    pub fn positions_of(&self, piece: Piece) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..FILES)
            .flat_map(|x| (0..RANKS).map(move |y| (x, y)))
            .filter(move |&(x, y)| self.get(x, y) == Some(piece))
    }

    /// Graveyard cells for `player`'s captured pieces, rank 0 first.
    pub fn graveyard_slots(player: Player) -> impl Iterator<Item = (i32, i32)> {
        let files = player.graveyard_files();
        (0..RANKS).flat_map(move |y| files.into_iter().map(move |x| (x, y)))
    }

    /// First free graveyard cell for a captured piece of `player`.
    pub fn find_graveyard_slot(&self, player: Player) -> Option<(i32, i32)> {
        Self::graveyard_slots(player).find(|&(x, y)| self.is_empty_at(x, y))
    }

    /// Field contents on one line, file by file: 64 characters, space for an
    /// empty cell.
    pub fn snapshot_line(&self) -> String {
        (0..FILES)
            .flat_map(|x| (0..RANKS).map(move |y| (x, y)))
            .map(|(x, y)| cell_char(self.get(x, y)))
            .collect()
    }

    /// Multi-line dump with rank 7 on top, seen from behind the gantry
    /// (highest grid column first).
    pub fn render(&self) -> String {
        let mut out = String::from("Current matrix\n--------------------------\n");
        for row in self.cells.iter().rev() {
            for cell in row.iter().rev() {
                out.push(cell_char(*cell));
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }

    fn place(&mut self, x: i32, y: i32, piece: Piece) {
        if let Some((row, col)) = Self::index(x, y) {
            self.cells[row][col] = Some(piece);
        }
    }

    fn index(x: i32, y: i32) -> Option<(usize, usize)> {
        if !is_on_grid(x, y) {
            return None;
        }
        Some((y as usize, (x - MIN_FILE) as usize))
    }
}

impl fmt::Display for BoardMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Serialized as eight strings, rank 0 first, each covering files -2..=9.
impl Serialize for BoardMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.cells
                .iter()
                .map(|row| row.iter().map(|cell| cell_char(*cell)).collect::<String>()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_codes() {
        let rook = Piece::from_code('T').unwrap();
        assert_eq!(rook, Piece::new(PieceKind::Rook, Player::A));
        let queen = Piece::from_code('g').unwrap();
        assert_eq!(queen, Piece::new(PieceKind::Queen, Player::B));
        assert_eq!(queen.code(), 'g');
        assert_eq!(Piece::from_code('x'), None);
        assert_eq!(Piece::from_code(' '), None);
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_letter(kind.letter()), Some(kind));
        }
    }

    #[test]
    fn test_starting_layout() {
        let board = BoardMatrix::new();
        let rank0: String = (0..8).map(|x| cell_char(board.get(x, 0))).collect();
        let rank7: String = (0..8).map(|x| cell_char(board.get(x, 7))).collect();
        assert_eq!(rank0, "TCAGRACT");
        assert_eq!(rank7, "tcargact");
        for x in 0..8 {
            assert_eq!(board.get(x, 1).map(Piece::code), Some('P'));
            assert_eq!(board.get(x, 6).map(Piece::code), Some('p'));
            for y in 2..6 {
                assert!(board.is_empty_at(x, y));
            }
        }
        for y in 0..8 {
            for x in [-2, -1, 8, 9] {
                assert!(board.is_empty_at(x, y));
            }
        }
    }

    #[test]
    fn test_set_out_of_grid() {
        let mut board = BoardMatrix::empty();
        assert_eq!(board.set(10, 0, None), Err(OutOfGrid { x: 10, y: 0 }));
        assert_eq!(board.set(0, 8, None), Err(OutOfGrid { x: 0, y: 8 }));
        assert!(board.set(-2, 7, Piece::from_code('p')).is_ok());
        assert_eq!(board.get(-2, 7).map(Piece::code), Some('p'));
        assert_eq!(board.get(-3, 0), None);
    }

    #[test]
    fn test_relocate_clears_source() {
        let mut board = BoardMatrix::new();
        board.relocate(1, 0, 2, 2).unwrap();
        assert!(board.is_empty_at(1, 0));
        assert_eq!(board.get(2, 2).map(Piece::code), Some('C'));
    }

    #[test]
    fn test_graveyard_fills_row_major() {
        let mut board = BoardMatrix::new();
        assert_eq!(board.find_graveyard_slot(Player::A), Some((8, 0)));
        assert_eq!(board.find_graveyard_slot(Player::B), Some((-2, 0)));

        board.set(8, 0, Piece::from_code('P')).unwrap();
        assert_eq!(board.find_graveyard_slot(Player::A), Some((9, 0)));
        board.set(9, 0, Piece::from_code('P')).unwrap();
        assert_eq!(board.find_graveyard_slot(Player::A), Some((8, 1)));

        for (x, y) in BoardMatrix::graveyard_slots(Player::B) {
            board.set(x, y, Piece::from_code('p')).unwrap();
        }
        assert_eq!(board.find_graveyard_slot(Player::B), None);
    }

    #[test]
    fn test_snapshot_line_is_file_major() {
        let board = BoardMatrix::new();
        let line = board.snapshot_line();
        assert_eq!(line.len(), 64);
        assert_eq!(&line[0..8], "TP    pt");
        assert_eq!(&line[24..32], "GP    pr");
    }

    #[test]
    fn test_render_shape() {
        let board = BoardMatrix::new();
        let text = board.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "Current matrix");
        // rank 7 printed from file 9 down to file -2
        assert_eq!(lines[2], "    t c a g r a c t     ");
    }

    #[test]
    fn test_serialize_rows() {
        let board = BoardMatrix::new();
        let json = serde_json::to_value(&board).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], "  TCAGRACT  ");
        assert_eq!(rows[7], "  tcargact  ");
    }
}
