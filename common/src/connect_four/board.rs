use crate::connect_four::player::PlayerNum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const ROWS: usize = 6;
pub const COLS: usize = 7;
pub const CONNECT_LENGTH: usize = 4;

// Each pair walks away from the placed piece in opposite directions along one axis
const AXES: [[(isize, isize); 2]; 4] = [
    // Horizontal
    [(0, -1), (0, 1)],
    // Vertical
    [(-1, 0), (1, 0)],
    // Diagonal rising to the right
    [(1, -1), (-1, 1)],
    // Diagonal falling to the right
    [(-1, -1), (1, 1)],
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BoardError {
    #[error("Row {0} is off the board")]
    RowOutOfBounds(usize),
    #[error("Column {0} is off the board")]
    ColumnOutOfBounds(usize),
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Piece { player_num: PlayerNum },
}

impl Cell {
    pub fn is_piece(&self, num: PlayerNum) -> bool {
        matches!(self, Cell::Piece { player_num } if *player_num == num)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

// Serializes as a [row, column] pair. Row 0 is the top of the board.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellPosition(usize, usize);

impl CellPosition {
    pub fn new(row: usize, column: usize) -> Result<Self, BoardError> {
        if row >= ROWS {
            return Err(BoardError::RowOutOfBounds(row));
        }
        if column >= COLS {
            return Err(BoardError::ColumnOutOfBounds(column));
        }
        Ok(CellPosition(row, column))
    }

    pub fn row(&self) -> usize {
        self.0
    }

    pub fn column(&self) -> usize {
        self.1
    }

    // The neighbouring position one step along (d_row, d_col), if it is still on the board
    fn step(&self, (d_row, d_col): (isize, isize)) -> Option<CellPosition> {
        let row = self.0.checked_add_signed(d_row)?;
        let column = self.1.checked_add_signed(d_col)?;
        CellPosition::new(row, column).ok()
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Board([[Cell; COLS]; ROWS]);

impl Board {
    pub fn new() -> Self {
        Board::default()
    }

    pub fn rows(&self) -> &[[Cell; COLS]; ROWS] {
        &self.0
    }

    pub fn cell(&self, position: CellPosition) -> Cell {
        self.0[position.row()][position.column()]
    }

    // Pieces fall, so the first empty cell from the bottom is where the next piece lands.
    // Returns None for a full column or a column off the board.
    pub fn lowest_empty_row(&self, column: usize) -> Option<usize> {
        (0..ROWS)
            .rev()
            .find(|&row| self.0[row].get(column) == Some(&Cell::Empty))
    }

    // The row must come from lowest_empty_row for the same column
    pub fn place(&mut self, position: CellPosition, player_num: PlayerNum) {
        self.0[position.row()][position.column()] = Cell::Piece { player_num };
    }

    /// Finds a run of at least [`CONNECT_LENGTH`] pieces through `position` that belong to
    /// the same player as the piece at `position`.
    ///
    /// The returned cells are ordered from one end of the line to the other.
    pub fn detect_line(&self, position: CellPosition) -> Option<Vec<CellPosition>> {
        let player_num = match self.cell(position) {
            Cell::Piece { player_num } => player_num,
            Cell::Empty => return None,
        };

        AXES.iter().find_map(|[backward, forward]| {
            let mut line = self.run(position, *backward, player_num);
            line.reverse();
            line.push(position);
            line.extend(self.run(position, *forward, player_num));
            (line.len() >= CONNECT_LENGTH).then_some(line)
        })
    }

    // Consecutive cells owned by player_num starting one step away from origin
    fn run(
        &self,
        origin: CellPosition,
        direction: (isize, isize),
        player_num: PlayerNum,
    ) -> Vec<CellPosition> {
        std::iter::successors(origin.step(direction), |pos| pos.step(direction))
            .take_while(|pos| self.cell(*pos).is_piece(player_num))
            .collect()
    }

    // Gravity fills every column bottom-up, so a full top row means a full board
    pub fn is_top_row_full(&self) -> bool {
        self.0[0].iter().all(|cell| *cell != Cell::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: usize, column: usize) -> CellPosition {
        CellPosition::new(row, column).unwrap()
    }

    // Rows are given top to bottom: '1' and '2' are pieces, anything else is empty.
    // Cells are written directly, so tests can build positions that never occur in play.
    fn board_from(rows: [&str; ROWS]) -> Board {
        let mut board = Board::new();
        for (row, line) in rows.iter().enumerate() {
            for (column, c) in line.chars().enumerate() {
                match c {
                    '1' => board.place(pos(row, column), PlayerNum::P1),
                    '2' => board.place(pos(row, column), PlayerNum::P2),
                    _ => {}
                }
            }
        }
        board
    }

    #[test]
    fn test_construct_position() {
        assert!(CellPosition::new(0, 0).is_ok());
        assert!(CellPosition::new(ROWS - 1, COLS - 1).is_ok());
        assert_eq!(
            CellPosition::new(ROWS, 0),
            Err(BoardError::RowOutOfBounds(ROWS))
        );
        assert_eq!(
            CellPosition::new(0, COLS),
            Err(BoardError::ColumnOutOfBounds(COLS))
        );
    }

    #[test]
    fn test_lowest_empty_row() {
        let board = board_from([
            ".......",
            "1......",
            "2......",
            "1......",
            "2......",
            "1.2....",
        ]);
        assert_eq!(board.lowest_empty_row(0), Some(0));
        assert_eq!(board.lowest_empty_row(1), Some(ROWS - 1));
        assert_eq!(board.lowest_empty_row(2), Some(ROWS - 2));
        assert_eq!(board.lowest_empty_row(COLS), None);

        let full = board_from([
            "1......", "2......", "1......", "2......", "1......", "2......",
        ]);
        assert_eq!(full.lowest_empty_row(0), None);
    }

    #[test]
    fn test_place_follows_lowest_empty_row() {
        let mut board = Board::new();
        for expected in (0..ROWS).rev() {
            let row = board.lowest_empty_row(3).unwrap();
            assert_eq!(row, expected);
            board.place(pos(row, 3), PlayerNum::P1);
        }
        assert_eq!(board.lowest_empty_row(3), None);
        assert!(board.rows().iter().all(|r| r[3].is_piece(PlayerNum::P1)));
    }

    #[test]
    fn test_detect_horizontal_line() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "..1111.",
        ]);
        let line = board.detect_line(pos(5, 4)).unwrap();
        assert_eq!(line, vec![pos(5, 2), pos(5, 3), pos(5, 4), pos(5, 5)]);
    }

    #[test]
    fn test_detect_vertical_line() {
        let board = board_from([
            ".......",
            ".......",
            "...2...",
            "...2...",
            "...2...",
            "...2...",
        ]);
        let line = board.detect_line(pos(2, 3)).unwrap();
        assert_eq!(line.len(), 4);
        assert!(line.contains(&pos(2, 3)));
        assert!(line.contains(&pos(5, 3)));
    }

    #[test]
    fn test_detect_rising_diagonal() {
        let board = board_from([
            ".......",
            ".......",
            "...1...",
            "..12...",
            ".122...",
            "1222...",
        ]);
        let line = board.detect_line(pos(3, 2)).unwrap();
        assert_eq!(line, vec![pos(5, 0), pos(4, 1), pos(3, 2), pos(2, 3)]);
    }

    #[test]
    fn test_detect_falling_diagonal() {
        let board = board_from([
            ".......",
            ".......",
            "2......",
            "12.....",
            "112....",
            "1212...",
        ]);
        let line = board.detect_line(pos(5, 3)).unwrap();
        assert_eq!(line, vec![pos(2, 0), pos(3, 1), pos(4, 2), pos(5, 3)]);
    }

    #[test]
    fn test_detect_longer_run() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "11111..",
        ]);
        let line = board.detect_line(pos(5, 2)).unwrap();
        assert_eq!(line.len(), 5);
    }

    #[test]
    fn test_three_in_a_row_is_not_a_line() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            "1......",
            "1......",
            "1222...",
        ]);
        assert_eq!(board.detect_line(pos(3, 0)), None);
        assert_eq!(board.detect_line(pos(5, 1)), None);
    }

    #[test]
    fn test_line_ignores_opponent_pieces() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "1121111",
        ]);
        assert_eq!(board.detect_line(pos(5, 0)), None);
        assert_eq!(board.detect_line(pos(5, 2)), None);
        assert_eq!(board.detect_line(pos(5, 3)).map(|l| l.len()), Some(4));
    }

    #[test]
    fn test_detect_line_on_empty_cell() {
        assert_eq!(Board::new().detect_line(pos(5, 0)), None);
    }

    #[test]
    fn test_is_top_row_full() {
        assert!(!Board::new().is_top_row_full());
        let almost = board_from([
            "121212.", "1212121", "2121212", "1212121", "2121212", "1212121",
        ]);
        assert!(!almost.is_top_row_full());
        let full = board_from([
            "1212121", "1212121", "2121212", "1212121", "2121212", "1212121",
        ]);
        assert!(full.is_top_row_full());
    }
}
