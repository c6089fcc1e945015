//! Board-grid addressing and tick-space conversion.
//!
//! Squares are addressed column-letter then row-digit, `a1` through `h9`.
//! Row `:` is the off-board holding area used when a capture has to be
//! parked before the capturing piece moves in; it sits one code point past
//! `9` in ASCII, which the tick arithmetic exploits directly.

use std::fmt;
use std::str::FromStr;

use crate::config::GeometryCfg;

pub const MIN_COLUMN: char = 'a';
pub const MAX_COLUMN: char = 'h';
pub const MIN_ROW: char = '1';
pub const MAX_ROW: char = '9';
/// Off-board holding row for captured pieces.
pub const CAPTURE_ROW: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("column {0:?} outside {MIN_COLUMN}..={MAX_COLUMN}")]
    Column(char),
    #[error("row {0:?} outside {MIN_ROW}..={MAX_ROW} (or {CAPTURE_ROW:?})")]
    Row(char),
    #[error("move string must be exactly four characters, got {0:?}")]
    Length(String),
}

/// One addressable square (or the capture row) on the work surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCoordinate {
    column: char,
    row: char,
}

impl GridCoordinate {
    pub fn new(column: char, row: char) -> Result<Self, GridError> {
        if !(MIN_COLUMN..=MAX_COLUMN).contains(&column) {
            return Err(GridError::Column(column));
        }
        if !(MIN_ROW..=MAX_ROW).contains(&row) && row != CAPTURE_ROW {
            return Err(GridError::Row(row));
        }
        Ok(Self { column, row })
    }

    pub fn column(&self) -> char {
        self.column
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn is_capture_row(&self) -> bool {
        self.row == CAPTURE_ROW
    }

    /// Target for the dual-motor axis, in ticks from the home switch.
    pub fn x_ticks(&self, geo: &GeometryCfg) -> i32 {
        (self.row as i32 - MIN_ROW as i32) * geo.row_pitch_ticks
    }

    /// Target for the single-motor axis, in ticks from the home switch.
    pub fn y_ticks(&self, geo: &GeometryCfg) -> i32 {
        (self.column as i32 - MIN_COLUMN as i32) * geo.column_pitch_ticks
    }
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// A source square and a destination square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveCommand {
    pub from: GridCoordinate,
    pub to: GridCoordinate,
}

impl MoveCommand {
    pub fn new(from: GridCoordinate, to: GridCoordinate) -> Self {
        Self { from, to }
    }

    /// Build from the four raw characters of the wire form, e.g.
    /// `('e', '2', 'e', '4')`.
    pub fn from_chars(
        from_col: char,
        from_row: char,
        to_col: char,
        to_row: char,
    ) -> Result<Self, GridError> {
        Ok(Self {
            from: GridCoordinate::new(from_col, from_row)?,
            to: GridCoordinate::new(to_col, to_row)?,
        })
    }
}

impl FromStr for MoveCommand {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next(), chars.next(), chars.next()) {
            (Some(fc), Some(fr), Some(tc), Some(tr), None) => {
                Self::from_chars(fc, fr, tc, tr)
            }
            _ => Err(GridError::Length(s.to_string())),
        }
    }
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> GeometryCfg {
        GeometryCfg::default()
    }

    #[test]
    fn origin_square_maps_to_zero_ticks() {
        let sq = GridCoordinate::new('a', '1').unwrap();
        assert_eq!(sq.x_ticks(&geo()), 0);
        assert_eq!(sq.y_ticks(&geo()), 0);
    }

    #[test]
    fn pitch_scales_linearly() {
        let sq = GridCoordinate::new('d', '5').unwrap();
        assert_eq!(sq.x_ticks(&geo()), 4 * 208);
        assert_eq!(sq.y_ticks(&geo()), 3 * 554);
    }

    #[test]
    fn capture_row_lands_past_the_board() {
        let park = GridCoordinate::new('h', CAPTURE_ROW).unwrap();
        assert!(park.is_capture_row());
        // ':' is the code point after '9', so it reads as row ten.
        assert_eq!(park.x_ticks(&geo()), 9 * 208);

        let mv: MoveCommand = "b2b:".parse().unwrap();
        assert!(mv.to.is_capture_row());
        assert_eq!(mv.to.x_ticks(&geo()), 9 * 208);
        assert_eq!(mv.to.y_ticks(&geo()), 554);
    }

    #[test]
    fn rejects_out_of_range_addresses() {
        assert_eq!(
            GridCoordinate::new('i', '1'),
            Err(GridError::Column('i'))
        );
        assert_eq!(GridCoordinate::new('a', '0'), Err(GridError::Row('0')));
        assert_eq!(GridCoordinate::new('a', ';'), Err(GridError::Row(';')));
    }

    #[test]
    fn parses_wire_form() {
        let mv: MoveCommand = "e2e4".parse().unwrap();
        assert_eq!(mv.from, GridCoordinate::new('e', '2').unwrap());
        assert_eq!(mv.to, GridCoordinate::new('e', '4').unwrap());
        assert_eq!(mv.to_string(), "e2e4");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "e2e".parse::<MoveCommand>(),
            Err(GridError::Length(_))
        ));
        assert!(matches!(
            "e2e4x".parse::<MoveCommand>(),
            Err(GridError::Length(_))
        ));
    }
}
