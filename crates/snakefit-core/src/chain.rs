//! Freeman chain codes and the coarse area/perimeter summary derived from
//! them.
//!
//! Directions use screen axes: `dx` is the column step and `dy` the
//! negated row step, so north is toward row 0.
//!
//! ```text
//!   3 2 1
//!   4 · 0
//!   5 6 7
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{Contour, Point};

/// A chain-code digit outside `0..=7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid chain code direction {0}, expected 0-7")]
pub struct InvalidDirection(pub u8);

/// One of the eight compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Direction {
    East = 0,
    NorthEast = 1,
    North = 2,
    NorthWest = 3,
    West = 4,
    SouthWest = 5,
    South = 6,
    SouthEast = 7,
}

impl Direction {
    /// All directions in code order.
    pub const ALL: [Self; 8] = [
        Self::East,
        Self::NorthEast,
        Self::North,
        Self::NorthWest,
        Self::West,
        Self::SouthWest,
        Self::South,
        Self::SouthEast,
    ];

    /// Numeric code (0-7).
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Classify a step by the signs of its components.
    ///
    /// Returns `None` for a zero step.
    #[must_use]
    pub fn from_step(d_row: f64, d_col: f64) -> Option<Self> {
        // dy points up the screen.
        let dy = -d_row;
        let dx = d_col;
        let dir = match (sign(dx), sign(dy)) {
            (1, 0) => Self::East,
            (1, 1) => Self::NorthEast,
            (0, 1) => Self::North,
            (-1, 1) => Self::NorthWest,
            (-1, 0) => Self::West,
            (-1, -1) => Self::SouthWest,
            (0, -1) => Self::South,
            (1, -1) => Self::SouthEast,
            _ => return None,
        };
        Some(dir)
    }

    /// Unit pixel step `(Δrow, Δcol)`.
    #[must_use]
    pub const fn step(self) -> (i8, i8) {
        match self {
            Self::East => (0, 1),
            Self::NorthEast => (-1, 1),
            Self::North => (-1, 0),
            Self::NorthWest => (-1, -1),
            Self::West => (0, -1),
            Self::SouthWest => (1, -1),
            Self::South => (1, 0),
            Self::SouthEast => (1, 1),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction.code()
    }
}

impl TryFrom<u8> for Direction {
    type Error = InvalidDirection;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(InvalidDirection(code))
    }
}

/// Sign as -1, 0 or 1. NaN counts as zero.
fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// A sequence of directions between consecutive contour points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainCode(Vec<Direction>);

impl ChainCode {
    /// Wrap a direction sequence.
    #[must_use]
    pub const fn new(directions: Vec<Direction>) -> Self {
        Self(directions)
    }

    /// Code the steps between consecutive points.
    ///
    /// Covers the open path from the first point to the last; the closing
    /// step back to the first point is not included. Steps between
    /// identical points are skipped, so the code can be shorter than
    /// `points.len() - 1`.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Self {
        Self(
            points
                .windows(2)
                .filter_map(|w| Direction::from_step(w[1].row - w[0].row, w[1].col - w[0].col))
                .collect(),
        )
    }

    /// Code a contour. See [`ChainCode::from_points`].
    #[must_use]
    pub fn from_contour(contour: &Contour) -> Self {
        Self::from_points(contour.points())
    }

    /// Number of directions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no directions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The directions in order.
    #[must_use]
    pub fn directions(&self) -> &[Direction] {
        &self.0
    }

    /// The numeric codes in order.
    #[must_use]
    pub fn codes(&self) -> Vec<u8> {
        self.0.iter().map(|d| d.code()).collect()
    }

    /// Integrate unit steps from `start`.
    ///
    /// Returns `len() + 1` points, starting with `start`.
    #[must_use]
    pub fn trace(&self, start: Point) -> Vec<Point> {
        let mut current = start;
        let mut path = Vec::with_capacity(self.0.len() + 1);
        path.push(current);
        for dir in &self.0 {
            let (d_row, d_col) = dir.step();
            current = Point::new(current.row + f64::from(d_row), current.col + f64::from(d_col));
            path.push(current);
        }
        path
    }

    /// Coarse area and perimeter.
    ///
    /// The area sums `(c[i] + c[i+1]) / 2` over circularly adjacent codes
    /// and halves the total. This is a proxy keyed to the direction values,
    /// not a geometric polygon area. The perimeter is `len() + 1`. An
    /// empty code yields `(0.0, 1)`.
    #[must_use]
    pub fn area_perimeter(&self) -> AreaPerimeter {
        let n = self.0.len();
        let sum: f64 = (0..n)
            .map(|i| {
                let a = f64::from(self.0[i].code());
                let b = f64::from(self.0[(i + 1) % n].code());
                (a + b) / 2.0
            })
            .sum();
        AreaPerimeter {
            area: sum / 2.0,
            perimeter: n + 1,
        }
    }
}

impl fmt::Display for ChainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for dir in &self.0 {
            write!(f, "{}", dir.code())?;
        }
        Ok(())
    }
}

impl FromStr for ChainCode {
    type Err = InvalidDirection;

    /// Parse a digit string such as `"0066442"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.bytes()
            .map(|b| Direction::try_from(b.wrapping_sub(b'0')))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Output of [`ChainCode::area_perimeter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaPerimeter {
    /// Direction-value area proxy.
    pub area: f64,
    /// Number of codes plus one.
    pub perimeter: usize,
}

/// Chain code plus derived measurements for one contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourAnalysis {
    /// Directions between consecutive points.
    pub chain_code: ChainCode,
    /// See [`ChainCode::area_perimeter`].
    pub area: f64,
    /// See [`ChainCode::area_perimeter`].
    pub perimeter: usize,
}

/// Chain-code a contour and summarize it.
#[must_use]
pub fn analyze(contour: &Contour) -> ContourAnalysis {
    let chain_code = ChainCode::from_contour(contour);
    let AreaPerimeter { area, perimeter } = chain_code.area_perimeter();
    ContourAnalysis {
        chain_code,
        area,
        perimeter,
    }
}
