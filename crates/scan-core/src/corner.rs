//! Starting corner and snake (boustrophedon) coordinate mapping.
//!
//! The traversal visits rows in order and alternates the horizontal direction
//! on every row. [`SnakeMapper`] turns a traversal position into:
//!
//! - the recorded [`PhysicalCell`] written to the point stream,
//! - the stage column it actually sits in,
//! - the relative move that takes the stage to the next position.
//!
//! Both the live sequencer and the offline synthetic generator go through the
//! same mapper, so files produced by either are interchangeable.
//!
//! # Stage frame
//!
//! Motion vectors use `+dx` = right and `+dy` = down (toward the bottom edge
//! of the scan area).

use crate::geometry::GridGeometry;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Corner of the scan area where the traversal begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartingCorner {
    /// Upper-left corner, rows go top to bottom
    #[default]
    TopLeft,
    /// Upper-right corner, rows go top to bottom
    TopRight,
    /// Lower-left corner, rows go bottom to top
    BottomLeft,
    /// Lower-right corner, rows go bottom to top
    BottomRight,
}

impl StartingCorner {
    /// All corners, in configuration order.
    pub const ALL: [StartingCorner; 4] = [
        StartingCorner::TopLeft,
        StartingCorner::TopRight,
        StartingCorner::BottomLeft,
        StartingCorner::BottomRight,
    ];

    /// Parse a configured corner name, falling back to top-left with a warning.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(corner = %value, "Unknown starting corner, using top-left");
            StartingCorner::TopLeft
        })
    }

    /// Direction of travel along even rows.
    pub fn horizontal(self) -> HorizontalDirection {
        match self {
            StartingCorner::TopLeft | StartingCorner::BottomLeft => HorizontalDirection::Right,
            StartingCorner::TopRight | StartingCorner::BottomRight => HorizontalDirection::Left,
        }
    }

    /// Direction in which rows advance.
    pub fn vertical(self) -> VerticalDirection {
        match self {
            StartingCorner::TopLeft | StartingCorner::TopRight => VerticalDirection::Down,
            StartingCorner::BottomLeft | StartingCorner::BottomRight => VerticalDirection::Up,
        }
    }

    /// Configuration name, e.g. `top-left`.
    pub fn as_str(self) -> &'static str {
        match self {
            StartingCorner::TopLeft => "top-left",
            StartingCorner::TopRight => "top-right",
            StartingCorner::BottomLeft => "bottom-left",
            StartingCorner::BottomRight => "bottom-right",
        }
    }
}

impl std::fmt::Display for StartingCorner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a corner name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown starting corner '{0}'")]
pub struct UnknownCorner(pub String);

impl FromStr for StartingCorner {
    type Err = UnknownCorner;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        match normalized.as_str() {
            "top-left" | "tl" => Ok(StartingCorner::TopLeft),
            "top-right" | "tr" => Ok(StartingCorner::TopRight),
            "bottom-left" | "bl" => Ok(StartingCorner::BottomLeft),
            "bottom-right" | "br" => Ok(StartingCorner::BottomRight),
            _ => Err(UnknownCorner(s.to_string())),
        }
    }
}

/// Horizontal travel direction of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDirection {
    /// Toward increasing stage X
    Right,
    /// Toward decreasing stage X
    Left,
}

impl HorizontalDirection {
    /// The other direction.
    pub fn reversed(self) -> Self {
        match self {
            HorizontalDirection::Right => HorizontalDirection::Left,
            HorizontalDirection::Left => HorizontalDirection::Right,
        }
    }

    fn sign(self) -> f64 {
        match self {
            HorizontalDirection::Right => 1.0,
            HorizontalDirection::Left => -1.0,
        }
    }
}

/// Direction in which successive rows are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalDirection {
    /// Toward the bottom edge
    Down,
    /// Toward the top edge
    Up,
}

impl VerticalDirection {
    fn sign(self) -> f64 {
        match self {
            VerticalDirection::Down => 1.0,
            VerticalDirection::Up => -1.0,
        }
    }
}

/// Position in visit order: `row` is the n-th visited row, `col` the n-th
/// visited cell within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraversalIndex {
    /// Visited row, `0..points_y`
    pub row: u32,
    /// Visited column within the row, `0..points_x`
    pub col: u32,
}

impl TraversalIndex {
    /// Create a traversal index.
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Coordinates recorded in the point stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalCell {
    /// Recorded X index
    pub grid_x: u32,
    /// Recorded Y index
    pub grid_y: u32,
}

/// Relative stage move in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionVector {
    /// X displacement, positive to the right
    pub dx_um: f64,
    /// Y displacement, positive downward
    pub dy_um: f64,
}

impl MotionVector {
    /// Create a motion vector.
    pub const fn new(dx_um: f64, dy_um: f64) -> Self {
        Self { dx_um, dy_um }
    }

    /// Vector pointing the opposite way.
    pub fn inverse(self) -> Self {
        Self::new(-self.dx_um, -self.dy_um)
    }

    /// True when both components are zero.
    pub fn is_zero(self) -> bool {
        self.dx_um == 0.0 && self.dy_um == 0.0
    }
}

impl std::ops::Add for MotionVector {
    type Output = MotionVector;

    fn add(self, rhs: Self) -> Self::Output {
        MotionVector::new(self.dx_um + rhs.dx_um, self.dy_um + rhs.dy_um)
    }
}

impl std::ops::AddAssign for MotionVector {
    fn add_assign(&mut self, rhs: Self) {
        self.dx_um += rhs.dx_um;
        self.dy_um += rhs.dy_um;
    }
}

/// Maps traversal positions to recorded cells and stage moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnakeMapper {
    corner: StartingCorner,
    points_x: u32,
    points_y: u32,
    step_x_um: f64,
    step_y_um: f64,
}

impl SnakeMapper {
    /// Mapper for a grid with the given step sizes.
    pub fn new(corner: StartingCorner, geometry: &GridGeometry, step_x_um: u32, step_y_um: u32) -> Self {
        Self {
            corner,
            points_x: geometry.points_x.max(1),
            points_y: geometry.points_y.max(1),
            step_x_um: f64::from(step_x_um.max(1)),
            step_y_um: f64::from(step_y_um.max(1)),
        }
    }

    /// Starting corner this mapper was built for.
    pub fn corner(&self) -> StartingCorner {
        self.corner
    }

    /// Total number of cells.
    pub fn total_points(&self) -> u64 {
        u64::from(self.points_x) * u64::from(self.points_y)
    }

    /// Travel direction of a given row.
    pub fn row_direction(&self, row: u32) -> HorizontalDirection {
        if row % 2 == 0 {
            self.corner.horizontal()
        } else {
            self.corner.horizontal().reversed()
        }
    }

    /// Recorded coordinates for a traversal position.
    ///
    /// `grid_x` counts cells in write order, so every recorded row reads
    /// `0..points_x` whatever the corner or row parity. `grid_y` is measured
    /// from the top edge.
    pub fn cell(&self, index: TraversalIndex) -> PhysicalCell {
        let grid_y = match self.corner.vertical() {
            VerticalDirection::Down => index.row,
            VerticalDirection::Up => self.points_y - 1 - index.row,
        };
        PhysicalCell {
            grid_x: index.col,
            grid_y,
        }
    }

    /// Left-to-right stage column occupied at a traversal position.
    pub fn stage_column(&self, index: TraversalIndex) -> u32 {
        match self.row_direction(index.row) {
            HorizontalDirection::Right => index.col,
            HorizontalDirection::Left => self.points_x - 1 - index.col,
        }
    }

    /// Move that follows the cell at `index`, `None` after the final cell.
    pub fn next_move(&self, index: TraversalIndex) -> Option<MotionVector> {
        let last_col = index.col + 1 >= self.points_x;
        let last_row = index.row + 1 >= self.points_y;
        if !last_col {
            let dx = self.row_direction(index.row).sign() * self.step_x_um;
            Some(MotionVector::new(dx, 0.0))
        } else if !last_row {
            let dy = self.corner.vertical().sign() * self.step_y_um;
            Some(MotionVector::new(0.0, dy))
        } else {
            None
        }
    }

    /// Move from the scan center to the starting corner.
    pub fn corner_offset(&self, half_width_um: f64, half_height_um: f64) -> MotionVector {
        let dx = -self.corner.horizontal().sign() * half_width_um;
        let dy = -self.corner.vertical().sign() * half_height_um;
        MotionVector::new(dx, dy)
    }

    /// The four edge moves of the perimeter preview, starting and ending at
    /// the starting corner: horizontal, vertical, back, back.
    pub fn perimeter_moves(&self, width_um: f64, height_um: f64) -> [MotionVector; 4] {
        let horizontal = MotionVector::new(self.corner.horizontal().sign() * width_um, 0.0);
        let vertical = MotionVector::new(0.0, self.corner.vertical().sign() * height_um);
        [horizontal, vertical, horizontal.inverse(), vertical.inverse()]
    }

    /// Traversal positions in visit order.
    pub fn traversal(&self) -> Traversal {
        Traversal {
            points_x: self.points_x,
            points_y: self.points_y,
            next: Some(TraversalIndex::default()),
        }
    }
}

/// Iterator over traversal positions, row-major.
#[derive(Debug, Clone)]
pub struct Traversal {
    points_x: u32,
    points_y: u32,
    next: Option<TraversalIndex>,
}

impl Iterator for Traversal {
    type Item = TraversalIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current.col + 1 < self.points_x {
            Some(TraversalIndex::new(current.row, current.col + 1))
        } else if current.row + 1 < self.points_y {
            Some(TraversalIndex::new(current.row + 1, 0))
        } else {
            None
        };
        Some(current)
    }
}
