//! Grid and coordinate transform.
//!
//! Symbol libraries describe pin offsets in math orientation (+Y up) while a
//! placed schematic uses screen orientation (+Y down). Every pin coordinate
//! that takes part in connectivity goes through [`to_document_space`], for net
//! derivation and for layout alike.
//!
//! # Exact coordinates
//!
//! Two items are electrically connected only when their document coordinates
//! are *exactly* equal. To make that well defined, coordinates are converted
//! once from decimal millimetres to integer internal units
//! ([`UNITS_PER_MM`] per millimetre) and all further arithmetic is integer
//! arithmetic. There is no tolerance anywhere after that conversion; do not
//! add one without re-deriving the connectivity rule.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use super::{SchematicError, SchematicResult};

/// Internal units per millimetre (0.1 µm resolution).
pub const UNITS_PER_MM: i64 = 10_000;

const UNITS_PER_MM_F64: f64 = 10_000.0;

/// Largest accepted coordinate magnitude in millimetres.
pub const MAX_COORDINATE_MM: f64 = 1_000_000.0;

/// [`MAX_COORDINATE_MM`] in internal units.
pub const MAX_COORDINATE: i64 = 1_000_000 * UNITS_PER_MM;

/// Default schematic grid (100 mil) in millimetres.
pub const DEFAULT_GRID_MM: f64 = 2.54;

/// Converts a millimetre value to internal units.
///
/// # Errors
///
/// Returns [`SchematicError::InvalidCoordinate`] for non-finite or
/// out-of-range values.
#[allow(clippy::cast_possible_truncation)] // range checked above the cast
pub fn mm_to_units(value: f64, field: &str) -> SchematicResult<i64> {
    if !value.is_finite() || value.abs() > MAX_COORDINATE_MM {
        return Err(SchematicError::invalid_coordinate(field, value));
    }
    Ok((value * UNITS_PER_MM_F64).round() as i64)
}

/// Converts internal units back to millimetres.
#[must_use]
#[allow(clippy::cast_precision_loss)] // coordinates are bounded by MAX_COORDINATE_MM
pub fn units_to_mm(value: i64) -> f64 {
    value as f64 / UNITS_PER_MM_F64
}

/// A point in document space, in internal units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PointMm", into = "PointMm")]
pub struct Point {
    /// X coordinate in internal units.
    pub x: i64,
    /// Y coordinate in internal units (+Y down in document space).
    pub y: i64,
}

impl Point {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0);

    /// Creates a point from internal units.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Creates a point from millimetre coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if either coordinate is non-finite or out of range.
    pub fn from_mm(x: f64, y: f64) -> SchematicResult<Self> {
        Ok(Self::new(mm_to_units(x, "x")?, mm_to_units(y, "y")?))
    }

    /// X coordinate in millimetres.
    #[must_use]
    pub fn x_mm(self) -> f64 {
        units_to_mm(self.x)
    }

    /// Y coordinate in millimetres.
    #[must_use]
    pub fn y_mm(self) -> f64 {
        units_to_mm(self.y)
    }

    /// Returns `[x, y]` in millimetres.
    #[must_use]
    pub fn to_mm(self) -> [f64; 2] {
        [self.x_mm(), self.y_mm()]
    }

    /// Whether both coordinates would survive a save and reload.
    #[must_use]
    pub const fn within_limits(self) -> bool {
        self.x.abs() <= MAX_COORDINATE && self.y.abs() <= MAX_COORDINATE
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x_mm(), self.y_mm())
    }
}

/// On-disk form of a [`Point`]: millimetres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PointMm {
    x: f64,
    y: f64,
}

impl TryFrom<PointMm> for Point {
    type Error = SchematicError;

    fn try_from(value: PointMm) -> SchematicResult<Self> {
        Self::from_mm(value.x, value.y)
    }
}

impl From<Point> for PointMm {
    fn from(value: Point) -> Self {
        Self {
            x: value.x_mm(),
            y: value.y_mm(),
        }
    }
}

/// An axis-aligned component rotation.
///
/// Positive angles are counter-clockwise as seen on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Rotation {
    /// 0 degrees.
    #[default]
    R0,
    /// 90 degrees.
    R90,
    /// 180 degrees.
    R180,
    /// 270 degrees.
    R270,
}

impl Rotation {
    /// Parses an angle in degrees, normalising multiples of 360.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::InvalidRotation`] for non-axis-aligned angles.
    pub fn from_degrees(degrees: f64) -> SchematicResult<Self> {
        let normalised = degrees.rem_euclid(360.0);
        if normalised == 0.0 {
            Ok(Self::R0)
        } else if normalised == 90.0 {
            Ok(Self::R90)
        } else if normalised == 180.0 {
            Ok(Self::R180)
        } else if normalised == 270.0 {
            Ok(Self::R270)
        } else {
            Err(SchematicError::InvalidRotation { degrees })
        }
    }

    /// The angle in degrees.
    #[must_use]
    pub const fn degrees(self) -> f64 {
        match self {
            Self::R0 => 0.0,
            Self::R90 => 90.0,
            Self::R180 => 180.0,
            Self::R270 => 270.0,
        }
    }

    /// Rotates a screen-space vector (+Y down) about the origin.
    #[must_use]
    pub const fn apply(self, v: Point) -> Point {
        match self {
            Self::R0 => v,
            Self::R90 => Point::new(v.y, -v.x),
            Self::R180 => Point::new(-v.x, -v.y),
            Self::R270 => Point::new(-v.y, v.x),
        }
    }
}

impl TryFrom<f64> for Rotation {
    type Error = SchematicError;

    fn try_from(value: f64) -> SchematicResult<Self> {
        Self::from_degrees(value)
    }
}

impl From<Rotation> for f64 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// Converts a symbol-local pin offset (+Y up) into an absolute document
/// coordinate (+Y down) for a component placed at `position`.
#[must_use]
pub fn to_document_space(local_offset: Point, position: Point, rotation: Rotation) -> Point {
    let screen = Point::new(local_offset.x, -local_offset.y);
    position + rotation.apply(screen)
}

/// A snapping grid anchored at an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    size: i64,
    origin: Point,
}

impl Grid {
    /// Creates a grid with the given pitch in millimetres.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::InvalidConfig`] if the pitch is not positive.
    pub fn new(size_mm: f64, origin: Point) -> SchematicResult<Self> {
        if !size_mm.is_finite() || size_mm <= 0.0 {
            return Err(SchematicError::invalid_config(format!(
                "grid size must be positive, got {size_mm}"
            )));
        }
        let size = mm_to_units(size_mm, "grid")?;
        if size <= 0 {
            return Err(SchematicError::invalid_config(format!(
                "grid size {size_mm} is below the coordinate resolution"
            )));
        }
        Ok(Self { size, origin })
    }

    /// Grid pitch in internal units.
    #[must_use]
    pub const fn size(&self) -> i64 {
        self.size
    }

    /// Grid origin.
    #[must_use]
    pub const fn origin(&self) -> Point {
        self.origin
    }

    /// Rounds each axis to the nearest grid line relative to the origin.
    ///
    /// Halfway values round away from the origin.
    #[must_use]
    pub fn snap(&self, point: Point) -> Point {
        let rel = point - self.origin;
        Point::new(
            self.origin.x + round_div(rel.x, self.size) * self.size,
            self.origin.y + round_div(rel.y, self.size) * self.size,
        )
    }

    /// Whether the point lies exactly on a grid intersection.
    #[must_use]
    pub fn is_aligned(&self, point: Point) -> bool {
        let rel = point - self.origin;
        rel.x.rem_euclid(self.size) == 0 && rel.y.rem_euclid(self.size) == 0
    }
}

/// Snaps a point to a grid of `grid_size_mm` anchored at `origin`.
///
/// # Errors
///
/// Returns [`SchematicError::InvalidConfig`] for a non-positive grid size.
pub fn snap_to_grid(point: Point, grid_size_mm: f64, origin: Point) -> SchematicResult<Point> {
    Ok(Grid::new(grid_size_mm, origin)?.snap(point))
}

/// Integer division rounding half away from zero. `d` must be positive.
const fn round_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d {
        q + n.signum()
    } else {
        q
    }
}
