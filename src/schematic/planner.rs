//! Layout planner.
//!
//! Computes grid-aligned target placements. The planner reads the document
//! but never touches wires, labels or nets; applying a plan is the
//! preserver's job.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::{Component, SchematicDocument};
use super::geometry::{mm_to_units, Grid, Point, Rotation, DEFAULT_GRID_MM, MAX_COORDINATE_MM};
use super::{SchematicError, SchematicResult};

/// How components are arranged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStrategy {
    /// Row-major grid in document order.
    #[default]
    Grid,
    /// One column per component category, ordered by reference.
    Grouped,
}

/// Layout parameters, in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Grid pitch.
    pub grid: f64,
    /// X of the first cell.
    #[serde(alias = "xOrigin")]
    pub x_origin: f64,
    /// Y of the first cell.
    #[serde(alias = "yOrigin")]
    pub y_origin: f64,
    /// Distance between rows.
    #[serde(alias = "rowSpacing")]
    pub row_spacing: f64,
    /// Distance between columns.
    #[serde(alias = "columnSpacing")]
    pub column_spacing: f64,
    /// Placement strategy.
    pub strategy: LayoutStrategy,
    /// Fixed column count for the grid strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    /// Only lay out components whose reference matches this pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Verify net membership is unchanged, rolling back otherwise.
    #[serde(alias = "preserveConnectivity")]
    pub preserve_connectivity: bool,
    /// Permit moving components of a connected schematic without verification.
    #[serde(alias = "allowUnsafeLayout")]
    pub allow_unsafe_layout: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid: DEFAULT_GRID_MM,
            x_origin: 20.0,
            y_origin: 20.0,
            row_spacing: 15.24,
            column_spacing: 45.72,
            strategy: LayoutStrategy::Grid,
            columns: None,
            include: None,
            preserve_connectivity: true,
            allow_unsafe_layout: false,
        }
    }
}

impl LayoutConfig {
    /// Checks the configuration and converts it to internal units.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::InvalidConfig`] for a non-positive grid or
    /// spacing, spacing below the grid pitch, zero columns, or a bad
    /// include pattern.
    pub fn validate(&self) -> SchematicResult<LayoutParams> {
        let origin = Point::new(
            mm_to_units(self.x_origin, "x_origin")?,
            mm_to_units(self.y_origin, "y_origin")?,
        );
        let grid = Grid::new(self.grid, origin)?;
        let row_spacing = spacing(self.row_spacing, "row_spacing", &grid)?;
        let column_spacing = spacing(self.column_spacing, "column_spacing", &grid)?;

        if self.columns == Some(0) {
            return Err(SchematicError::invalid_config("columns must be at least 1"));
        }
        let include = self
            .include
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| SchematicError::invalid_config(format!("invalid include pattern: {e}")))?;

        Ok(LayoutParams {
            grid,
            row_spacing,
            column_spacing,
            strategy: self.strategy,
            columns: self.columns,
            include,
        })
    }
}

fn spacing(value: f64, field: &str, grid: &Grid) -> SchematicResult<i64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SchematicError::invalid_config(format!(
            "{field} must be positive, got {value}"
        )));
    }
    let units = mm_to_units(value, field)?;
    if units < grid.size() {
        return Err(SchematicError::invalid_config(format!(
            "{field} {value} is smaller than the grid"
        )));
    }
    Ok(units)
}

/// Validated layout parameters in internal units.
#[derive(Debug, Clone)]
pub struct LayoutParams {
    grid: Grid,
    row_spacing: i64,
    column_spacing: i64,
    strategy: LayoutStrategy,
    columns: Option<usize>,
    include: Option<Regex>,
}

impl LayoutParams {
    /// The snapping grid, anchored at the layout origin.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Whether the planner may move this component.
    #[must_use]
    pub fn is_candidate(&self, component: &Component) -> bool {
        !component.fixed
            && !component.is_template()
            && self
                .include
                .as_ref()
                .map_or(true, |re| re.is_match(&component.reference))
    }

    fn cell(&self, column: usize, row: usize) -> Point {
        let origin = self.grid.origin();
        let at = Point::new(
            origin.x + to_i64(column) * self.column_spacing,
            origin.y + to_i64(row) * self.row_spacing,
        );
        self.grid.snap(at)
    }
}

#[allow(clippy::cast_possible_wrap)] // cell indices are bounded by the component count
const fn to_i64(n: usize) -> i64 {
    n as i64
}

/// A planned placement for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    /// Component reference.
    pub reference: String,
    /// Target origin.
    pub position: Point,
    /// Target rotation.
    pub rotation: Rotation,
}

/// Component category used by the grouped strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Power,
    Connector,
    Ic,
    Passive,
    Other,
}

impl Bucket {
    fn of(reference: &str) -> Self {
        let r = reference.to_ascii_uppercase();
        if r.starts_with("#PWR") {
            Self::Power
        } else if r.starts_with('J') {
            Self::Connector
        } else if r.starts_with('U') {
            Self::Ic
        } else if ["R", "C", "L", "D", "Q", "Y", "SW", "FB"]
            .iter()
            .any(|p| r.starts_with(*p))
        {
            Self::Passive
        } else {
            Self::Other
        }
    }

    const fn column(self) -> usize {
        self as usize
    }

    const fn rotation(self, current: Rotation) -> Rotation {
        match self {
            Self::Power => Rotation::R90,
            Self::Connector | Self::Ic | Self::Passive => Rotation::R0,
            Self::Other => current,
        }
    }
}

/// Plans new placements for every component the parameters select.
///
/// Output is in document order for the grid strategy and column order for
/// the grouped strategy; identical input gives identical output.
///
/// # Errors
///
/// Returns [`SchematicError::InvalidConfig`] when a planned origin or pin
/// would fall outside ±[`MAX_COORDINATE_MM`], since such a document could
/// not be reopened.
pub fn plan_positions(
    doc: &SchematicDocument,
    params: &LayoutParams,
) -> SchematicResult<Vec<Placement>> {
    let plan = plan_unchecked(doc, params);
    for placement in &plan {
        check_limits(doc, placement)?;
    }
    Ok(plan)
}

fn check_limits(doc: &SchematicDocument, placement: &Placement) -> SchematicResult<()> {
    let in_range = placement.position.within_limits()
        && doc.component(&placement.reference).map_or(true, |c| {
            c.pins.iter().all(|pin| {
                c.pin_position_at(pin, placement.position, placement.rotation)
                    .within_limits()
            })
        });
    if in_range {
        return Ok(());
    }
    let [x, y] = placement.position.to_mm();
    Err(SchematicError::invalid_config(format!(
        "{} would be placed at ({x}, {y}), beyond ±{MAX_COORDINATE_MM} mm; \
         move the origin or reduce the spacing",
        placement.reference
    )))
}

fn plan_unchecked(doc: &SchematicDocument, params: &LayoutParams) -> Vec<Placement> {
    let (candidates, staying): (Vec<&Component>, Vec<&Component>) =
        doc.components().partition(|c| params.is_candidate(c));
    let occupied: HashSet<Point> = staying
        .iter()
        .filter(|c| !c.is_template())
        .map(|c| c.position)
        .collect();

    if candidates.is_empty() {
        return Vec::new();
    }

    match params.strategy {
        LayoutStrategy::Grid => plan_grid(&candidates, params, &occupied),
        LayoutStrategy::Grouped => plan_grouped(candidates, params, &occupied),
    }
}

fn plan_grid(
    candidates: &[&Component],
    params: &LayoutParams,
    occupied: &HashSet<Point>,
) -> Vec<Placement> {
    let columns = params
        .columns
        .unwrap_or_else(|| ceil_sqrt(candidates.len()))
        .max(1);

    let cells = (0..)
        .map(|i| params.cell(i % columns, i / columns))
        .filter(|p| !occupied.contains(p));

    candidates
        .iter()
        .zip(cells)
        .map(|(c, position)| Placement {
            reference: c.reference.clone(),
            position,
            rotation: c.rotation,
        })
        .collect()
}

fn plan_grouped(
    mut candidates: Vec<&Component>,
    params: &LayoutParams,
    occupied: &HashSet<Point>,
) -> Vec<Placement> {
    candidates.sort_by_cached_key(|c| (Bucket::of(&c.reference), c.reference.clone()));

    let mut placements = Vec::with_capacity(candidates.len());
    let mut current: Option<Bucket> = None;
    let mut row = 0;
    for c in candidates {
        let bucket = Bucket::of(&c.reference);
        if current != Some(bucket) {
            current = Some(bucket);
            row = 0;
        }
        let mut position = params.cell(bucket.column(), row);
        while occupied.contains(&position) {
            row += 1;
            position = params.cell(bucket.column(), row);
        }
        row += 1;
        placements.push(Placement {
            reference: c.reference.clone(),
            position,
            rotation: bucket.rotation(c.rotation),
        });
    }
    placements
}

/// Smallest `c` with `c * c >= n`.
fn ceil_sqrt(n: usize) -> usize {
    let mut c = 1;
    while c * c < n {
        c += 1;
    }
    c
}
