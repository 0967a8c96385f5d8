//! Connectivity preserver.
//!
//! Applies a set of placements and rebuilds the managed connections that were
//! anchored to moved pins, then proves the net graph is unchanged. All work
//! happens on a copy of the document; the caller's document is replaced only
//! after verification passes, so a failed call leaves it exactly as it was.
//!
//! # Regeneration rules
//!
//! For every point that a moved pin used to occupy:
//!
//! - if a pin that is not moving also sits there, the point stays put and
//!   each moved pin gets a bridge wire back to it;
//! - otherwise the first moved pin at the point (document order, then pin
//!   order) owns it: wire ends and labels there follow that pin, and any
//!   other moved pins at the point are bridged to its new location;
//! - a wire whose far end dangles (no pin, no other wire) is a stub and
//!   moves whole, taking labels at its far end along.
//!
//! Labels and wire ends at the same point therefore always move together.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use super::document::SchematicDocument;
use super::geometry::{Point, Rotation};
use super::netgraph::NetIndex;
use super::planner::Placement;
use super::{SchematicError, SchematicResult};

/// Whether managed connections are rebuilt while applying placements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WiringMode {
    /// Rebuild wires and labels anchored to moved pins.
    #[default]
    Regenerate,
    /// Move components only.
    PositionsOnly,
}

/// One component's placement change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    /// Component reference.
    pub reference: String,
    /// Previous origin.
    pub from: Point,
    /// New origin.
    pub to: Point,
    /// Previous rotation.
    pub from_rotation: Rotation,
    /// New rotation.
    pub to_rotation: Rotation,
}

/// Counts of managed-connection edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    /// Wire endpoints relocated.
    pub wire_ends_moved: usize,
    /// Labels relocated.
    pub labels_moved: usize,
    /// Bridge wires added.
    pub bridges_added: usize,
}

/// Result of applying placements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Components whose placement changed.
    pub moves: Vec<MoveRecord>,
    /// Components whose position changed.
    pub moved_count: usize,
    /// Components whose rotation changed.
    pub rotated_count: usize,
    /// Managed-connection edits.
    pub rebuilt: RebuildStats,
}

/// Applies placements, rebuilds managed connections and verifies that every
/// net keeps its members.
///
/// # Errors
///
/// Returns [`SchematicError::UnknownReference`] if a placement names a
/// missing component, or [`SchematicError::ConnectivityViolation`] with the
/// affected nets if membership changed. The document is untouched in both
/// cases.
pub fn apply_layout(
    doc: &mut SchematicDocument,
    placements: &[Placement],
    mode: WiringMode,
) -> SchematicResult<ApplyReport> {
    let targets = resolve(doc, placements)?;
    let before = NetIndex::build(doc);

    let mut working = doc.clone();
    let rebuilt = match mode {
        WiringMode::Regenerate => regenerate(&mut working, &targets),
        WiringMode::PositionsOnly => RebuildStats::default(),
    };
    let mut report = place(&mut working, &targets)?;
    report.rebuilt = rebuilt;

    let after = NetIndex::build(&working);
    let nets = NetIndex::diff(&before, &after);
    if !nets.is_empty() {
        tracing::warn!(?nets, "Layout changed net membership, rolling back");
        return Err(SchematicError::ConnectivityViolation { nets });
    }

    *doc = working;
    Ok(report)
}

/// Moves components without rebuilding or verifying connectivity.
///
/// # Errors
///
/// Returns [`SchematicError::UnknownReference`] if a placement names a
/// missing component; nothing is moved in that case.
pub fn apply_positions(
    doc: &mut SchematicDocument,
    placements: &[Placement],
) -> SchematicResult<ApplyReport> {
    let targets = resolve(doc, placements)?;
    place(doc, &targets)
}

fn resolve<'a>(
    doc: &SchematicDocument,
    placements: &'a [Placement],
) -> SchematicResult<HashMap<&'a str, &'a Placement>> {
    placements
        .iter()
        .map(|p| {
            doc.component(&p.reference)
                .map(|_| (p.reference.as_str(), p))
                .ok_or_else(|| SchematicError::unknown_reference(&p.reference))
        })
        .collect()
}

fn place(
    doc: &mut SchematicDocument,
    targets: &HashMap<&str, &Placement>,
) -> SchematicResult<ApplyReport> {
    let mut report = ApplyReport::default();
    let order: Vec<String> = doc
        .components()
        .filter(|c| targets.contains_key(c.reference.as_str()))
        .map(|c| c.reference.clone())
        .collect();

    for reference in order {
        let target = targets[reference.as_str()];
        let component = doc.component_mut(&reference)?;
        let record = MoveRecord {
            reference,
            from: component.position,
            to: target.position,
            from_rotation: component.rotation,
            to_rotation: target.rotation,
        };
        component.position = target.position;
        component.rotation = target.rotation;

        if record.from != record.to {
            report.moved_count += 1;
        }
        if record.from_rotation != record.to_rotation {
            report.rotated_count += 1;
        }
        if record.from != record.to || record.from_rotation != record.to_rotation {
            report.moves.push(record);
        }
    }
    Ok(report)
}

/// Rebuilds wires and labels for the given targets. Must run before the
/// components are moved, since it reads their current pin positions.
fn regenerate(doc: &mut SchematicDocument, targets: &HashMap<&str, &Placement>) -> RebuildStats {
    let mut stationary: HashSet<Point> = HashSet::new();
    let mut moved: IndexMap<Point, Vec<Point>> = IndexMap::new();
    for c in doc.components() {
        let target = targets.get(c.reference.as_str());
        for (pin, old) in c.pin_positions() {
            let new = target.map_or(old, |t| c.pin_position_at(pin, t.position, t.rotation));
            if new == old {
                stationary.insert(old);
            } else {
                moved.entry(old).or_default().push(new);
            }
        }
    }

    let mut relocate: HashMap<Point, Point> = HashMap::new();
    let mut bridges: Vec<(Point, Point)> = Vec::new();
    for (&at, news) in &moved {
        if stationary.contains(&at) {
            bridges.extend(news.iter().map(|&n| (n, at)));
        } else if let Some((&owner, rest)) = news.split_first() {
            relocate.insert(at, owner);
            bridges.extend(rest.iter().map(|&n| (n, owner)));
        }
    }

    let mut wire_ends: HashMap<Point, usize> = HashMap::new();
    for w in &doc.wires {
        *wire_ends.entry(w.start).or_default() += 1;
        *wire_ends.entry(w.end).or_default() += 1;
    }
    let dangling = |p: Point| {
        !stationary.contains(&p) && !moved.contains_key(&p) && wire_ends.get(&p) == Some(&1)
    };

    let mut stats = RebuildStats::default();
    let mut far_ends: HashMap<Point, Point> = HashMap::new();
    for wire in &mut doc.wires {
        match (relocate.get(&wire.start), relocate.get(&wire.end)) {
            (Some(&to), None) if dangling(wire.end) => {
                let far = wire.end + (to - wire.start);
                far_ends.insert(wire.end, far);
                wire.start = to;
                wire.end = far;
                stats.wire_ends_moved += 2;
            }
            (None, Some(&to)) if dangling(wire.start) => {
                let far = wire.start + (to - wire.end);
                far_ends.insert(wire.start, far);
                wire.start = far;
                wire.end = to;
                stats.wire_ends_moved += 2;
            }
            (start, end) => {
                if let Some(&to) = start {
                    wire.start = to;
                    stats.wire_ends_moved += 1;
                }
                if let Some(&to) = end {
                    wire.end = to;
                    stats.wire_ends_moved += 1;
                }
            }
        }
    }

    for label in &mut doc.labels {
        if let Some(&to) = relocate
            .get(&label.position)
            .or_else(|| far_ends.get(&label.position))
        {
            label.position = to;
            stats.labels_moved += 1;
        }
    }

    for (a, b) in bridges {
        if doc.add_wire(a, b) {
            stats.bridges_added += 1;
        }
    }

    tracing::debug!(
        wire_ends = stats.wire_ends_moved,
        labels = stats.labels_moved,
        bridges = stats.bridges_added,
        "Rebuilt managed connections"
    );
    stats
}
