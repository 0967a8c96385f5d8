//! Safety gate and the auto-layout pipeline.
//!
//! `auto_layout` snapshots the net graph, asks the gate whether moving
//! components is allowed, plans placements and applies them. Every path
//! ends in a [`LayoutOutcome`]; refusal and connectivity violations are
//! outcomes, not errors.

use serde::Serialize;

use super::document::SchematicDocument;
use super::netgraph::NetIndex;
use super::planner::{plan_positions, LayoutConfig, Placement};
use super::preserver::{apply_layout, apply_positions, MoveRecord, RebuildStats, WiringMode};
use super::{SchematicError, SchematicResult};

/// Message returned when the gate refuses a layout.
pub const REFUSAL_MESSAGE: &str = "Layout refused: schematic has existing connectivity. \
     Set preserve_connectivity (preserveConnectivity) to true, or allow_unsafe_layout \
     (allowUnsafeLayout) to true to move components without verification.";

/// How a layout run treats connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Managed connections are rebuilt and net membership is verified.
    Safe,
    /// Components are moved; connectivity may change.
    Unsafe,
}

/// The gate's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the layout in the given mode.
    Proceed(SafetyMode),
    /// Do nothing.
    Refuse,
}

/// Decides whether a layout may run.
///
/// Preserving connectivity always runs safely. Otherwise a schematic with
/// existing connectivity needs an explicit unsafe opt-in.
#[must_use]
pub const fn evaluate_gate(
    preserve_connectivity: bool,
    allow_unsafe_layout: bool,
    has_connectivity: bool,
) -> GateDecision {
    if preserve_connectivity {
        GateDecision::Proceed(SafetyMode::Safe)
    } else if allow_unsafe_layout || !has_connectivity {
        GateDecision::Proceed(SafetyMode::Unsafe)
    } else {
        GateDecision::Refuse
    }
}

/// Statistics for an applied layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    /// Mode the layout ran in.
    pub mode: SafetyMode,
    /// Components whose position changed.
    pub moved_count: usize,
    /// Components whose rotation changed.
    pub rotated_count: usize,
    /// Per-component changes.
    pub moves: Vec<MoveRecord>,
    /// Managed-connection edits (safe mode only).
    pub rebuilt: RebuildStats,
    /// Nets verified unchanged (safe mode only).
    pub nets_verified: usize,
}

/// Result of [`auto_layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// The document was updated.
    Applied(LayoutReport),
    /// The gate declined; the document is untouched.
    Refused,
    /// Net membership would have changed; the document is untouched.
    ConnectivityViolation {
        /// Nets whose members differ.
        nets: Vec<String>,
    },
}

/// Plans placements without touching the document.
///
/// # Errors
///
/// Returns [`SchematicError::InvalidConfig`] for unusable parameters.
pub fn plan_layout(doc: &SchematicDocument, config: &LayoutConfig) -> SchematicResult<Vec<Placement>> {
    let params = config.validate()?;
    plan_positions(doc, &params)
}

/// Runs the full layout pipeline on a document.
///
/// # Errors
///
/// Returns [`SchematicError::InvalidConfig`] (or `InvalidCoordinate`) before
/// any mutation when the configuration is unusable, including when it would
/// place a component beyond the coordinate limit.
pub fn auto_layout(doc: &mut SchematicDocument, config: &LayoutConfig) -> SchematicResult<LayoutOutcome> {
    let params = config.validate()?;
    let snapshot = NetIndex::build(doc);

    let decision = evaluate_gate(
        config.preserve_connectivity,
        config.allow_unsafe_layout,
        snapshot.has_connectivity(),
    );
    let mode = match decision {
        GateDecision::Refuse => {
            tracing::info!(nets = snapshot.len(), "Layout refused: connectivity present");
            return Ok(LayoutOutcome::Refused);
        }
        GateDecision::Proceed(mode) => mode,
    };

    let plan = plan_positions(doc, &params)?;
    tracing::debug!(?mode, planned = plan.len(), "Planned layout");

    let applied = match mode {
        SafetyMode::Safe => apply_layout(doc, &plan, WiringMode::Regenerate),
        SafetyMode::Unsafe => apply_positions(doc, &plan),
    };
    let report = match applied {
        Ok(report) => report,
        Err(SchematicError::ConnectivityViolation { nets }) => {
            return Ok(LayoutOutcome::ConnectivityViolation { nets });
        }
        Err(e) => return Err(e),
    };

    tracing::info!(
        ?mode,
        moved = report.moved_count,
        rotated = report.rotated_count,
        "Layout applied"
    );
    Ok(LayoutOutcome::Applied(LayoutReport {
        mode,
        moved_count: report.moved_count,
        rotated_count: report.rotated_count,
        moves: report.moves,
        rebuilt: report.rebuilt,
        nets_verified: match mode {
            SafetyMode::Safe => snapshot.len(),
            SafetyMode::Unsafe => 0,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schematic::document::{ComponentSpec, Pin, Routing};
    use crate::schematic::geometry::Point;

    fn pt(x: f64, y: f64) -> Point {
        Point::from_mm(x, y).unwrap()
    }

    fn connected_pair() -> SchematicDocument {
        let mut doc = SchematicDocument::new("pair");
        for (r, x) in [("R1", 101.6), ("R2", 127.0)] {
            let pins = vec![Pin::new("1", "", pt(0.0, 3.81)), Pin::new("2", "", pt(0.0, -3.81))];
            doc.upsert_component(ComponentSpec::new(r, "Device", "R", "", pt(x, 50.8)).with_pins(pins))
                .unwrap();
        }
        doc.connect_pins(("R1", "2"), ("R2", "2"), Routing::OrthogonalH)
            .unwrap();
        doc
    }

    #[test]
    fn gate_transitions() {
        use GateDecision::{Proceed, Refuse};
        use SafetyMode::{Safe, Unsafe};
        assert_eq!(evaluate_gate(true, false, true), Proceed(Safe));
        assert_eq!(evaluate_gate(true, true, true), Proceed(Safe));
        assert_eq!(evaluate_gate(false, true, true), Proceed(Unsafe));
        assert_eq!(evaluate_gate(false, false, true), Refuse);
        assert_eq!(evaluate_gate(false, false, false), Proceed(Unsafe));
    }

    #[test]
    fn refuses_by_default_without_preservation() {
        let mut doc = connected_pair();
        let before = doc.clone();
        let config = LayoutConfig {
            preserve_connectivity: false,
            ..LayoutConfig::default()
        };
        assert_eq!(auto_layout(&mut doc, &config).unwrap(), LayoutOutcome::Refused);
        assert_eq!(doc, before);
    }

    #[test]
    fn unsafe_opt_in_moves_components() {
        let mut doc = connected_pair();
        let config = LayoutConfig {
            preserve_connectivity: false,
            allow_unsafe_layout: true,
            ..LayoutConfig::default()
        };
        let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &config).unwrap() else {
            panic!("expected layout to apply");
        };
        assert_eq!(report.mode, SafetyMode::Unsafe);
        assert_eq!(report.moved_count, 2);
        assert_eq!(doc.component("R1").unwrap().position, pt(20.0, 20.0));
    }

    #[test]
    fn safe_layout_preserves_nets() {
        let mut doc = connected_pair();
        let before = NetIndex::build(&doc);
        let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &LayoutConfig::default()).unwrap()
        else {
            panic!("expected layout to apply");
        };
        assert_eq!(report.mode, SafetyMode::Safe);
        assert_eq!(report.nets_verified, 1);
        assert!(NetIndex::diff(&before, &NetIndex::build(&doc)).is_empty());
    }

    #[test]
    fn invalid_config_is_an_error_and_changes_nothing() {
        let mut doc = connected_pair();
        let before = doc.clone();
        let config = LayoutConfig {
            grid: 0.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(
            auto_layout(&mut doc, &config),
            Err(SchematicError::InvalidConfig { .. })
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn placement_past_the_coordinate_limit_changes_nothing() {
        let mut doc = connected_pair();
        let before = doc.clone();
        let config = LayoutConfig {
            x_origin: 999_000.0,
            column_spacing: 2000.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(
            auto_layout(&mut doc, &config),
            Err(SchematicError::InvalidConfig { .. })
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn empty_document_is_a_no_op() {
        let mut doc = SchematicDocument::new("empty");
        let LayoutOutcome::Applied(report) = auto_layout(&mut doc, &LayoutConfig::default()).unwrap()
        else {
            panic!("expected layout to apply");
        };
        assert_eq!(report.moved_count, 0);
    }

    #[test]
    fn layout_is_deterministic() {
        let mut a = connected_pair();
        let mut b = connected_pair();
        let ra = auto_layout(&mut a, &LayoutConfig::default()).unwrap();
        let rb = auto_layout(&mut b, &LayoutConfig::default()).unwrap();
        assert_eq!(ra, rb);
        let pos = |d: &SchematicDocument| d.components().map(|c| c.position).collect::<Vec<_>>();
        assert_eq!(pos(&a), pos(&b));
    }

    #[test]
    fn dry_run_plans_without_mutation() {
        let doc = connected_pair();
        let plan = plan_layout(&doc, &LayoutConfig::default()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(doc.component("R1").unwrap().position, pt(101.6, 50.8));
    }
}
