//! Schematic model and connectivity-preserving auto-layout.
//!
//! This module is a pure, synchronous library: it reads and mutates an
//! in-memory [`SchematicDocument`] and only touches the filesystem through
//! the explicit `open`/`save` helpers.
//!
//! # Layout pipeline
//!
//! ```text
//! NetIndex::build ──► evaluate_gate ──► plan_positions ──► apply_layout ──► NetIndex::diff
//!   (snapshot)          (refuse?)         (planner)         (preserver)        (verify)
//! ```
//!
//! # Connectivity
//!
//! Two items are connected only when their document coordinates are exactly
//! equal. See [`geometry`] for how coordinates are represented so that this
//! rule is well defined.

pub mod document;
mod error;
pub mod geometry;
pub mod layout;
pub mod netgraph;
pub mod planner;
pub mod preserver;

pub use document::{
    Component, ComponentSpec, CreateOutcome, NetLabel, Pin, Routing, SchematicDocument, SymbolDef,
    Wire,
};
pub use error::{SchematicError, SchematicResult};
pub use geometry::{snap_to_grid, to_document_space, Grid, Point, Rotation};
pub use layout::{auto_layout, evaluate_gate, plan_layout, GateDecision, LayoutOutcome, LayoutReport, SafetyMode};
pub use netgraph::{Net, NetIndex, PinRef};
pub use planner::{plan_positions, LayoutConfig, LayoutStrategy, Placement};
pub use preserver::{apply_layout, apply_positions, ApplyReport, MoveRecord, WiringMode};
