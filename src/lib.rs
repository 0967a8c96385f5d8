//! schematic-layout-mcp: MCP server for connectivity-preserving schematic auto-layout
//!
//! This library models a schematic as components, wires and net labels on an
//! integer grid, derives its netlist from geometry, and rearranges components
//! without changing which pins are connected.
//!
//! # Architecture
//!
//! - **Geometry**: Exact integer coordinates, rotations and grid snapping
//! - **Netlist**: Nets derived on demand from pin, wire and label positions
//! - **Layout**: Placement planning, wiring regeneration and verification
//!
//! The AI client decides what to draw. This crate guarantees that a layout
//! pass either keeps every net intact or changes nothing.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Configuration error types
//! - [`mcp`] — MCP protocol implementation
//! - [`schematic`] — Document model, netlist derivation and auto-layout

pub mod config;
pub mod error;
pub mod mcp;
pub mod schematic;
