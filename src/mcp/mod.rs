//! Model Context Protocol (MCP) server.
//!
//! Exposes schematic editing, netlist queries and connectivity-preserving
//! auto-layout as MCP tools. Messages are JSON-RPC 2.0, one per line, over
//! stdio.
//!
//! ```text
//!   stdin ──▶ Transport ──▶ McpServer ──▶ tool handler ──▶ schematic::*
//!                               │                               │
//!   stdout ◀── Transport ◀──────┴────── ToolCallResult ◀────────┘
//! ```
//!
//! The server targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ServerSettings, ToolCallResult};
pub use transport::{StdioTransport, Transport};
