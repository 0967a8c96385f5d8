//! MCP server exposing schematic editing and auto-layout as tools.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! Every tool call opens the schematic file it names, works on it in memory
//! and writes it back only if something changed. Requests are handled one at
//! a time, so calls on the same file never interleave.

use std::error::Error as _;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::{StdioTransport, Transport};
use crate::schematic::layout::REFUSAL_MESSAGE;
use crate::schematic::{
    auto_layout, plan_layout, ComponentSpec, CreateOutcome, LayoutConfig, LayoutOutcome,
    NetIndex, Pin, Point, Rotation, Routing, SafetyMode, SchematicDocument, SchematicError,
    SymbolDef,
};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // skip_serializing_if passes &T
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: &'static str,
    /// Server version.
    pub version: &'static str,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    /// Creates a result carrying pretty-printed JSON.
    #[must_use]
    pub fn json(value: &Value, is_error: bool) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self {
            is_error,
            ..Self::text(text)
        }
    }

    /// The text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| match c {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// Settings the server applies to every tool call.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Directories tools may read and write. Empty allows any path.
    pub allowed_paths: Vec<PathBuf>,
    /// Layout defaults that tool arguments override.
    pub layout: LayoutConfig,
    /// Copy a schematic aside before overwriting it.
    pub backup_on_write: bool,
}

/// Tool outcome before conversion to a [`ToolCallResult`].
type ToolResult = Result<Value, String>;

/// The MCP server for schematic editing and layout.
pub struct McpServer {
    state: ServerState,
    protocol_version: Option<String>,
    settings: ServerSettings,
}

impl McpServer {
    /// Creates a new MCP server.
    #[must_use]
    pub const fn new(settings: ServerSettings) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            settings,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Checks that a path lies within one of the allowed directories and
    /// returns it resolved.
    fn validate_path(&self, filepath: &str) -> Result<PathBuf, String> {
        let path = Path::new(filepath);
        if self.settings.allowed_paths.is_empty() {
            return Ok(path.to_path_buf());
        }

        // A file that doesn't exist yet is resolved through its parent.
        let resolved = if path.exists() {
            path.canonicalize()
                .map_err(|e| format!("Failed to resolve path '{}': {e}", path.display()))?
        } else {
            let filename = path
                .file_name()
                .ok_or_else(|| format!("Invalid path '{}': no filename specified", path.display()))?;
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            parent
                .canonicalize()
                .map_err(|e| {
                    format!(
                        "Parent directory '{}' does not exist or is inaccessible: {e}",
                        parent.display()
                    )
                })?
                .join(filename)
        };

        let allowed = self
            .settings
            .allowed_paths
            .iter()
            .filter_map(|p| p.canonicalize().ok())
            .any(|root| resolved.starts_with(root));
        if allowed {
            Ok(resolved)
        } else {
            Err("Access denied: path is outside the configured allowed directories".to_string())
        }
    }

    /// Runs the server on stdio until the client disconnects or a shutdown
    /// signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Serves messages from a transport until its input ends.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, transport: &mut Transport<R, W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = transport.read_line().await;
            if self.handle_transport_result(transport, line).await? {
                return Ok(());
            }
        }
    }

    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.handle_transport_result(transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.handle_transport_result(transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles one read from the transport. Returns `true` to stop serving.
    async fn handle_transport_result<R, W>(
        &mut self,
        transport: &mut Transport<R, W>,
        line: io::Result<Option<String>>,
    ) -> io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = line? else {
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };
        if line.trim().is_empty() {
            return Ok(false);
        }

        match parse_message(&line) {
            Ok(IncomingMessage::Request(req)) => match self.handle_request(&req) {
                Ok(response) => transport.write_message(&response).await?,
                Err(error) => transport.write_message(&error).await?,
            },
            Ok(IncomingMessage::Notification(notif)) => self.handle_notification(&notif),
            Err(error) => transport.write_message(&error).await?,
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles an incoming request.
    fn handle_request(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::debug!("Client initialised");
            self.state = ServerState::Running;
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::already_initialised(req.id.clone()));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        tracing::debug!(client_version = %params.protocol_version, "Initialise requested");

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        let capabilities = ServerCapabilities {
            tools: ToolCapabilities::default(),
        };
        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": ServerInfo::default(),
        });
        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": Self::get_tool_definitions() }),
        ))
    }

    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let params: ToolCallParams = parse_params(req, "tool call")?;

        let result = self.call_tool(&params.name, &params.arguments);
        let value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise result")
        })?;
        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }

    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state == ServerState::Running {
            Ok(())
        } else {
            Err(JsonRpcError::not_initialised(id.clone()))
        }
    }

    /// Runs a tool by name.
    #[must_use]
    pub fn call_tool(&self, name: &str, arguments: &Value) -> ToolCallResult {
        tracing::debug!(tool = name, "Tool call");
        let result = match name {
            "create_schematic" => self.call_create_schematic(arguments),
            "read_schematic" => self.call_read_schematic(arguments),
            "define_symbol" => self.call_define_symbol(arguments),
            "add_schematic_component" => self.call_add_component(arguments),
            "instantiate_template" => self.call_instantiate_template(arguments),
            "add_schematic_wire" => self.call_add_wire(arguments),
            "add_schematic_net_label" => self.call_add_net_label(arguments),
            "add_schematic_connection" => self.call_add_connection(arguments),
            "connect_to_net" => self.call_connect_to_net(arguments),
            "get_pin_location" => self.call_get_pin_location(arguments),
            "get_net_connections" => self.call_get_net_connections(arguments),
            "generate_netlist" => self.call_generate_netlist(arguments),
            "auto_layout_schematic" => return self.call_auto_layout(arguments),
            _ => return ToolCallResult::error(format!("Unknown tool: {name}")),
        };

        match result {
            Ok(value) => ToolCallResult::json(&value, false),
            Err(message) => {
                tracing::debug!(tool = name, error = %message, "Tool call failed");
                ToolCallResult::json(&json!({ "status": "error", "error": message }), true)
            }
        }
    }

    /// Returns the list of available tools.
    #[allow(clippy::too_many_lines)]
    fn get_tool_definitions() -> Vec<ToolDefinition> {
        let filepath = json!({
            "type": "string",
            "description": "Path to the schematic JSON file"
        });
        let point = |description: &str| {
            json!({
                "type": "array",
                "items": { "type": "number" },
                "minItems": 2,
                "maxItems": 2,
                "description": format!("{description} as [x, y] in millimetres")
            })
        };
        let pins = json!({
            "type": "array",
            "description": "Pins as {id, name, offset: {x, y}} with offsets in symbol orientation (+Y up)",
            "items": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "offset": {
                        "type": "object",
                        "properties": { "x": { "type": "number" }, "y": { "type": "number" } },
                        "required": ["x", "y"]
                    }
                },
                "required": ["id", "offset"]
            }
        });
        let include_templates = json!({
            "type": "boolean",
            "description": "Count pins of _TEMPLATE_ components (default: false)"
        });

        vec![
            ToolDefinition {
                name: "create_schematic",
                description: "Create a new, empty schematic file.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "title": { "type": "string", "description": "Schematic title" },
                        "overwrite": { "type": "boolean", "description": "Replace an existing file (default: false)" }
                    },
                    "required": ["filepath"]
                }),
            },
            ToolDefinition {
                name: "read_schematic",
                description: "Read a schematic and return its components, labels and counts. \
                              Coordinates are in millimetres with +Y pointing down.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "include_wires": { "type": "boolean", "description": "Include wire segments (default: false)" }
                    },
                    "required": ["filepath"]
                }),
            },
            ToolDefinition {
                name: "define_symbol",
                description: "Add or replace a symbol definition so components can be created from it \
                              without repeating the pin list.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "library": { "type": "string" },
                        "symbol": { "type": "string" },
                        "pins": pins
                    },
                    "required": ["filepath", "library", "symbol", "pins"]
                }),
            },
            ToolDefinition {
                name: "add_schematic_component",
                description: "Add a component, or update the existing component with the same \
                              reference. Repeating the call with the same arguments changes nothing.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "reference": { "type": "string", "description": "Reference designator, e.g. R1" },
                        "library": { "type": "string" },
                        "symbol": { "type": "string" },
                        "value": { "type": "string" },
                        "footprint": { "type": "string" },
                        "position": point("Placement origin"),
                        "rotation": { "type": "number", "enum": [0, 90, 180, 270] },
                        "pins": pins,
                        "fixed": { "type": "boolean", "description": "Exclude from auto-layout" }
                    },
                    "required": ["filepath", "reference", "library", "symbol", "position"]
                }),
            },
            ToolDefinition {
                name: "instantiate_template",
                description: "Create a component by copying a _TEMPLATE_ component's symbol, \
                              footprint and pins. Idempotent on the new reference.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "template": { "type": "string", "description": "Template reference, e.g. _TEMPLATE_Device_R" },
                        "reference": { "type": "string" },
                        "value": { "type": "string" },
                        "position": point("Placement origin")
                    },
                    "required": ["filepath", "template", "reference", "position"]
                }),
            },
            ToolDefinition {
                name: "add_schematic_wire",
                description: "Add a wire segment. Wires connect only at their endpoints.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "start": point("Start point"),
                        "end": point("End point")
                    },
                    "required": ["filepath", "start", "end"]
                }),
            },
            ToolDefinition {
                name: "add_schematic_net_label",
                description: "Add a net label. Adding the same name at the same point again is a no-op.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "net_name": { "type": "string" },
                        "position": point("Label anchor")
                    },
                    "required": ["filepath", "net_name", "position"]
                }),
            },
            ToolDefinition {
                name: "add_schematic_connection",
                description: "Wire two component pins together.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "source_ref": { "type": "string" },
                        "source_pin": { "type": "string" },
                        "target_ref": { "type": "string" },
                        "target_pin": { "type": "string" },
                        "routing": {
                            "type": "string",
                            "enum": ["direct", "orthogonal_h", "orthogonal_v"],
                            "description": "Wire routing (default: direct)"
                        }
                    },
                    "required": ["filepath", "source_ref", "source_pin", "target_ref", "target_pin"]
                }),
            },
            ToolDefinition {
                name: "connect_to_net",
                description: "Attach a pin to a named net with a short wire stub and a net label.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "component_ref": { "type": "string" },
                        "pin_name": { "type": "string" },
                        "net_name": { "type": "string" }
                    },
                    "required": ["filepath", "component_ref", "pin_name", "net_name"]
                }),
            },
            ToolDefinition {
                name: "get_pin_location",
                description: "Return the absolute schematic coordinate of a component pin.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "component_ref": { "type": "string" },
                        "pin_name": { "type": "string" }
                    },
                    "required": ["filepath", "component_ref", "pin_name"]
                }),
            },
            ToolDefinition {
                name: "get_net_connections",
                description: "List the component pins on a net.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "net_name": { "type": "string" },
                        "include_templates": include_templates
                    },
                    "required": ["filepath", "net_name"]
                }),
            },
            ToolDefinition {
                name: "generate_netlist",
                description: "Derive every net and its member pins from the schematic geometry.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "include_templates": include_templates
                    },
                    "required": ["filepath"]
                }),
            },
            ToolDefinition {
                name: "auto_layout_schematic",
                description: "Arrange components on a grid. By default wires and labels attached to \
                              moved pins are rebuilt and the netlist is verified unchanged; on any \
                              difference the schematic is left untouched. With \
                              preserve_connectivity=false a connected schematic is refused unless \
                              allow_unsafe_layout=true. Layout options may also be given in \
                              camelCase (rowSpacing, preserveConnectivity, ...).",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filepath": filepath,
                        "grid": { "type": "number", "description": "Grid pitch in mm (default: 2.54)" },
                        "x_origin": { "type": "number", "description": "X of the first cell in mm" },
                        "y_origin": { "type": "number", "description": "Y of the first cell in mm" },
                        "row_spacing": { "type": "number", "description": "Row pitch in mm" },
                        "column_spacing": { "type": "number", "description": "Column pitch in mm" },
                        "strategy": { "type": "string", "enum": ["grid", "grouped"] },
                        "columns": { "type": "integer", "minimum": 1 },
                        "include": { "type": "string", "description": "Regex on references to lay out" },
                        "preserve_connectivity": { "type": "boolean", "description": "Default: true" },
                        "allow_unsafe_layout": { "type": "boolean", "description": "Default: false" },
                        "dry_run": { "type": "boolean", "description": "Report the plan without writing" }
                    },
                    "required": ["filepath"]
                }),
            },
        ]
    }

    // ==================== Document access ====================

    fn open(&self, filepath: &str) -> Result<SchematicDocument, String> {
        let path = self.validate_path(filepath)?;
        SchematicDocument::open(&path).map_err(|e| describe(&e))
    }

    /// Writes the document back, returning the backup path if one was made.
    fn save(&self, doc: &SchematicDocument, filepath: &str) -> Result<Option<PathBuf>, String> {
        let path = self.validate_path(filepath)?;
        let saved = if self.settings.backup_on_write {
            doc.save_with_backup(&path)
        } else {
            doc.save(&path).map(|()| None)
        };
        saved.map_err(|e| describe(&e))
    }

    // ==================== Tools ====================

    fn call_create_schematic(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let title = opt_str(arguments, "title").unwrap_or_default();
        let path = self.validate_path(filepath)?;
        if path.exists() && !bool_arg(arguments, "overwrite", false) {
            return Err(format!(
                "File already exists: {filepath}. Pass overwrite=true to replace it."
            ));
        }

        let doc = SchematicDocument::new(title);
        let backup = self.save(&doc, filepath)?;
        tracing::info!(filepath, "Created schematic");
        Ok(json!({
            "status": "success",
            "filepath": filepath,
            "title": title,
            "backup": backup,
        }))
    }

    fn call_read_schematic(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let doc = self.open(filepath)?;

        let components: Vec<Value> = doc
            .components()
            .map(|c| {
                json!({
                    "reference": c.reference,
                    "lib_id": c.lib_id(),
                    "value": c.value,
                    "footprint": c.footprint,
                    "position": xy(c.position),
                    "rotation": c.rotation.degrees(),
                    "fixed": c.fixed,
                    "template": c.is_template(),
                    "pin_count": c.pins.len(),
                })
            })
            .collect();
        let labels: Vec<Value> = doc
            .labels
            .iter()
            .map(|l| json!({ "name": l.name, "position": xy(l.position) }))
            .collect();

        let mut result = json!({
            "status": "success",
            "filepath": filepath,
            "title": doc.title,
            "component_count": doc.component_count(),
            "wire_count": doc.wires.len(),
            "label_count": doc.labels.len(),
            "symbols": doc.symbols().map(SymbolDef::lib_id).collect::<Vec<_>>(),
            "components": components,
            "labels": labels,
        });
        if bool_arg(arguments, "include_wires", false) {
            result["wires"] = doc
                .wires
                .iter()
                .map(|w| json!({ "start": xy(w.start), "end": xy(w.end) }))
                .collect();
        }
        Ok(result)
    }

    fn call_define_symbol(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let def = SymbolDef {
            library: str_arg(arguments, "library")?.to_string(),
            symbol: str_arg(arguments, "symbol")?.to_string(),
            pins: pins_arg(arguments)?.ok_or("Missing required parameter: pins")?,
        };
        let lib_id = def.lib_id();

        let mut doc = self.open(filepath)?;
        let changed = doc.define_symbol(def).map_err(|e| describe(&e))?;
        if changed {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "lib_id": lib_id, "changed": changed }))
    }

    fn call_add_component(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let reference = str_arg(arguments, "reference")?;
        let spec = ComponentSpec {
            reference: reference.to_string(),
            library: str_arg(arguments, "library")?.to_string(),
            symbol: str_arg(arguments, "symbol")?.to_string(),
            value: opt_str(arguments, "value").unwrap_or_default().to_string(),
            footprint: opt_str(arguments, "footprint").unwrap_or_default().to_string(),
            position: point_arg(arguments, "position")?,
            rotation: rotation_arg(arguments)?,
            pins: pins_arg(arguments)?,
        };

        let mut doc = self.open(filepath)?;
        let mut outcome = doc.upsert_component(spec).map_err(|e| describe(&e))?;
        if let Some(fixed) = arguments.get("fixed").and_then(Value::as_bool) {
            let was = doc.component(reference).is_some_and(|c| c.fixed);
            doc.set_fixed(reference, fixed).map_err(|e| describe(&e))?;
            if was != fixed && outcome == CreateOutcome::Unchanged {
                outcome = CreateOutcome::Updated;
            }
        }
        if outcome != CreateOutcome::Unchanged {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "reference": reference, "outcome": outcome }))
    }

    fn call_instantiate_template(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let template = str_arg(arguments, "template")?;
        let reference = str_arg(arguments, "reference")?;
        let position = point_arg(arguments, "position")?;

        let mut doc = self.open(filepath)?;
        let outcome = doc
            .instantiate_template(template, reference, opt_str(arguments, "value"), position)
            .map_err(|e| describe(&e))?;
        if outcome != CreateOutcome::Unchanged {
            self.save(&doc, filepath)?;
        }
        Ok(json!({
            "status": "success",
            "template": template,
            "reference": reference,
            "outcome": outcome,
        }))
    }

    fn call_add_wire(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let start = point_arg(arguments, "start")?;
        let end = point_arg(arguments, "end")?;

        let mut doc = self.open(filepath)?;
        let added = doc.add_wire(start, end);
        if added {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "added": added }))
    }

    fn call_add_net_label(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let name = str_arg(arguments, "net_name")?;
        let position = point_arg(arguments, "position")?;

        let mut doc = self.open(filepath)?;
        let added = doc.add_label(name, position);
        if added {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "net_name": name, "added": added }))
    }

    fn call_add_connection(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let source = (str_arg(arguments, "source_ref")?, str_arg(arguments, "source_pin")?);
        let target = (str_arg(arguments, "target_ref")?, str_arg(arguments, "target_pin")?);
        let routing = opt_str(arguments, "routing")
            .map(str::parse::<Routing>)
            .transpose()?
            .unwrap_or_default();

        let mut doc = self.open(filepath)?;
        let wires_added = doc
            .connect_pins(source, target, routing)
            .map_err(|e| describe(&e))?;
        if wires_added > 0 {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "wires_added": wires_added }))
    }

    fn call_connect_to_net(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let reference = str_arg(arguments, "component_ref")?;
        let pin = str_arg(arguments, "pin_name")?;
        let net = str_arg(arguments, "net_name")?;

        let mut doc = self.open(filepath)?;
        let added = doc
            .connect_to_net(reference, pin, net)
            .map_err(|e| describe(&e))?;
        if added {
            self.save(&doc, filepath)?;
        }
        Ok(json!({ "status": "success", "net_name": net, "added": added }))
    }

    fn call_get_pin_location(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let reference = str_arg(arguments, "component_ref")?;
        let pin = str_arg(arguments, "pin_name")?;

        let doc = self.open(filepath)?;
        let at = doc.pin_position(reference, pin).map_err(|e| describe(&e))?;
        Ok(json!({
            "status": "success",
            "component_ref": reference,
            "pin_name": pin,
            "location": xy(at),
        }))
    }

    fn call_get_net_connections(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let name = str_arg(arguments, "net_name")?;

        let doc = self.open(filepath)?;
        let index = NetIndex::build_with(&doc, bool_arg(arguments, "include_templates", false));
        let net = index
            .net(name)
            .ok_or_else(|| format!("Net not found: {name}"))?;
        Ok(json!({
            "status": "success",
            "net_name": net.name,
            "aliases": net.aliases,
            "connections": net.members,
        }))
    }

    fn call_generate_netlist(&self, arguments: &Value) -> ToolResult {
        let filepath = str_arg(arguments, "filepath")?;
        let include_templates = bool_arg(arguments, "include_templates", false);

        let doc = self.open(filepath)?;
        let index = NetIndex::build_with(&doc, include_templates);
        let components: Vec<Value> = doc
            .components()
            .filter(|c| include_templates || !c.is_template())
            .map(|c| {
                json!({
                    "reference": c.reference,
                    "value": c.value,
                    "footprint": c.footprint,
                    "lib_id": c.lib_id(),
                })
            })
            .collect();
        Ok(json!({
            "status": "success",
            "net_count": index.len(),
            "nets": index.nets().collect::<Vec<_>>(),
            "components": components,
        }))
    }

    fn call_auto_layout(&self, arguments: &Value) -> ToolCallResult {
        match self.auto_layout(arguments) {
            Ok((value, is_error)) => ToolCallResult::json(&value, is_error),
            Err(message) => {
                ToolCallResult::json(&json!({ "status": "error", "error": message }), true)
            }
        }
    }

    fn auto_layout(&self, arguments: &Value) -> Result<(Value, bool), String> {
        let filepath = str_arg(arguments, "filepath")?;
        let config = self.layout_config(arguments)?;
        let mut doc = self.open(filepath)?;

        if bool_arg(arguments, "dry_run", false) {
            let plan = plan_layout(&doc, &config).map_err(|e| describe(&e))?;
            let placements: Vec<Value> = plan
                .iter()
                .map(|p| {
                    json!({
                        "reference": p.reference,
                        "position": xy(p.position),
                        "rotation": p.rotation.degrees(),
                    })
                })
                .collect();
            return Ok((
                json!({
                    "status": "success",
                    "dry_run": true,
                    "planned_count": placements.len(),
                    "placements": placements,
                }),
                false,
            ));
        }

        match auto_layout(&mut doc, &config).map_err(|e| describe(&e))? {
            LayoutOutcome::Applied(report) => {
                let backup = if report.moves.is_empty() {
                    None
                } else {
                    self.save(&doc, filepath)?
                };
                Ok((
                    json!({
                        "status": "success",
                        "mode": report.mode,
                        "connectivity_preserved": report.mode == SafetyMode::Safe,
                        "moved_count": report.moved_count,
                        "rotated_count": report.rotated_count,
                        "nets_verified": report.nets_verified,
                        "rebuilt": report.rebuilt,
                        "moves": report.moves,
                        "grid": config.grid,
                        "strategy": config.strategy,
                        "backup": backup,
                    }),
                    false,
                ))
            }
            LayoutOutcome::Refused => Ok((
                json!({
                    "status": "refused",
                    "message": REFUSAL_MESSAGE,
                    "guard": "connectivity_present",
                }),
                false,
            )),
            LayoutOutcome::ConnectivityViolation { nets } => Ok((
                json!({
                    "status": "connectivity_violation",
                    "message": "Connectivity changed after layout. Schematic left unchanged.",
                    "mismatched_nets": nets,
                }),
                true,
            )),
        }
    }

    /// Overlays tool arguments on the configured layout defaults.
    fn layout_config(&self, arguments: &Value) -> Result<LayoutConfig, String> {
        let mut merged = serde_json::to_value(&self.settings.layout).map_err(|e| e.to_string())?;
        if let (Some(base), Some(overrides)) = (merged.as_object_mut(), arguments.as_object()) {
            for (key, value) in overrides {
                if matches!(key.as_str(), "filepath" | "dry_run") {
                    continue;
                }
                // The defaults are serialised in snake_case; a camelCase
                // override must replace its twin, not sit beside it.
                base.insert(snake_case(key), value.clone());
            }
        }
        serde_json::from_value(merged).map_err(|e| format!("Invalid layout parameters: {e}"))
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    let params = req
        .params
        .as_ref()
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))?;
    serde_json::from_value(params.clone()).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
    })
}

/// `rowSpacing` -> `row_spacing`; snake_case input is returned unchanged.
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Formats an error with its source chain.
fn describe(err: &SchematicError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn xy(p: Point) -> Value {
    json!([p.x_mm(), p.y_mm()])
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    opt_str(arguments, key).ok_or_else(|| format!("Missing required parameter: {key}"))
}

fn opt_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

fn bool_arg(arguments: &Value, key: &str, default: bool) -> bool {
    arguments.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Reads `[x, y]` or `{"x": .., "y": ..}` in millimetres.
fn point_arg(arguments: &Value, key: &str) -> Result<Point, String> {
    let value = arguments
        .get(key)
        .ok_or_else(|| format!("Missing required parameter: {key}"))?;
    let coords = match value {
        Value::Array(items) if items.len() == 2 => items[0].as_f64().zip(items[1].as_f64()),
        Value::Object(map) => map
            .get("x")
            .and_then(Value::as_f64)
            .zip(map.get("y").and_then(Value::as_f64)),
        _ => None,
    };
    let (x, y) = coords.ok_or_else(|| format!("Parameter {key} must be [x, y] in millimetres"))?;
    Point::from_mm(x, y).map_err(|e| describe(&e))
}

fn rotation_arg(arguments: &Value) -> Result<Rotation, String> {
    match arguments.get("rotation") {
        None | Some(Value::Null) => Ok(Rotation::R0),
        Some(v) => {
            let degrees = v.as_f64().ok_or("Parameter rotation must be a number")?;
            Rotation::from_degrees(degrees).map_err(|e| describe(&e))
        }
    }
}

fn pins_arg(arguments: &Value) -> Result<Option<Vec<Pin>>, String> {
    arguments
        .get("pins")
        .map(|v| serde_json::from_value(v.clone()).map_err(|e| format!("Invalid pins: {e}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_keys_become_snake_case() {
        assert_eq!(snake_case("rowSpacing"), "row_spacing");
        assert_eq!(snake_case("allowUnsafeLayout"), "allow_unsafe_layout");
        assert_eq!(snake_case("x_origin"), "x_origin");
    }

    fn server_in(dir: &Path) -> McpServer {
        McpServer::new(ServerSettings {
            allowed_paths: vec![dir.to_path_buf()],
            layout: LayoutConfig::default(),
            backup_on_write: false,
        })
    }

    fn call(server: &McpServer, tool: &str, arguments: Value) -> (Value, bool) {
        let result = server.call_tool(tool, &arguments);
        let body = serde_json::from_str(result.first_text().unwrap()).unwrap();
        (body, result.is_error)
    }

    #[test]
    fn server_initial_state() {
        let server = McpServer::new(ServerSettings::default());
        assert_eq!(server.state(), ServerState::AwaitingInit);
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = McpServer::get_tool_definitions();
        assert_eq!(tools.len(), 13);
        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
            assert_eq!(tool.input_schema["required"][0], "filepath");
        }
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("Something went wrong"));
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let server = McpServer::new(ServerSettings::default());
        let result = server.call_tool("format_disk", &json!({}));
        assert!(result.is_error);
    }

    #[test]
    fn requests_before_initialise_are_rejected() {
        let mut server = McpServer::new(ServerSettings::default());
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
                .unwrap();
        assert!(server.handle_request(&req).is_err());
    }

    #[test]
    fn paths_outside_allowed_dirs_are_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let server = server_in(allowed.path());

        let outside = other.path().join("x.sch.json");
        let (body, is_error) = call(
            &server,
            "create_schematic",
            json!({ "filepath": outside.to_str().unwrap() }),
        );
        assert!(is_error);
        assert!(body["error"].as_str().unwrap().contains("Access denied"));
        assert!(!outside.exists());
    }

    #[test]
    fn component_and_label_tools_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let file = dir.path().join("a.sch.json");
        let fp = file.to_str().unwrap();

        call(&server, "create_schematic", json!({ "filepath": fp, "title": "a" }));
        let add = json!({
            "filepath": fp,
            "reference": "R1",
            "library": "Device",
            "symbol": "R",
            "value": "10k",
            "position": [25.4, 25.4],
            "pins": [
                { "id": "1", "offset": { "x": 0, "y": 3.81 } },
                { "id": "2", "offset": { "x": 0, "y": -3.81 } }
            ]
        });
        let (first, _) = call(&server, "add_schematic_component", add.clone());
        let (second, _) = call(&server, "add_schematic_component", add);
        assert_eq!(first["outcome"], "inserted");
        assert_eq!(second["outcome"], "unchanged");

        let label = json!({ "filepath": fp, "net_name": "VCC", "position": [25.4, 21.59] });
        let (first, _) = call(&server, "add_schematic_net_label", label.clone());
        let (second, _) = call(&server, "add_schematic_net_label", label);
        assert_eq!(first["added"], true);
        assert_eq!(second["added"], false);

        let (body, _) = call(&server, "read_schematic", json!({ "filepath": fp }));
        assert_eq!(body["component_count"], 1);
        assert_eq!(body["label_count"], 1);

        let (body, _) = call(
            &server,
            "get_net_connections",
            json!({ "filepath": fp, "net_name": "VCC" }),
        );
        assert_eq!(body["connections"], json!([{ "reference": "R1", "pin": "1" }]));
    }

    #[test]
    fn layout_tool_reports_refusal_and_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let file = dir.path().join("b.sch.json");
        let fp = file.to_str().unwrap();

        call(&server, "create_schematic", json!({ "filepath": fp }));
        for (reference, x) in [("R1", 50.8), ("R2", 76.2)] {
            call(
                &server,
                "add_schematic_component",
                json!({
                    "filepath": fp,
                    "reference": reference,
                    "library": "Device",
                    "symbol": "R",
                    "position": [x, 50.8],
                    "pins": [
                        { "id": "1", "offset": { "x": 0, "y": 3.81 } },
                        { "id": "2", "offset": { "x": 0, "y": -3.81 } }
                    ]
                }),
            );
        }
        call(
            &server,
            "add_schematic_connection",
            json!({
                "filepath": fp,
                "source_ref": "R1", "source_pin": "2",
                "target_ref": "R2", "target_pin": "2",
                "routing": "orthogonal_h"
            }),
        );

        let (body, is_error) = call(
            &server,
            "auto_layout_schematic",
            json!({ "filepath": fp, "preserveConnectivity": false }),
        );
        assert_eq!(body["status"], "refused");
        assert!(!is_error);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("preserveConnectivity"), "{message}");
        assert!(message.contains("allow_unsafe_layout"), "{message}");

        let (body, _) = call(
            &server,
            "auto_layout_schematic",
            json!({ "filepath": fp, "dry_run": true }),
        );
        assert_eq!(body["planned_count"], 2);

        let (body, is_error) = call(
            &server,
            "auto_layout_schematic",
            json!({
                "filepath": fp,
                "dry_run": true,
                "columns": 1,
                "xOrigin": 25.4,
                "rowSpacing": 10.16
            }),
        );
        assert!(!is_error, "{body}");
        assert_eq!(body["placements"][1]["position"], json!([25.4, 30.16]));

        let (body, is_error) = call(&server, "auto_layout_schematic", json!({ "filepath": fp }));
        assert!(!is_error);
        assert_eq!(body["status"], "success");
        assert_eq!(body["moved_count"], 2);
        assert_eq!(body["connectivity_preserved"], true);

        let (body, is_error) = call(
            &server,
            "auto_layout_schematic",
            json!({ "filepath": fp, "grid": -1 }),
        );
        assert!(is_error);
        assert_eq!(body["status"], "error");
    }
}
