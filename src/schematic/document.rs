//! Schematic document model and idempotent mutations.
//!
//! A [`SchematicDocument`] is an ordered set of components (keyed by their
//! unique reference), free wires and net labels, plus a cache of symbol
//! definitions that supplies pins for new components.
//!
//! Creation calls converge: adding a component whose reference already
//! exists updates it in place, and adding a label or wire that already
//! exists is a no-op. Retried tool calls therefore never accumulate
//! duplicate entities.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{to_document_space, Point, Rotation, UNITS_PER_MM};
use super::netgraph::{NetIndex, PinRef};
use super::{SchematicError, SchematicResult};

/// Reference prefix marking a template component.
pub const TEMPLATE_PREFIX: &str = "_TEMPLATE_";

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// Length of the wire stub drawn by [`SchematicDocument::connect_to_net`].
pub const STUB_LENGTH: i64 = UNITS_PER_MM * 254 / 100;

/// A symbol pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Pin number or identifier, unique within the symbol.
    pub id: String,
    /// Pin name (e.g. "VCC"); may be empty or repeated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Offset from the symbol origin in symbol-local orientation (+Y up).
    pub offset: Point,
}

impl Pin {
    /// Creates a pin.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, offset: Point) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            offset,
        }
    }
}

/// A symbol definition from a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
    /// Library name (e.g. "Device").
    pub library: String,
    /// Symbol name within the library (e.g. "R").
    pub symbol: String,
    /// Pins of the symbol.
    #[serde(default)]
    pub pins: Vec<Pin>,
}

impl SymbolDef {
    /// `library:symbol` identifier.
    #[must_use]
    pub fn lib_id(&self) -> String {
        format!("{}:{}", self.library, self.symbol)
    }
}

/// A placed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Unique reference designator.
    pub reference: String,
    /// Library name.
    pub library: String,
    /// Symbol name within the library.
    pub symbol: String,
    /// Value field.
    #[serde(default)]
    pub value: String,
    /// Footprint assignment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub footprint: String,
    /// Placement origin in document space.
    pub position: Point,
    /// Placement rotation.
    #[serde(default)]
    pub rotation: Rotation,
    /// Pinned by the user; auto-layout leaves it alone.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixed: bool,
    /// Pins copied from the symbol definition.
    #[serde(default)]
    pub pins: Vec<Pin>,
}

impl Component {
    /// `library:symbol` identifier.
    #[must_use]
    pub fn lib_id(&self) -> String {
        format!("{}:{}", self.library, self.symbol)
    }

    /// Whether this component is a template rather than a real part.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.reference.starts_with(TEMPLATE_PREFIX)
    }

    /// Finds a pin by identifier, falling back to a unique pin name.
    #[must_use]
    pub fn pin(&self, ident: &str) -> Option<&Pin> {
        if let Some(pin) = self.pins.iter().find(|p| p.id == ident) {
            return Some(pin);
        }
        let mut by_name = self.pins.iter().filter(|p| p.name == ident);
        match (by_name.next(), by_name.next()) {
            (Some(pin), None) => Some(pin),
            _ => None,
        }
    }

    /// Absolute document coordinate of one of this component's pins.
    #[must_use]
    pub fn pin_position(&self, pin: &Pin) -> Point {
        self.pin_position_at(pin, self.position, self.rotation)
    }

    /// Where a pin would land if the component were placed differently.
    #[must_use]
    pub fn pin_position_at(&self, pin: &Pin, position: Point, rotation: Rotation) -> Point {
        to_document_space(pin.offset, position, rotation)
    }

    /// All pins with their absolute coordinates.
    pub fn pin_positions(&self) -> impl Iterator<Item = (&Pin, Point)> + '_ {
        self.pins.iter().map(move |p| (p, self.pin_position(p)))
    }
}

/// A wire segment. Only its two endpoints carry electrical meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    /// Stable identity.
    pub uuid: Uuid,
    /// First endpoint.
    pub start: Point,
    /// Second endpoint.
    pub end: Point,
}

impl Wire {
    /// Creates a wire with a fresh identity.
    #[must_use]
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            start,
            end,
        }
    }

    /// Whether this wire joins the same two points, in either direction.
    #[must_use]
    pub fn joins(&self, a: Point, b: Point) -> bool {
        (self.start == a && self.end == b) || (self.start == b && self.end == a)
    }
}

/// A local net label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetLabel {
    /// Stable identity.
    pub uuid: Uuid,
    /// Net name.
    pub name: String,
    /// Anchor point.
    pub position: Point,
}

impl NetLabel {
    /// Creates a label with a fresh identity.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Point) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            position,
        }
    }
}

/// Request to create or update a component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
    /// Reference designator.
    pub reference: String,
    /// Library name.
    pub library: String,
    /// Symbol name.
    pub symbol: String,
    /// Value field.
    pub value: String,
    /// Footprint assignment.
    pub footprint: String,
    /// Placement origin.
    pub position: Point,
    /// Placement rotation.
    pub rotation: Rotation,
    /// Explicit pins; taken from the symbol cache when `None`.
    pub pins: Option<Vec<Pin>>,
}

impl ComponentSpec {
    /// Creates a request with empty footprint, no rotation and cached pins.
    #[must_use]
    pub fn new(
        reference: impl Into<String>,
        library: impl Into<String>,
        symbol: impl Into<String>,
        value: impl Into<String>,
        position: Point,
    ) -> Self {
        Self {
            reference: reference.into(),
            library: library.into(),
            symbol: symbol.into(),
            value: value.into(),
            footprint: String::new(),
            position,
            rotation: Rotation::R0,
            pins: None,
        }
    }

    /// Supplies pins directly.
    #[must_use]
    pub fn with_pins(mut self, pins: Vec<Pin>) -> Self {
        self.pins = Some(pins);
        self
    }

    /// Sets the rotation.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// What a creation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateOutcome {
    /// A new entity was added.
    Inserted,
    /// An existing entity was changed in place.
    Updated,
    /// The entity already matched; nothing changed.
    Unchanged,
}

/// Wire routing between two pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// A single straight segment.
    #[default]
    Direct,
    /// Horizontal first, then vertical.
    OrthogonalH,
    /// Vertical first, then horizontal.
    OrthogonalV,
}

impl FromStr for Routing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "orthogonal_h" => Ok(Self::OrthogonalH),
            "orthogonal_v" => Ok(Self::OrthogonalV),
            other => Err(format!(
                "Invalid routing '{other}'. Must be one of: direct, orthogonal_h, orthogonal_v"
            )),
        }
    }
}

/// A schematic document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DocumentFile", into = "DocumentFile")]
pub struct SchematicDocument {
    /// Document title.
    pub title: String,
    symbols: IndexMap<String, SymbolDef>,
    components: IndexMap<String, Component>,
    /// Wires in document order.
    pub wires: Vec<Wire>,
    /// Net labels in document order.
    pub labels: Vec<NetLabel>,
}

/// Serialised form of a [`SchematicDocument`].
#[derive(Debug, Serialize, Deserialize)]
struct DocumentFile {
    version: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    symbols: Vec<SymbolDef>,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    wires: Vec<Wire>,
    #[serde(default)]
    labels: Vec<NetLabel>,
}

impl TryFrom<DocumentFile> for SchematicDocument {
    type Error = SchematicError;

    fn try_from(file: DocumentFile) -> SchematicResult<Self> {
        if file.version != FORMAT_VERSION {
            return Err(SchematicError::UnsupportedVersion {
                version: file.version,
            });
        }

        for symbol in &file.symbols {
            check_unique_pins(&symbol.lib_id(), &symbol.pins)?;
        }

        let mut components = IndexMap::with_capacity(file.components.len());
        for component in file.components {
            check_unique_pins(&component.lib_id(), &component.pins)?;
            let reference = component.reference.clone();
            if components.insert(reference.clone(), component).is_some() {
                return Err(SchematicError::DuplicateReference { reference });
            }
        }

        Ok(Self {
            title: file.title,
            symbols: file.symbols.into_iter().map(|s| (s.lib_id(), s)).collect(),
            components,
            wires: file.wires,
            labels: file.labels,
        })
    }
}

impl From<SchematicDocument> for DocumentFile {
    fn from(doc: SchematicDocument) -> Self {
        Self {
            version: FORMAT_VERSION,
            title: doc.title,
            symbols: doc.symbols.into_values().collect(),
            components: doc.components.into_values().collect(),
            wires: doc.wires,
            labels: doc.labels,
        }
    }
}

impl SchematicDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Opens a document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid document.
    pub fn open(path: impl AsRef<Path>) -> SchematicResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SchematicError::file_read(path, e))?;
        serde_json::from_str(&text).map_err(|e| SchematicError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Writes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> SchematicResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SchematicError::file_write(path, std::io::Error::other(e)))?;
        std::fs::write(path, json + "\n").map_err(|e| SchematicError::file_write(path, e))
    }

    /// Copies an existing file aside with a timestamp, then saves.
    ///
    /// Returns the backup path if one was made.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup or the write fails.
    pub fn save_with_backup(&self, path: impl AsRef<Path>) -> SchematicResult<Option<PathBuf>> {
        let path = path.as_ref();
        let backup = if path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            let name = path
                .file_name()
                .map_or_else(|| "schematic".into(), |n| n.to_string_lossy());
            let backup = path.with_file_name(format!("{name}.{stamp}.bak"));
            std::fs::copy(path, &backup).map_err(|e| SchematicError::file_write(&backup, e))?;
            tracing::debug!(backup = %backup.display(), "Created schematic backup");
            Some(backup)
        } else {
            None
        };
        self.save(path)?;
        Ok(backup)
    }

    /// Components in document order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Looks up a component by reference.
    #[must_use]
    pub fn component(&self, reference: &str) -> Option<&Component> {
        self.components.get(reference)
    }

    /// Number of components, templates included.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Symbol definitions in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolDef> {
        self.symbols.values()
    }

    /// Looks up a symbol definition by `library:symbol`.
    #[must_use]
    pub fn symbol(&self, lib_id: &str) -> Option<&SymbolDef> {
        self.symbols.get(lib_id)
    }

    /// Adds or replaces a symbol definition. Returns `false` if it was
    /// already identical.
    ///
    /// # Errors
    ///
    /// Returns an error if two pins share an identifier.
    pub fn define_symbol(&mut self, def: SymbolDef) -> SchematicResult<bool> {
        let lib_id = def.lib_id();
        check_unique_pins(&lib_id, &def.pins)?;
        if self.symbols.get(&lib_id) == Some(&def) {
            return Ok(false);
        }
        self.symbols.insert(lib_id, def);
        Ok(true)
    }

    /// Creates a component, or updates the existing one with the same
    /// reference.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::UnknownSymbol`] if no pins were given and the
    /// symbol is not defined, or [`SchematicError::DuplicatePin`] for
    /// repeated pin identifiers.
    pub fn upsert_component(&mut self, spec: ComponentSpec) -> SchematicResult<CreateOutcome> {
        let lib_id = format!("{}:{}", spec.library, spec.symbol);
        let pins = match spec.pins {
            Some(pins) => pins,
            None => self
                .symbols
                .get(&lib_id)
                .map(|s| s.pins.clone())
                .ok_or_else(|| SchematicError::UnknownSymbol {
                    lib_id: lib_id.clone(),
                })?,
        };
        check_unique_pins(&lib_id, &pins)?;

        let fixed = self
            .components
            .get(&spec.reference)
            .is_some_and(|c| c.fixed);
        let component = Component {
            reference: spec.reference,
            library: spec.library,
            symbol: spec.symbol,
            value: spec.value,
            footprint: spec.footprint,
            position: spec.position,
            rotation: spec.rotation,
            fixed,
            pins,
        };

        match self.components.get_mut(&component.reference) {
            Some(existing) if *existing == component => Ok(CreateOutcome::Unchanged),
            Some(existing) => {
                tracing::debug!(reference = %component.reference, "Updating existing component");
                *existing = component;
                Ok(CreateOutcome::Updated)
            }
            None => {
                self.components
                    .insert(component.reference.clone(), component);
                Ok(CreateOutcome::Inserted)
            }
        }
    }

    /// Creates a component from a template component, copying its symbol,
    /// footprint and pins.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not exist or is not a template.
    pub fn instantiate_template(
        &mut self,
        template: &str,
        reference: &str,
        value: Option<&str>,
        position: Point,
    ) -> SchematicResult<CreateOutcome> {
        let source = self
            .components
            .get(template)
            .ok_or_else(|| SchematicError::unknown_reference(template))?;
        if !source.is_template() {
            return Err(SchematicError::NotATemplate {
                reference: template.to_string(),
            });
        }

        let spec = ComponentSpec {
            reference: reference.to_string(),
            library: source.library.clone(),
            symbol: source.symbol.clone(),
            value: value.map_or_else(|| source.value.clone(), str::to_string),
            footprint: source.footprint.clone(),
            position,
            rotation: source.rotation,
            pins: Some(source.pins.clone()),
        };
        self.upsert_component(spec)
    }

    /// Removes a component, keeping the order of the rest.
    pub fn remove_component(&mut self, reference: &str) -> Option<Component> {
        self.components.shift_remove(reference)
    }

    /// Pins or unpins a component for auto-layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unknown.
    pub fn set_fixed(&mut self, reference: &str, fixed: bool) -> SchematicResult<()> {
        self.component_mut(reference)?.fixed = fixed;
        Ok(())
    }

    /// Moves a component without touching any wiring.
    ///
    /// Returns `true` if the placement changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unknown.
    pub fn move_component(
        &mut self,
        reference: &str,
        position: Point,
        rotation: Rotation,
    ) -> SchematicResult<bool> {
        let component = self.component_mut(reference)?;
        let changed = component.position != position || component.rotation != rotation;
        component.position = position;
        component.rotation = rotation;
        Ok(changed)
    }

    /// Adds a wire unless an identical one exists. Zero-length wires are
    /// ignored. Returns `true` if a wire was added.
    pub fn add_wire(&mut self, start: Point, end: Point) -> bool {
        if start == end || self.wires.iter().any(|w| w.joins(start, end)) {
            return false;
        }
        self.wires.push(Wire::new(start, end));
        true
    }

    /// Adds a net label unless the same name is already at that point.
    /// Returns `true` if a label was added.
    pub fn add_label(&mut self, name: &str, position: Point) -> bool {
        if self
            .labels
            .iter()
            .any(|l| l.name == name && l.position == position)
        {
            return false;
        }
        self.labels.push(NetLabel::new(name, position));
        true
    }

    /// Absolute coordinate of a component pin.
    ///
    /// # Errors
    ///
    /// Returns an error if the component or pin is unknown.
    pub fn pin_position(&self, reference: &str, pin: &str) -> SchematicResult<Point> {
        let component = self
            .component(reference)
            .ok_or_else(|| SchematicError::unknown_reference(reference))?;
        let p = component
            .pin(pin)
            .ok_or_else(|| SchematicError::unknown_pin(reference, pin))?;
        Ok(component.pin_position(p))
    }

    /// Wires two pins together. Returns the number of wires added.
    ///
    /// # Errors
    ///
    /// Returns an error if either pin cannot be found.
    pub fn connect_pins(
        &mut self,
        source: (&str, &str),
        target: (&str, &str),
        routing: Routing,
    ) -> SchematicResult<usize> {
        let start = self.pin_position(source.0, source.1)?;
        let end = self.pin_position(target.0, target.1)?;

        let path = match routing {
            Routing::Direct => vec![start, end],
            Routing::OrthogonalH => vec![start, Point::new(end.x, start.y), end],
            Routing::OrthogonalV => vec![start, Point::new(start.x, end.y), end],
        };

        Ok(path
            .windows(2)
            .filter(|seg| self.add_wire(seg[0], seg[1]))
            .count())
    }

    /// Attaches a pin to a named net with a short wire stub and a label.
    ///
    /// Returns `false` if the pin already belongs to the net.
    ///
    /// # Errors
    ///
    /// Returns an error if the component or pin is unknown.
    pub fn connect_to_net(&mut self, reference: &str, pin: &str, net: &str) -> SchematicResult<bool> {
        let component = self
            .component(reference)
            .ok_or_else(|| SchematicError::unknown_reference(reference))?;
        let p = component
            .pin(pin)
            .ok_or_else(|| SchematicError::unknown_pin(reference, pin))?;

        let member = PinRef::new(reference, &p.id);
        let index = NetIndex::build(self);
        if index.net_of(&member).is_some_and(|n| n.is_named(net)) {
            return Ok(false);
        }

        let start = component.pin_position(p);
        let dir = stub_direction(component.rotation.apply(Point::new(p.offset.x, -p.offset.y)));
        let end = Point::new(start.x + dir.x * STUB_LENGTH, start.y + dir.y * STUB_LENGTH);

        self.add_wire(start, end);
        self.add_label(net, end);
        Ok(true)
    }

    pub(crate) fn component_mut(&mut self, reference: &str) -> SchematicResult<&mut Component> {
        self.components
            .get_mut(reference)
            .ok_or_else(|| SchematicError::unknown_reference(reference))
    }
}

/// Unit vector pointing away from the symbol body along the pin's dominant axis.
const fn stub_direction(screen_offset: Point) -> Point {
    if screen_offset.x == 0 && screen_offset.y == 0 {
        Point::new(1, 0)
    } else if screen_offset.x.abs() >= screen_offset.y.abs() {
        Point::new(screen_offset.x.signum(), 0)
    } else {
        Point::new(0, screen_offset.y.signum())
    }
}

fn check_unique_pins(lib_id: &str, pins: &[Pin]) -> SchematicResult<()> {
    for (i, pin) in pins.iter().enumerate() {
        if pins[..i].iter().any(|p| p.id == pin.id) {
            return Err(SchematicError::DuplicatePin {
                lib_id: lib_id.to_string(),
                pin: pin.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> Point {
        Point::from_mm(x, y).unwrap()
    }

    fn resistor_pins() -> Vec<Pin> {
        vec![
            Pin::new("1", "~", pt(0.0, 3.81)),
            Pin::new("2", "~", pt(0.0, -3.81)),
        ]
    }

    fn doc_with_resistor() -> SchematicDocument {
        let mut doc = SchematicDocument::new("test");
        doc.define_symbol(SymbolDef {
            library: "Device".into(),
            symbol: "R".into(),
            pins: resistor_pins(),
        })
        .unwrap();
        doc.upsert_component(ComponentSpec::new("R1", "Device", "R", "10k", pt(10.0, 10.0)))
            .unwrap();
        doc
    }

    #[test]
    fn component_creation_is_idempotent() {
        let mut doc = doc_with_resistor();
        let before = doc.clone();
        let outcome = doc
            .upsert_component(ComponentSpec::new("R1", "Device", "R", "10k", pt(10.0, 10.0)))
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Unchanged);
        assert_eq!(doc, before);
    }

    #[test]
    fn existing_reference_is_updated_in_place() {
        let mut doc = doc_with_resistor();
        doc.upsert_component(ComponentSpec::new("C1", "Device", "R", "1k", pt(0.0, 0.0)))
            .unwrap();
        let outcome = doc
            .upsert_component(ComponentSpec::new("R1", "Device", "R", "4k7", pt(20.0, 10.0)))
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Updated);
        assert_eq!(doc.component_count(), 2);

        let refs: Vec<_> = doc.components().map(|c| c.reference.as_str()).collect();
        assert_eq!(refs, ["R1", "C1"]);
        let r1 = doc.component("R1").unwrap();
        assert_eq!(r1.value, "4k7");
        assert_eq!(r1.position, pt(20.0, 10.0));
    }

    #[test]
    fn update_keeps_fixed_flag() {
        let mut doc = doc_with_resistor();
        doc.set_fixed("R1", true).unwrap();
        doc.upsert_component(ComponentSpec::new("R1", "Device", "R", "1k", pt(10.0, 10.0)))
            .unwrap();
        assert!(doc.component("R1").unwrap().fixed);
    }

    #[test]
    fn unknown_symbol_without_pins_fails() {
        let mut doc = SchematicDocument::new("t");
        let err = doc
            .upsert_component(ComponentSpec::new("U1", "MCU", "STM32", "", Point::ZERO))
            .unwrap_err();
        assert!(matches!(err, SchematicError::UnknownSymbol { .. }));
    }

    #[test]
    fn duplicate_pin_ids_rejected() {
        let mut doc = SchematicDocument::new("t");
        let pins = vec![Pin::new("1", "", Point::ZERO), Pin::new("1", "", pt(2.54, 0.0))];
        let err = doc
            .upsert_component(ComponentSpec::new("U1", "X", "Y", "", Point::ZERO).with_pins(pins))
            .unwrap_err();
        assert!(matches!(err, SchematicError::DuplicatePin { .. }));
    }

    #[test]
    fn template_expansion_is_idempotent() {
        let mut doc = SchematicDocument::new("t");
        doc.upsert_component(
            ComponentSpec::new("_TEMPLATE_Device_C", "Device", "C", "C", Point::ZERO)
                .with_pins(resistor_pins()),
        )
        .unwrap();

        let first = doc
            .instantiate_template("_TEMPLATE_Device_C", "C1", Some("100n"), pt(20.0, 20.0))
            .unwrap();
        let second = doc
            .instantiate_template("_TEMPLATE_Device_C", "C1", Some("100n"), pt(20.0, 20.0))
            .unwrap();
        assert_eq!(first, CreateOutcome::Inserted);
        assert_eq!(second, CreateOutcome::Unchanged);
        assert_eq!(doc.component_count(), 2);
        assert_eq!(doc.component("C1").unwrap().pins.len(), 2);
    }

    #[test]
    fn instantiate_requires_template() {
        let mut doc = doc_with_resistor();
        let err = doc
            .instantiate_template("R1", "R2", None, Point::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchematicError::NotATemplate { .. }));
    }

    #[test]
    fn label_creation_is_idempotent() {
        let mut doc = SchematicDocument::new("t");
        assert!(doc.add_label("VCC", pt(5.08, 5.08)));
        assert!(!doc.add_label("VCC", pt(5.08, 5.08)));
        assert!(doc.add_label("GND", pt(5.08, 5.08)));
        assert_eq!(doc.labels.len(), 2);
    }

    #[test]
    fn wire_creation_ignores_duplicates_and_zero_length() {
        let mut doc = SchematicDocument::new("t");
        assert!(doc.add_wire(pt(0.0, 0.0), pt(2.54, 0.0)));
        assert!(!doc.add_wire(pt(2.54, 0.0), pt(0.0, 0.0)));
        assert!(!doc.add_wire(pt(1.0, 1.0), pt(1.0, 1.0)));
        assert_eq!(doc.wires.len(), 1);
    }

    #[test]
    fn pin_lookup_by_name_and_number() {
        let mut doc = SchematicDocument::new("t");
        let pins = vec![
            Pin::new("1", "VCC", pt(0.0, 2.54)),
            Pin::new("2", "GND", pt(0.0, -2.54)),
        ];
        doc.upsert_component(ComponentSpec::new("U1", "X", "Y", "", pt(10.0, 10.0)).with_pins(pins))
            .unwrap();
        assert_eq!(doc.pin_position("U1", "1").unwrap(), pt(10.0, 7.46));
        assert_eq!(doc.pin_position("U1", "GND").unwrap(), pt(10.0, 12.54));
        assert!(matches!(
            doc.pin_position("U1", "3"),
            Err(SchematicError::UnknownPin { .. })
        ));
        assert!(matches!(
            doc.pin_position("U9", "1"),
            Err(SchematicError::UnknownReference { .. })
        ));
    }

    #[test]
    fn orthogonal_routing_adds_two_segments() {
        let mut doc = doc_with_resistor();
        doc.upsert_component(ComponentSpec::new("R2", "Device", "R", "1k", pt(20.0, 20.0)))
            .unwrap();
        let added = doc
            .connect_pins(("R1", "2"), ("R2", "1"), Routing::OrthogonalH)
            .unwrap();
        assert_eq!(added, 2);
        let corner = Point::new(
            doc.pin_position("R2", "1").unwrap().x,
            doc.pin_position("R1", "2").unwrap().y,
        );
        assert!(doc.wires.iter().any(|w| w.start == corner || w.end == corner));
    }

    #[test]
    fn connect_to_net_adds_stub_and_label_once() {
        let mut doc = doc_with_resistor();
        assert!(doc.connect_to_net("R1", "1", "VCC").unwrap());
        assert!(!doc.connect_to_net("R1", "1", "VCC").unwrap());
        assert_eq!(doc.wires.len(), 1);
        assert_eq!(doc.labels.len(), 1);

        // Pin 1 sits above the body, so the stub continues upwards.
        let pin = doc.pin_position("R1", "1").unwrap();
        assert_eq!(doc.labels[0].position, Point::new(pin.x, pin.y - STUB_LENGTH));
    }

    #[test]
    fn routing_parse() {
        assert_eq!("orthogonal_v".parse::<Routing>().unwrap(), Routing::OrthogonalV);
        assert!("diagonal".parse::<Routing>().is_err());
    }

    #[test]
    fn document_rejects_duplicate_references() {
        let json = r#"{
            "version": 1,
            "components": [
                {"reference": "R1", "library": "Device", "symbol": "R", "position": {"x": 0, "y": 0}},
                {"reference": "R1", "library": "Device", "symbol": "R", "position": {"x": 5, "y": 0}}
            ]
        }"#;
        let err = serde_json::from_str::<SchematicDocument>(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate component reference"));
    }

    #[test]
    fn document_rejects_unknown_version() {
        let json = r#"{"version": 7}"#;
        assert!(serde_json::from_str::<SchematicDocument>(json).is_err());
    }
}
