//! Net graph builder.
//!
//! Nets are derived from geometry on demand and never stored: every pin,
//! wire endpoint and label anchor is interned by its exact document point,
//! wires union their two endpoints, and labels with the same name union
//! their points. The resulting clusters are the nets.
//!
//! Building is linear in the number of endpoints (hash interning plus
//! union-find), which matters because a layout builds the index twice.
//! A [`NetIndex`] describes one document state; rebuild it after any
//! mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::unionfind::UnionFind;
use serde::Serialize;

use super::document::SchematicDocument;
use super::geometry::Point;

/// A `(component reference, pin identifier)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PinRef {
    /// Component reference.
    pub reference: String,
    /// Pin identifier.
    pub pin: String,
}

impl PinRef {
    /// Creates a pin reference.
    #[must_use]
    pub fn new(reference: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.reference, self.pin)
    }
}

/// A derived net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Net {
    /// Canonical name.
    pub name: String,
    /// Other label names attached to the same cluster.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Whether the name comes from a label.
    pub labelled: bool,
    /// Member pins, sorted.
    pub members: BTreeSet<PinRef>,
}

impl Net {
    /// Whether `name` is this net's name or one of its aliases.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Net membership derived from one document state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetIndex {
    nets: BTreeMap<String, Net>,
    aliases: HashMap<String, String>,
    by_pin: HashMap<PinRef, String>,
}

#[derive(Default)]
struct Cluster {
    pins: BTreeSet<PinRef>,
    labels: BTreeSet<String>,
    has_wire: bool,
}

impl NetIndex {
    /// Builds the index for a document, ignoring template components.
    #[must_use]
    pub fn build(doc: &SchematicDocument) -> Self {
        Self::build_with(doc, false)
    }

    /// Builds the index, optionally counting template components' pins.
    #[must_use]
    pub fn build_with(doc: &SchematicDocument, include_templates: bool) -> Self {
        let mut points: HashMap<Point, usize> = HashMap::new();
        let mut intern = |p: Point| {
            let next = points.len();
            *points.entry(p).or_insert(next)
        };

        let pins: Vec<(PinRef, usize)> = doc
            .components()
            .filter(|c| include_templates || !c.is_template())
            .flat_map(|c| {
                c.pin_positions()
                    .map(move |(pin, at)| (PinRef::new(&c.reference, &pin.id), at))
            })
            .map(|(pin, at)| (pin, intern(at)))
            .collect();
        let wires: Vec<(usize, usize)> = doc
            .wires
            .iter()
            .map(|w| (intern(w.start), intern(w.end)))
            .collect();
        let labels: Vec<(&str, usize)> = doc
            .labels
            .iter()
            .map(|l| (l.name.as_str(), intern(l.position)))
            .collect();

        let mut sets = UnionFind::<usize>::new(points.len());
        for &(a, b) in &wires {
            sets.union(a, b);
        }
        let mut first_by_name: HashMap<&str, usize> = HashMap::new();
        for &(name, at) in &labels {
            let first = *first_by_name.entry(name).or_insert(at);
            sets.union(first, at);
        }

        let mut clusters: HashMap<usize, Cluster> = HashMap::new();
        for (pin, at) in pins {
            clusters.entry(sets.find(at)).or_default().pins.insert(pin);
        }
        for &(a, _) in &wires {
            clusters.entry(sets.find(a)).or_default().has_wire = true;
        }
        for &(name, at) in &labels {
            clusters
                .entry(sets.find(at))
                .or_default()
                .labels
                .insert(name.to_string());
        }

        let mut index = Self::default();
        let mut unlabelled = Vec::new();
        for cluster in clusters.into_values() {
            let mut names = cluster.labels.into_iter();
            match names.next() {
                Some(name) => index.insert(Net {
                    name,
                    aliases: names.collect(),
                    labelled: true,
                    members: cluster.pins,
                }),
                None if cluster.pins.len() >= 2 || (cluster.pins.len() == 1 && cluster.has_wire) => {
                    unlabelled.push(cluster.pins);
                }
                None => {}
            }
        }

        // Labelled names win any clash with a synthetic one.
        unlabelled.sort();
        for members in unlabelled {
            let Some(first) = members.first() else {
                continue;
            };
            let base = format!("Net-({}-Pad{})", first.reference, first.pin);
            let mut name = base.clone();
            let mut n = 1;
            while index.nets.contains_key(&name) || index.aliases.contains_key(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            index.insert(Net {
                name,
                aliases: Vec::new(),
                labelled: false,
                members,
            });
        }

        index
    }

    fn insert(&mut self, net: Net) {
        for alias in &net.aliases {
            self.aliases.insert(alias.clone(), net.name.clone());
        }
        for member in &net.members {
            self.by_pin.insert(member.clone(), net.name.clone());
        }
        self.nets.insert(net.name.clone(), net);
    }

    /// Nets sorted by name.
    pub fn nets(&self) -> impl Iterator<Item = &Net> {
        self.nets.values()
    }

    /// Number of nets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nets.len()
    }

    /// Whether there are no nets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// Looks up a net by name or alias.
    #[must_use]
    pub fn net(&self, name: &str) -> Option<&Net> {
        self.nets
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|n| self.nets.get(n)))
    }

    /// Members of a net, by name or alias.
    #[must_use]
    pub fn members(&self, name: &str) -> Option<&BTreeSet<PinRef>> {
        self.net(name).map(|n| &n.members)
    }

    /// The net a pin belongs to, if any.
    #[must_use]
    pub fn net_of(&self, pin: &PinRef) -> Option<&Net> {
        self.by_pin.get(pin).and_then(|n| self.nets.get(n))
    }

    /// Whether any net has a member pin.
    #[must_use]
    pub fn has_connectivity(&self) -> bool {
        self.nets.values().any(|n| !n.members.is_empty())
    }

    /// Names of nets whose membership differs between two indexes, sorted.
    ///
    /// A net missing from one side counts as having no members there.
    #[must_use]
    pub fn diff(before: &Self, after: &Self) -> Vec<String> {
        let empty = BTreeSet::new();
        let names: BTreeSet<&String> = before.nets.keys().chain(after.nets.keys()).collect();
        names
            .into_iter()
            .filter(|name| {
                let a = before.nets.get(*name).map_or(&empty, |n| &n.members);
                let b = after.nets.get(*name).map_or(&empty, |n| &n.members);
                a != b
            })
            .cloned()
            .collect()
    }
}
