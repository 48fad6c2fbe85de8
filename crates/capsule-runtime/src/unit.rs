//! Loaded units and their attribute namespaces.

use crate::finder::ArtifactKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Attribute name holding the qualified name.
pub const NAME_ATTR: &str = "__name__";
/// Attribute name holding the origin path.
pub const FILE_ATTR: &str = "__file__";
/// Attribute name holding the parent namespace name.
pub const PACKAGE_ATTR: &str = "__package__";
/// Attribute name holding the search locations of a container.
pub const PATH_ATTR: &str = "__path__";

/// Shared reference to a registered unit.
pub type UnitRef = Arc<LoadedUnit>;

/// A unit's own key/value state.
pub type Namespace = BTreeMap<String, Value>;

/// A value stored in a unit namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Null value.
    None,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    Str(String),
    /// List of values.
    List(Vec<Value>),
    /// Reference to another unit by qualified name.
    Unit(String),
}

impl Value {
    /// Borrow the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Mutable part of a unit.
#[derive(Debug, Clone, Default)]
pub struct UnitState {
    /// Display path the unit was loaded from. Diagnostics only.
    pub origin: Option<String>,

    /// Artifact kind that produced the unit, `None` for pure namespaces and builtins.
    pub kind: Option<ArtifactKind>,

    /// Whether the unit may contain child units.
    pub is_namespace_container: bool,

    /// Child directories searched for children of a container.
    pub search_locations: Vec<PathBuf>,

    /// The unit's own namespace.
    pub attributes: Namespace,
}

/// A unit owned by the registry.
#[derive(Debug)]
pub struct LoadedUnit {
    name: String,
    state: RwLock<UnitState>,
}

impl LoadedUnit {
    /// Create an empty unit whose namespace only knows its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut attributes = Namespace::new();
        attributes.insert(NAME_ATTR.to_string(), Value::Str(name.clone()));
        Self {
            name,
            state: RwLock::new(UnitState {
                attributes,
                ..Default::default()
            }),
        }
    }

    /// Create a shared empty unit.
    pub fn new_ref(name: impl Into<String>) -> UnitRef {
        Arc::new(Self::new(name))
    }

    /// Fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the qualified name.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Qualified name of the enclosing namespace, if any.
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(parent, _)| parent)
    }

    /// Record identity metadata before initialization code runs.
    pub fn bind_metadata(
        &self,
        origin: Option<String>,
        kind: Option<ArtifactKind>,
        search_locations: Option<Vec<PathBuf>>,
    ) {
        let mut state = self.state.write();
        let package = self.parent_name().unwrap_or("").to_string();

        state
            .attributes
            .insert(NAME_ATTR.to_string(), Value::Str(self.name.clone()));
        state
            .attributes
            .insert(PACKAGE_ATTR.to_string(), Value::Str(package));
        match &origin {
            Some(origin) => {
                state
                    .attributes
                    .insert(FILE_ATTR.to_string(), Value::Str(origin.clone()));
            }
            None => {
                state.attributes.remove(FILE_ATTR);
            }
        }
        if let Some(locations) = search_locations {
            let listed = locations
                .iter()
                .map(|p| Value::Str(p.display().to_string()))
                .collect();
            state
                .attributes
                .insert(PATH_ATTR.to_string(), Value::List(listed));
            state.is_namespace_container = true;
            state.search_locations = locations;
        }
        state.origin = origin;
        state.kind = kind;
    }

    /// Origin path, if the unit came from an artifact.
    pub fn origin(&self) -> Option<String> {
        self.state.read().origin.clone()
    }

    /// Replace the origin and the matching `__file__` attribute.
    pub fn set_origin(&self, origin: Option<String>) {
        let mut state = self.state.write();
        match &origin {
            Some(o) => {
                state
                    .attributes
                    .insert(FILE_ATTR.to_string(), Value::Str(o.clone()));
            }
            None => {
                state.attributes.remove(FILE_ATTR);
            }
        }
        state.origin = origin;
    }

    /// Artifact kind the unit was loaded from.
    pub fn kind(&self) -> Option<ArtifactKind> {
        self.state.read().kind
    }

    pub fn is_namespace_container(&self) -> bool {
        self.state.read().is_namespace_container
    }

    pub fn search_locations(&self) -> Vec<PathBuf> {
        self.state.read().search_locations.clone()
    }

    /// Read one attribute.
    pub fn get_attr(&self, key: &str) -> Option<Value> {
        self.state.read().attributes.get(key).cloned()
    }

    /// Write one attribute.
    pub fn set_attr(&self, key: impl Into<String>, value: Value) {
        self.state.write().attributes.insert(key.into(), value);
    }

    /// Snapshot of the whole namespace.
    pub fn attributes(&self) -> Namespace {
        self.state.read().attributes.clone()
    }

    /// Attributes set by initialization code, without identity metadata.
    pub fn user_attributes(&self) -> Namespace {
        self.state
            .read()
            .attributes
            .iter()
            .filter(|(k, _)| !(k.starts_with("__") && k.ends_with("__")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> UnitState {
        self.state.read().clone()
    }
}

/// Last dotted segment of `name`.
pub fn short_name(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, tail)| tail).unwrap_or(name)
}
