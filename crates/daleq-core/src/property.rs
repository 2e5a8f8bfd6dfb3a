// ── Property model ──
//
// Every device exposes a set of named properties. A property's definition
// says whether it can be read, written, or both, and whether it is eligible
// for persistent storage. The accessors behind a property are registered
// per device type as plain function pointers, so a readable property always
// has a getter and a writable one always has a setter.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::device::{Device, DeviceCore};

/// Name of the property every device carries.
pub const ENABLED: &str = "enabled";

// ── Definitions ──────────────────────────────────────────────────────

/// Access policy of a property, serialized as its short code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum PropertyAccess {
    #[serde(rename = "r")]
    #[strum(serialize = "r")]
    ReadOnly,
    #[serde(rename = "w")]
    #[strum(serialize = "w")]
    WriteOnly,
    #[serde(rename = "rw")]
    #[strum(serialize = "rw")]
    ReadWrite,
}

impl PropertyAccess {
    pub const fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub const fn can_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Access policy plus persistence eligibility of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub access: PropertyAccess,
    pub persistent: bool,
}

impl PropertyDefinition {
    pub const fn new(access: PropertyAccess, persistent: bool) -> Self {
        Self { access, persistent }
    }

    pub const fn can_read(&self) -> bool {
        self.access.can_read()
    }

    pub const fn can_write(&self) -> bool {
        self.access.can_write()
    }

    /// `{"access": "r"|"w"|"rw", "persistent": bool}`
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "access": self.access.as_ref(),
            "persistent": self.persistent,
        })
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Transient read accessor.
pub type Getter<D> = fn(&D) -> Value;

/// Transient write accessor. Returns whether the value was accepted.
pub type Setter<D> = fn(&mut D, Value) -> bool;

struct Entry<D> {
    definition: PropertyDefinition,
    getter: Option<Getter<D>>,
    setter: Option<Setter<D>>,
}

/// Property table of one device type, in registration order.
///
/// Built once at construction:
///
/// ```rust,ignore
/// let properties = PropertyRegistry::new(&core)
///     .read_write("state", true, |r: &Relay| r.state.into(), Relay::write_state)
///     .read_only("switch_count", false, |r: &Relay| r.switch_count.into());
/// ```
pub struct PropertyRegistry<D> {
    entries: IndexMap<String, Entry<D>>,
}

impl<D> PropertyRegistry<D> {
    /// A registry without any properties, not even `enabled`.
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn read_only(self, name: impl Into<String>, persistent: bool, getter: Getter<D>) -> Self {
        self.insert(name, PropertyAccess::ReadOnly, persistent, Some(getter), None)
    }

    pub fn write_only(self, name: impl Into<String>, persistent: bool, setter: Setter<D>) -> Self {
        self.insert(name, PropertyAccess::WriteOnly, persistent, None, Some(setter))
    }

    pub fn read_write(
        self,
        name: impl Into<String>,
        persistent: bool,
        getter: Getter<D>,
        setter: Setter<D>,
    ) -> Self {
        self.insert(
            name,
            PropertyAccess::ReadWrite,
            persistent,
            Some(getter),
            Some(setter),
        )
    }

    fn insert(
        mut self,
        name: impl Into<String>,
        access: PropertyAccess,
        persistent: bool,
        getter: Option<Getter<D>>,
        setter: Option<Setter<D>>,
    ) -> Self {
        self.entries.insert(
            name.into(),
            Entry {
                definition: PropertyDefinition::new(access, persistent),
                getter,
                setter,
            },
        );
        self
    }

    pub fn definition(&self, name: &str) -> Option<PropertyDefinition> {
        self.entries.get(name).map(|entry| entry.definition)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, PropertyDefinition)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.definition))
    }

    pub fn getter(&self, name: &str) -> Option<Getter<D>> {
        self.entries.get(name).and_then(|entry| entry.getter)
    }

    pub fn setter(&self, name: &str) -> Option<Setter<D>> {
        self.entries.get(name).and_then(|entry| entry.setter)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<D: Device> PropertyRegistry<D> {
    /// A registry seeded with the built-in `enabled` property.
    ///
    /// `enabled` is persistent exactly when the device was given a store.
    pub fn new(core: &DeviceCore) -> Self {
        Self::empty().read_write(
            ENABLED,
            core.is_persistent(),
            |device: &D| Value::Bool(device.get_enabled()),
            |device: &mut D, value| match value {
                Value::Bool(enabled) => device.set_enabled(enabled),
                _ => false,
            },
        )
    }
}

// ── Object-safe access ───────────────────────────────────────────────

/// Implemented by device types that own a [`PropertyRegistry`].
pub trait HasProperties: Sized {
    fn properties(&self) -> &PropertyRegistry<Self>;
}

/// Type-erased view of a device's properties, usable through `dyn Device`.
pub trait PropertySource {
    fn property_definition(&self, key: &str) -> Option<PropertyDefinition>;

    fn property_definitions(&self) -> Vec<(String, PropertyDefinition)>;

    /// Run the registered getter, ignoring the access policy.
    fn read_transient(&self, key: &str) -> Option<Value>;

    /// Run the registered setter, ignoring the access policy.
    fn write_transient(&mut self, key: &str, value: Value) -> bool;
}

impl<D: HasProperties> PropertySource for D {
    fn property_definition(&self, key: &str) -> Option<PropertyDefinition> {
        self.properties().definition(key)
    }

    fn property_definitions(&self) -> Vec<(String, PropertyDefinition)> {
        self.properties()
            .definitions()
            .map(|(name, definition)| (name.to_string(), definition))
            .collect()
    }

    fn read_transient(&self, key: &str) -> Option<Value> {
        let getter = self.properties().getter(key)?;
        Some(getter(self))
    }

    fn write_transient(&mut self, key: &str, value: Value) -> bool {
        match self.properties().setter(key) {
            Some(setter) => setter(self, value),
            None => false,
        }
    }
}
