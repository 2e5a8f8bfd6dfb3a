// ── Device abstraction ──
//
// A device is an addressable node of the tree: it answers describe / get /
// set requests against its property registry, and leaves anything else to
// its concrete type through `handle_other`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CoreError;
use crate::property::PropertySource;
use crate::store::Store;

// ── Version ──────────────────────────────────────────────────────────

/// Implementation version of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── DeviceCore ───────────────────────────────────────────────────────

/// State shared by every device type.
pub struct DeviceCore {
    id: String,
    /// Fully-qualified id of the owning bus, once attached.
    parent: Option<Vec<String>>,
    enabled: bool,
    labels: BTreeMap<String, String>,
    store: Option<Arc<dyn Store>>,
}

impl DeviceCore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            enabled: true,
            labels: BTreeMap::new(),
            store: None,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&[String]> {
        self.parent.as_deref()
    }

    pub fn fqid(&self) -> Vec<String> {
        let mut fqid = self.parent.clone().unwrap_or_default();
        fqid.push(self.id.clone());
        fqid
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    /// Whether the device was given a store.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) fn set_parent(&mut self, parent_fqid: Vec<String>) {
        self.parent = Some(parent_fqid);
    }
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("enabled", &self.enabled)
            .field("labels", &self.labels)
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

// ── Device trait ─────────────────────────────────────────────────────

/// An addressable element of the device tree.
///
/// Concrete types supply [`core`](Device::core), their identity, and a
/// property registry (through [`HasProperties`](crate::HasProperties)).
/// Everything else has a working default.
pub trait Device: PropertySource + Send {
    fn core(&self) -> &DeviceCore;

    fn core_mut(&mut self) -> &mut DeviceCore;

    fn device_type(&self) -> &str;

    fn version(&self) -> Version;

    /// One-time initialisation, run over the whole tree before serving.
    fn setup(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    /// Ancestor ids followed by this device's id.
    fn fqid(&self) -> Vec<String> {
        self.core().fqid()
    }

    /// Record the owning bus. Called by [`Bus::add`](crate::Bus::add);
    /// buses override it to relink their descendants.
    fn attach(&mut self, parent_fqid: Vec<String>) {
        self.core_mut().set_parent(parent_fqid);
    }

    /// Owned devices, in insertion order. Empty for leaves.
    fn children(&self) -> &[Box<dyn Device>] {
        &[]
    }

    fn get_enabled(&self) -> bool {
        self.core().enabled
    }

    fn set_enabled(&mut self, enabled: bool) -> bool {
        self.core_mut().enabled = enabled;
        true
    }

    /// Read a property, transiently or from the store.
    fn get(&self, key: &str, persistent: bool) -> Option<Value> {
        let definition = self.property_definition(key)?;
        if !definition.can_read() {
            return None;
        }
        if persistent {
            let store = self.core().store()?;
            store.get(&self.fqid(), key)
        } else {
            self.read_transient(key)
        }
    }

    /// Write a property, transiently or to the store.
    fn set(&mut self, key: &str, value: Value, persistent: bool) -> bool {
        let Some(definition) = self.property_definition(key) else {
            return false;
        };
        if !definition.can_write() {
            return false;
        }
        if persistent {
            match self.core().store() {
                Some(store) => store.set(&self.fqid(), key, value),
                None => false,
            }
        } else {
            self.write_transient(key, value)
        }
    }

    fn handle(&mut self, target: &[String], message: &Value) -> Option<Value> {
        dispatch_local(self, target, message)
    }

    fn handle_describe(&self, _argument: &Value) -> Option<Value> {
        Some(describe(self))
    }

    /// `"key"` or `{"key": .., "persistent": ..}`.
    fn handle_get(&self, argument: &Value) -> Option<Value> {
        match argument {
            Value::String(key) => self.get(key, false),
            Value::Object(request) => {
                let key = request.get("key")?.as_str()?;
                self.get(key, flag(request, "persistent"))
            }
            _ => None,
        }
    }

    /// `{"key": .., "value": .., "persistent": ..}`.
    fn handle_set(&mut self, argument: &Value) -> Option<Value> {
        let Value::Object(request) = argument else {
            return None;
        };
        let accepted = match request.get("key").and_then(Value::as_str) {
            Some(key) => {
                let value = request.get("value").cloned().unwrap_or(Value::Null);
                self.set(key, value, flag(request, "persistent"))
            }
            None => false,
        };
        Some(Value::Bool(accepted))
    }

    /// Messages that are neither describe, get nor set.
    fn handle_other(&mut self, _message: &Value) -> Option<Value> {
        None
    }
}

// ── Role capabilities ────────────────────────────────────────────────

/// A device that produces readings.
pub trait Sensor: Device {
    fn read(&self) -> Value;
}

/// A device that carries out commands.
pub trait Actuator: Device {
    fn execute(&mut self, command: &Value) -> bool;
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// Answer a message addressed to `device` itself.
///
/// The device is addressed when `target` is empty or exactly `[id]`.
/// Object messages route on their first recognised key in the order
/// `describe`, `get`, `set`; anything else goes to `handle_other`.
pub fn dispatch_local<D: Device + ?Sized>(
    device: &mut D,
    target: &[String],
    message: &Value,
) -> Option<Value> {
    let addressed = match target {
        [] => true,
        [only] => only == device.id(),
        _ => false,
    };
    if !addressed {
        return None;
    }

    let Value::Object(request) = message else {
        debug!(device = device.id(), "ignoring non-object message");
        return None;
    };

    if let Some(argument) = request.get("describe") {
        device.handle_describe(argument)
    } else if let Some(argument) = request.get("get") {
        device.handle_get(argument)
    } else if let Some(argument) = request.get("set") {
        device.handle_set(argument)
    } else {
        device.handle_other(message)
    }
}

/// `{id, type, labels, properties}` description of a device.
pub fn describe<D: Device + ?Sized>(device: &D) -> Value {
    let properties: Map<String, Value> = device
        .property_definitions()
        .into_iter()
        .map(|(name, definition)| (name, definition.to_json()))
        .collect();
    let labels: Map<String, Value> = device
        .core()
        .labels()
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    serde_json::json!({
        "id": device.id(),
        "type": device.device_type(),
        "labels": labels,
        "properties": properties,
    })
}

/// Truthiness of an optional request field: absent, `null`, `false`, zero
/// and empty strings or containers are false, everything else is true.
fn flag(request: &Map<String, Value>, key: &str) -> bool {
    match request.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}
