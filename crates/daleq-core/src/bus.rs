// ── Bus: composite device ──
//
// A bus owns an ordered list of child devices and fans messages out to
// them. Children keep the bus's fully-qualified id as their parent link.

use serde_json::{Map, Value};
use tracing::debug;

use crate::device::{Device, DeviceCore, Version, dispatch_local};
use crate::error::CoreError;
use crate::property::{HasProperties, PropertyRegistry};

pub const BUS_TYPE: &str = "bus";

/// A device that contains other devices.
pub struct Bus {
    core: DeviceCore,
    properties: PropertyRegistry<Self>,
    kind: &'static str,
    children: Vec<Box<dyn Device>>,
}

impl Bus {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_core(DeviceCore::new(id))
    }

    pub fn with_core(core: DeviceCore) -> Self {
        let properties = PropertyRegistry::new(&core);
        Self {
            core,
            properties,
            kind: BUS_TYPE,
            children: Vec::new(),
        }
    }

    /// Override the reported device type.
    #[must_use]
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Take ownership of `device` and link it to this bus.
    ///
    /// Fails if the device already belongs to a bus, or if a child with
    /// the same id is already present.
    pub fn add(&mut self, mut device: Box<dyn Device>) -> Result<(), CoreError> {
        if let Some(owner) = device.core().parent() {
            return Err(CoreError::AlreadyOwned {
                device: device.id().to_string(),
                owner: owner.join("/"),
            });
        }
        if self.child(device.id()).is_some() {
            return Err(CoreError::DuplicateId {
                bus: self.id().to_string(),
                id: device.id().to_string(),
            });
        }

        device.attach(self.fqid());
        debug!(bus = self.id(), device = device.id(), "device added");
        self.children.push(device);
        Ok(())
    }

    pub fn child(&self, id: &str) -> Option<&dyn Device> {
        self.children
            .iter()
            .find(|child| child.id() == id)
            .map(|child| &**child)
    }

    pub fn child_mut(&mut self, id: &str) -> Option<&mut (dyn Device + 'static)> {
        self.children
            .iter_mut()
            .find(|child| child.id() == id)
            .map(|child| &mut **child)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl HasProperties for Bus {
    fn properties(&self) -> &PropertyRegistry<Self> {
        &self.properties
    }
}

impl Device for Bus {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn device_type(&self) -> &str {
        self.kind
    }

    fn version(&self) -> Version {
        Version::new(0, 1)
    }

    fn children(&self) -> &[Box<dyn Device>] {
        &self.children
    }

    fn setup(&mut self) -> Result<(), CoreError> {
        for child in &mut self.children {
            child.setup()?;
        }
        Ok(())
    }

    fn attach(&mut self, parent_fqid: Vec<String>) {
        self.core.set_parent(parent_fqid);
        let fqid = self.fqid();
        for child in &mut self.children {
            child.attach(fqid.clone());
        }
    }

    /// `{own_id: own_answer, child_id: child_answer, ..}`.
    ///
    /// Children are consulted when the target is empty or starts with
    /// this bus's id; they see the target with that head removed.
    fn handle(&mut self, target: &[String], message: &Value) -> Option<Value> {
        let id = self.id().to_string();
        let mut result = Map::new();
        let own = dispatch_local(self, target, message);
        result.insert(id.clone(), own.unwrap_or(Value::Null));

        if target.first().is_none_or(|head| *head == id) {
            let rest = target.get(1..).unwrap_or_default();
            for child in &mut self.children {
                let answer = child.handle(rest, message);
                result.insert(child.id().to_string(), answer.unwrap_or(Value::Null));
            }
        }

        Some(Value::Object(result))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::devices::NoopSensor;

    fn target(path: &[&str]) -> Vec<String> {
        path.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn add_links_parent() {
        let mut bus = Bus::new("bus1");
        bus.add(Box::new(NoopSensor::new("d3"))).unwrap();

        assert_eq!(bus.len(), 1);
        assert_eq!(bus.child("d3").unwrap().fqid(), ["bus1", "d3"]);
    }

    #[test]
    fn attaching_a_bus_relinks_descendants() {
        let mut inner = Bus::new("bus2");
        inner.add(Box::new(NoopSensor::new("d4"))).unwrap();
        let mut outer = Bus::new("bus1");
        outer.add(Box::new(inner)).unwrap();

        let bus2 = outer.child("bus2").map(|bus| bus.fqid()).unwrap();
        assert_eq!(bus2, ["bus1", "bus2"]);

        let mut root = Bus::new("fractal");
        root.add(Box::new(outer)).unwrap();
        let answer = root
            .handle(&target(&["fractal", "bus1", "bus2", "d4"]), &json!({"describe": null}))
            .unwrap();
        assert_eq!(answer["bus1"]["bus2"]["d4"]["id"], json!("d4"));
    }

    #[test]
    fn owned_device_is_rejected() {
        let mut device = NoopSensor::new("d1");
        device.attach(target(&["elsewhere"]));

        let mut bus = Bus::new("bus1");
        let err = bus.add(Box::new(device)).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyOwned { ref owner, .. } if owner == "elsewhere"));
        assert!(bus.is_empty());
    }

    #[test]
    fn duplicate_sibling_id_is_rejected() {
        let mut bus = Bus::new("bus1");
        bus.add(Box::new(NoopSensor::new("d1"))).unwrap();
        let err = bus.add(Box::new(NoopSensor::new("d1"))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut bus = Bus::new("bus1");
        for id in ["c", "a", "b"] {
            bus.add(Box::new(NoopSensor::new(id))).unwrap();
        }
        let ids: Vec<_> = bus.children().iter().map(|child| child.id()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn fan_out_on_empty_target() {
        let mut bus = Bus::new("bus1");
        bus.add(Box::new(NoopSensor::new("d3"))).unwrap();

        let answer = bus.handle(&[], &json!({"get": "enabled"})).unwrap();
        assert_eq!(answer, json!({"bus1": true, "d3": true}));
    }

    #[test]
    fn other_head_skips_children() {
        let mut bus = Bus::new("bus1");
        bus.add(Box::new(NoopSensor::new("d3"))).unwrap();

        let answer = bus.handle(&target(&["d3"]), &json!({"get": "enabled"})).unwrap();
        assert_eq!(answer, json!({"bus1": null}));
    }

    #[test]
    fn child_mut_reaches_device() {
        let mut bus = Bus::new("bus1");
        bus.add(Box::new(NoopSensor::new("d3"))).unwrap();

        assert!(bus.child_mut("d3").unwrap().set("enabled", json!(false), false));
        assert_eq!(bus.child("d3").unwrap().get("enabled", false), Some(json!(false)));
        assert!(bus.child_mut("nope").is_none());
    }

    #[test]
    fn kind_override() {
        let node = Bus::new("fractal").with_kind("node");
        assert_eq!(node.device_type(), "node");
        assert_eq!(Bus::new("b").device_type(), BUS_TYPE);
    }
}
