use serde_json::Value;

use crate::device::{Device, DeviceCore, Sensor, Version};
use crate::property::{HasProperties, PropertyRegistry};

pub const NOOP_TYPE: &str = "noop";

/// Placeholder sensor. Every reading is `"test"`.
pub struct NoopSensor {
    core: DeviceCore,
    properties: PropertyRegistry<Self>,
}

impl NoopSensor {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_core(DeviceCore::new(id))
    }

    pub fn with_core(core: DeviceCore) -> Self {
        let properties = PropertyRegistry::new(&core);
        Self { core, properties }
    }
}

impl HasProperties for NoopSensor {
    fn properties(&self) -> &PropertyRegistry<Self> {
        &self.properties
    }
}

impl Device for NoopSensor {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn device_type(&self) -> &str {
        NOOP_TYPE
    }

    fn version(&self) -> Version {
        Version::new(0, 1)
    }

    /// `{"read": _}`
    fn handle_other(&mut self, message: &Value) -> Option<Value> {
        message.get("read").map(|_| self.read())
    }
}

impl Sensor for NoopSensor {
    fn read(&self) -> Value {
        Value::from("test")
    }
}
