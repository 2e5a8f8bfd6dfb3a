// ── Relay ──
//
// Two-state actuator. `state` is persistent: with a store attached, the
// last persisted state is restored during setup.

use serde_json::Value;
use tracing::{debug, info};

use crate::device::{Actuator, Device, DeviceCore, Version};
use crate::error::CoreError;
use crate::property::{HasProperties, PropertyRegistry};

pub const RELAY_TYPE: &str = "relay";

/// Switchable on/off output.
pub struct Relay {
    core: DeviceCore,
    properties: PropertyRegistry<Self>,
    state: bool,
    switch_count: u64,
}

impl Relay {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_core(DeviceCore::new(id))
    }

    pub fn with_core(core: DeviceCore) -> Self {
        let properties = PropertyRegistry::new(&core)
            .read_write(
                "state",
                true,
                |relay: &Relay| Value::Bool(relay.state),
                |relay: &mut Relay, value| match value {
                    Value::Bool(on) => {
                        relay.switch(on);
                        true
                    }
                    _ => false,
                },
            )
            .read_only("switch_count", false, |relay: &Relay| {
                Value::from(relay.switch_count)
            });
        Self {
            core,
            properties,
            state: false,
            switch_count: 0,
        }
    }

    pub fn is_on(&self) -> bool {
        self.state
    }

    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    fn switch(&mut self, on: bool) {
        if self.state != on {
            self.state = on;
            self.switch_count += 1;
            debug!(relay = self.id(), on, "relay switched");
        }
    }
}

impl HasProperties for Relay {
    fn properties(&self) -> &PropertyRegistry<Self> {
        &self.properties
    }
}

impl Device for Relay {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn device_type(&self) -> &str {
        RELAY_TYPE
    }

    fn version(&self) -> Version {
        Version::new(0, 1)
    }

    fn setup(&mut self) -> Result<(), CoreError> {
        match self.get("state", true) {
            Some(Value::Bool(on)) => {
                info!(relay = self.id(), on, "restored relay state");
                self.state = on;
                Ok(())
            }
            Some(other) => Err(CoreError::Setup {
                device: self.id().to_string(),
                message: format!("stored state is not a boolean: {other}"),
            }),
            None => Ok(()),
        }
    }

    /// `{"execute": "on" | "off" | "toggle"}`
    fn handle_other(&mut self, message: &Value) -> Option<Value> {
        let command = message.get("execute")?;
        Some(Value::Bool(self.execute(command)))
    }
}

impl Actuator for Relay {
    fn execute(&mut self, command: &Value) -> bool {
        match command.as_str() {
            Some("on") => self.switch(true),
            Some("off") => self.switch(false),
            Some("toggle") => self.switch(!self.state),
            _ => return false,
        }
        true
    }
}
