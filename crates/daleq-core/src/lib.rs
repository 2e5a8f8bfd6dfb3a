// daleq-core: device tree, property access and message routing.

pub mod bus;
pub mod device;
pub mod devices;
pub mod error;
pub mod node;
pub mod property;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::Bus;
pub use device::{Actuator, Device, DeviceCore, Sensor, Version, describe, dispatch_local};
pub use devices::{NoopSensor, Relay};
pub use error::CoreError;
pub use node::{Node, NodeSettings};
pub use property::{
    HasProperties, PropertyAccess, PropertyDefinition, PropertyRegistry, PropertySource,
};
pub use store::{FileStore, MemoryStore, Store};
