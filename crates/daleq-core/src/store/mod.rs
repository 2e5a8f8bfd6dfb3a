// ── Persistent property storage ──
//
// Devices given a store can read and write properties persistently.
// Entries are addressed by the device's fully-qualified id plus the
// property name; a miss is `None`.

mod file;
mod memory;

use std::fmt;

use serde_json::Value;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Backing storage for persistent property values.
pub trait Store: Send + Sync + fmt::Debug {
    fn get(&self, fqid: &[String], key: &str) -> Option<Value>;

    /// Returns whether the value was stored.
    fn set(&self, fqid: &[String], key: &str, value: Value) -> bool;
}

/// Path segment under which a device's entries live: `fractal/bus1/d3`.
pub fn device_path(fqid: &[String]) -> String {
    fqid.join("/")
}
