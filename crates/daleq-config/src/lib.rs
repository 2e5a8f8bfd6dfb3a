//! Configuration for daleq.
//!
//! TOML file + `DALEQ_*` environment, layered with figment over built-in
//! defaults, plus translation of the `[[devices]]` declarations into a
//! `daleq_core` device tree. The defaults describe the stock tree:
//! `fractal { d1, d2, bus1 { d3, bus2 { d4 } } }`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

use daleq_api::{ReconnectConfig, TopicScheme, Transport};
use daleq_core::{
    Bus, CoreError, Device, DeviceCore, FileStore, MemoryStore, Node, NodeSettings, NoopSensor,
    Relay, Store,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("device '{device}' names unknown parent '{parent}'")]
    UnknownParent { device: String, parent: String },

    #[error("device '{device}' has unknown kind '{kind}' (expected noop, relay or bus)")]
    UnknownKind { device: String, kind: String },

    #[error("device id '{id}' is declared more than once")]
    DuplicateId { id: String },

    #[error("failed to build device tree: {0}")]
    Tree(#[from] CoreError),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub store: StoreConfig,

    /// Device declarations. A non-empty list replaces the stock tree.
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceDecl>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            topics: TopicsConfig::default(),
            reconnect: ReconnectSettings::default(),
            store: StoreConfig::default(),
            devices: default_devices(),
        }
    }
}

/// Identity of this node and the broker it connects to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub id: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            host: default_host(),
            port: default_port(),
            labels: BTreeMap::new(),
        }
    }
}

fn default_node_id() -> String {
    "fractal".into()
}
fn default_host() -> String {
    "10.13.37.2".into()
}
fn default_port() -> u16 {
    1883
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TopicsConfig {
    #[serde(default = "default_topic_root")]
    pub root: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            root: default_topic_root(),
        }
    }
}

fn default_topic_root() -> String {
    daleq_api::topic::DEFAULT_ROOT.into()
}

/// Reconnect backoff, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Give up after this many failed attempts. Unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: None,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl ReconnectSettings {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
        }
    }
}

/// Where persistent property values live. In memory when `path` is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn open(&self) -> Result<Arc<dyn Store>, ConfigError> {
        match &self.path {
            Some(path) => Ok(Arc::new(FileStore::open(path)?)),
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

// ── Device declarations ─────────────────────────────────────────────

/// Device types that can be declared in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Noop,
    Relay,
    Bus,
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceDecl {
    pub id: String,

    /// "noop", "relay" or "bus".
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Id of the owning bus. The node when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Give the device access to the store.
    #[serde(default)]
    pub persistent: bool,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_kind() -> String {
    DeviceKind::Noop.to_string()
}

impl DeviceDecl {
    pub fn new(id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            parent: None,
            persistent: false,
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn device_kind(&self) -> Result<DeviceKind, ConfigError> {
        self.kind.parse().map_err(|_| ConfigError::UnknownKind {
            device: self.id.clone(),
            kind: self.kind.clone(),
        })
    }
}

fn default_devices() -> Vec<DeviceDecl> {
    vec![
        DeviceDecl::new("d1", DeviceKind::Noop),
        DeviceDecl::new("d2", DeviceKind::Noop),
        DeviceDecl::new("bus1", DeviceKind::Bus),
        DeviceDecl::new("d3", DeviceKind::Noop).under("bus1"),
        DeviceDecl::new("bus2", DeviceKind::Bus).under("bus1"),
        DeviceDecl::new("d4", DeviceKind::Noop).under("bus2"),
    ]
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Check everything that would otherwise fail half-way through
    /// building the tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment("node.id", &self.node.id)?;
        validate_segment("topics.root", &self.topics.root)?;
        if self.node.port == 0 {
            return Err(validation("node.port", "must be non-zero"));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(validation(
                "reconnect.initial_delay_ms",
                "must not exceed reconnect.max_delay_ms",
            ));
        }

        let mut kinds: HashMap<&str, DeviceKind> = HashMap::new();
        for decl in &self.devices {
            validate_segment("devices.id", &decl.id)?;
            if decl.id == self.node.id || kinds.contains_key(decl.id.as_str()) {
                return Err(ConfigError::DuplicateId {
                    id: decl.id.clone(),
                });
            }
            kinds.insert(&decl.id, decl.device_kind()?);
        }

        for decl in &self.devices {
            let Some(parent) = self.parent_of(decl) else {
                continue;
            };
            match kinds.get(parent) {
                None => {
                    return Err(ConfigError::UnknownParent {
                        device: decl.id.clone(),
                        parent: parent.to_string(),
                    });
                }
                Some(DeviceKind::Bus) => {}
                Some(kind) => {
                    return Err(validation(
                        "devices.parent",
                        &format!("'{}' is a {kind}, only buses can own devices", decl.id),
                    ));
                }
            }
        }

        self.check_reachable()
    }

    /// Parent bus id, or `None` for devices owned by the node.
    fn parent_of<'a>(&self, decl: &'a DeviceDecl) -> Option<&'a str> {
        decl.parent
            .as_deref()
            .filter(|parent| *parent != self.node.id)
    }

    /// Every declared device must hang off the node; parent cycles don't.
    fn check_reachable(&self) -> Result<(), ConfigError> {
        let parents: HashMap<&str, Option<&str>> = self
            .devices
            .iter()
            .map(|decl| (decl.id.as_str(), self.parent_of(decl)))
            .collect();

        for decl in &self.devices {
            let mut current = self.parent_of(decl);
            let mut hops = 0;
            while let Some(id) = current {
                hops += 1;
                if hops > self.devices.len() {
                    return Err(validation(
                        "devices.parent",
                        &format!("'{}' is part of a parent cycle", decl.id),
                    ));
                }
                current = parents.get(id).copied().flatten();
            }
        }
        Ok(())
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(validation(field, "must not be empty"));
    }
    if value.contains(['/', '#', '+']) {
        return Err(validation(
            field,
            &format!("'{value}' must not contain '/', '#' or '+'"),
        ));
    }
    Ok(())
}

fn validation(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Tree building ───────────────────────────────────────────────────

impl Config {
    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings::new(&self.node.host, self.node.port)
            .with_topics(TopicScheme::new(&self.topics.root))
    }

    /// Build the configured node on `transport` and run every device's
    /// setup hook.
    pub fn build_node<T: Transport>(&self, transport: T) -> Result<Node<T>, ConfigError> {
        self.validate()?;
        let store = self.store.open()?;

        let core = DeviceCore::new(&self.node.id).with_labels(self.node.labels.clone());
        let mut node = Node::with_core(core, transport, self.node_settings());
        for device in self.build_children(None, &store)? {
            node.add(device)?;
        }
        node.setup()?;

        debug!(node = %self.node.id, devices = self.devices.len(), "device tree built");
        Ok(node)
    }

    fn build_children(
        &self,
        parent: Option<&str>,
        store: &Arc<dyn Store>,
    ) -> Result<Vec<Box<dyn Device>>, ConfigError> {
        self.devices
            .iter()
            .filter(|decl| self.parent_of(decl) == parent)
            .map(|decl| self.build_device(decl, store))
            .collect()
    }

    fn build_device(
        &self,
        decl: &DeviceDecl,
        store: &Arc<dyn Store>,
    ) -> Result<Box<dyn Device>, ConfigError> {
        let mut core = DeviceCore::new(&decl.id).with_labels(decl.labels.clone());
        if decl.persistent {
            core = core.with_store(Arc::clone(store));
        }

        let device: Box<dyn Device> = match decl.device_kind()? {
            DeviceKind::Noop => Box::new(NoopSensor::with_core(core)),
            DeviceKind::Relay => Box::new(Relay::with_core(core)),
            DeviceKind::Bus => {
                let mut bus = Bus::with_core(core);
                for child in self.build_children(Some(&decl.id), store)? {
                    bus.add(child)?;
                }
                Box::new(bus)
            }
        };
        Ok(device)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "daleq", "daleq").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("daleq");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from file + environment.
///
/// `path` overrides the platform config location. A missing file leaves
/// the defaults in place.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("DALEQ_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn unknown_kind() {
        let mut config = Config::default();
        config.devices.push(DeviceDecl {
            kind: "toaster".into(),
            ..DeviceDecl::new("t1", DeviceKind::Noop)
        });
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind { ref kind, .. } if kind == "toaster"));
    }

    #[test]
    fn unknown_parent() {
        let mut config = Config::default();
        config
            .devices
            .push(DeviceDecl::new("d5", DeviceKind::Noop).under("bus9"));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParent { ref parent, .. } if parent == "bus9"));
    }

    #[test]
    fn duplicate_ids() {
        let mut config = Config::default();
        config
            .devices
            .push(DeviceDecl::new("d3", DeviceKind::Noop).under("bus2"));
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateId { .. }
        ));

        let mut config = Config::default();
        config.devices.push(DeviceDecl::new("fractal", DeviceKind::Noop));
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateId { .. }
        ));
    }

    #[test]
    fn only_buses_own_devices() {
        let mut config = Config::default();
        config
            .devices
            .push(DeviceDecl::new("d5", DeviceKind::Noop).under("d1"));
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Validation { ref field, .. } if field == "devices.parent"
        ));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let config = Config {
            devices: vec![
                DeviceDecl::new("a", DeviceKind::Bus).under("b"),
                DeviceDecl::new("b", DeviceKind::Bus).under("a"),
            ],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parent cycle"));
    }

    #[test]
    fn segments_must_be_topic_safe() {
        let mut config = Config::default();
        config.topics.root = "dev/x".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.devices.push(DeviceDecl::new("", DeviceKind::Noop));
        assert!(config.validate().is_err());
    }

    #[test]
    fn reconnect_conversion() {
        let settings = ReconnectSettings {
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            max_retries: Some(3),
        };
        let reconnect = settings.to_reconnect_config();
        assert_eq!(reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(reconnect.max_delay, Duration::from_secs(4));
        assert_eq!(reconnect.max_retries, Some(3));
    }

    #[test]
    fn node_id_as_parent_means_top_level() {
        let config = Config {
            devices: vec![DeviceDecl::new("d1", DeviceKind::Noop).under("fractal")],
            ..Config::default()
        };
        config.validate().unwrap();
        let node = config
            .build_node(daleq_api::MemoryBroker::new().transport("fractal"))
            .unwrap();
        assert_eq!(node.root().child("d1").unwrap().fqid(), ["fractal", "d1"]);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
