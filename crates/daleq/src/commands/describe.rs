//! `daleq describe`: list every device of the configured tree.

use std::collections::BTreeMap;

use daleq_core::{Device, PropertyDefinition, PropertySource};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Summary ─────────────────────────────────────────────────────────

/// One device of the tree, flattened.
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub enabled: bool,
    pub labels: BTreeMap<String, String>,
    pub properties: BTreeMap<String, PropertyDefinition>,
}

impl DeviceSummary {
    fn of(device: &dyn Device) -> Self {
        Self {
            path: device.fqid().join("/"),
            kind: device.device_type().to_string(),
            version: device.version().to_string(),
            enabled: device.get_enabled(),
            labels: device.core().labels().clone(),
            properties: device.property_definitions().into_iter().collect(),
        }
    }
}

/// Depth-first, parents before their children.
pub fn walk(device: &dyn Device, out: &mut Vec<DeviceSummary>) {
    out.push(DeviceSummary::of(device));
    for child in device.children() {
        walk(&**child, out);
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Properties")]
    properties: String,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        let properties = d
            .properties
            .iter()
            .map(|(name, def)| format!("{name} ({})", def.access))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            path: d.path.clone(),
            kind: d.kind.clone(),
            version: d.version.clone(),
            enabled: if d.enabled { "yes" } else { "no" }.into(),
            properties,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::config(global)?;
    let node = util::local_node(&config)?;

    let mut devices = Vec::new();
    walk(node.root(), &mut devices);

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.path.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
