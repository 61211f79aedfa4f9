//! Read-only display/window enumeration for the host's property UI.
//!
//! These back the host's choice lists only; they never touch session state.

use std::collections::{HashMap, HashSet};

use muttercast_core::NegotiationError;
use tracing::debug;
use zbus::zvariant::OwnedValue;
use zbus::Connection;

// GetCurrentState reply pieces, per org.gnome.Mutter.DisplayConfig.
type MonitorSpec = (String, String, String, String);
type MonitorMode = (String, i32, i32, f64, f64, Vec<f64>, HashMap<String, OwnedValue>);
type Monitor = (MonitorSpec, Vec<MonitorMode>, HashMap<String, OwnedValue>);
type LogicalMonitor = (i32, i32, f64, u32, bool, Vec<MonitorSpec>, HashMap<String, OwnedValue>);

/// A monitor as reported by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    /// Connector name, the identifier `RecordMonitor` expects.
    pub connector: String,
    pub display_name: String,
    pub primary: bool,
}

/// A toplevel window as reported by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Window id, the identifier `RecordWindow` expects.
    pub id: u64,
    pub title: String,
    pub app_id: String,
}

/// Enumerate connected monitors via `org.gnome.Mutter.DisplayConfig`.
pub async fn list_monitors(connection: &Connection) -> Result<Vec<MonitorInfo>, NegotiationError> {
    let method = "GetCurrentState";
    let reply = connection
        .call_method(
            Some("org.gnome.Mutter.DisplayConfig"),
            "/org/gnome/Mutter/DisplayConfig",
            Some("org.gnome.Mutter.DisplayConfig"),
            method,
            &(),
        )
        .await
        .map_err(|e| NegotiationError::RemoteCall { method, reason: e.to_string() })?;

    let (_serial, monitors, logical, _properties): (
        u32,
        Vec<Monitor>,
        Vec<LogicalMonitor>,
        HashMap<String, OwnedValue>,
    ) = reply
        .body()
        .deserialize()
        .map_err(|e| NegotiationError::MalformedReply { method, reason: e.to_string() })?;

    let out = monitors_from_state(&monitors, &logical);
    debug!("enumerated {} monitor(s)", out.len());
    Ok(out)
}

/// Enumerate toplevel windows via `org.gnome.Shell.Introspect`.
pub async fn list_windows(connection: &Connection) -> Result<Vec<WindowInfo>, NegotiationError> {
    let method = "GetWindows";
    let reply = connection
        .call_method(
            Some("org.gnome.Shell.Introspect"),
            "/org/gnome/Shell/Introspect",
            Some("org.gnome.Shell.Introspect"),
            method,
            &(),
        )
        .await
        .map_err(|e| NegotiationError::RemoteCall { method, reason: e.to_string() })?;

    let windows: HashMap<u64, HashMap<String, OwnedValue>> = reply
        .body()
        .deserialize()
        .map_err(|e| NegotiationError::MalformedReply { method, reason: e.to_string() })?;

    let out = windows_from_map(&windows);
    debug!("enumerated {} window(s)", out.len());
    Ok(out)
}

fn string_prop(properties: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(|v| v.downcast_ref::<&str>().ok())
        .map(str::to_owned)
}

fn monitors_from_state(monitors: &[Monitor], logical: &[LogicalMonitor]) -> Vec<MonitorInfo> {
    let primaries: HashSet<&str> = logical
        .iter()
        .filter(|l| l.4)
        .flat_map(|l| l.5.iter().map(|spec| spec.0.as_str()))
        .collect();

    monitors
        .iter()
        .map(|(spec, _modes, properties)| MonitorInfo {
            connector: spec.0.clone(),
            display_name: string_prop(properties, "display-name")
                .unwrap_or_else(|| spec.0.clone()),
            primary: primaries.contains(spec.0.as_str()),
        })
        .collect()
}

fn windows_from_map(windows: &HashMap<u64, HashMap<String, OwnedValue>>) -> Vec<WindowInfo> {
    let mut out: Vec<WindowInfo> = windows
        .iter()
        .map(|(id, properties)| WindowInfo {
            id: *id,
            title: string_prop(properties, "title").unwrap_or_default(),
            app_id: string_prop(properties, "app-id")
                .or_else(|| string_prop(properties, "wm-class"))
                .unwrap_or_default(),
        })
        .collect();
    out.sort_by_key(|w| w.id);
    out
}
