use serde::{Deserialize, Serialize};

// ── CaptureTarget ─────────────────────────────────────────────────────────────

/// What the compositor is asked to record. Resolved once per session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CaptureTarget {
    /// A single monitor, addressed by its connector name ("DP-1", "eDP-1").
    Monitor { connector: String },
    /// A toplevel window, addressed by the compositor's window id.
    Window { id: u64 },
    /// The primary desktop output.
    Desktop,
}

// ── CursorMode ────────────────────────────────────────────────────────────────

/// Cursor handling. The discriminants follow Mutter's `cursor-mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    Hidden,
    /// Cursor painted into the frames.
    Embedded,
    /// Cursor delivered as stream metadata.
    Metadata,
}

impl CursorMode {
    /// Wire value for the `cursor-mode` session property.
    pub fn to_wire(self) -> u32 {
        match self {
            Self::Hidden => 0,
            Self::Embedded => 1,
            Self::Metadata => 2,
        }
    }
}

// ── TimestampMode ─────────────────────────────────────────────────────────────

/// Frame timestamp policy, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Pipeline timestamps, monotonic nanoseconds.
    Clock,
    /// Locally incremented frame counter, starting at 0 per session.
    Counter,
}

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Full configuration for one capture session. Replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub target: CaptureTarget,
    #[serde(alias = "cursorMode")]
    pub cursor_mode: CursorMode,
    /// Target capture frame rate. A hint; the compositor decides the pace.
    #[serde(alias = "framerateHint")]
    pub framerate_hint: u32,
    #[serde(alias = "timestampMode")]
    pub timestamp_mode: TimestampMode,
    /// Synchronize frame delivery to the presentation clock instead of
    /// free-running.
    #[serde(alias = "syncToClock")]
    pub sync_to_clock: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: CaptureTarget::Desktop,
            cursor_mode: CursorMode::Embedded,
            framerate_hint: 30,
            timestamp_mode: TimestampMode::Clock,
            sync_to_clock: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_property_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.target, CaptureTarget::Desktop);
        assert_eq!(cfg.cursor_mode, CursorMode::Embedded);
        assert_eq!(cfg.framerate_hint, 30);
        assert!(!cfg.sync_to_clock);
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "target": {"kind": "monitor", "connector": "DP-1"},
            "cursorMode": "hidden",
            "framerateHint": 60,
            "timestampMode": "counter",
            "syncToClock": true
        }"#;

        let cfg: SessionConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.target, CaptureTarget::Monitor { connector: "DP-1".into() });
        assert_eq!(cfg.cursor_mode, CursorMode::Hidden);
        assert_eq!(cfg.framerate_hint, 60);
        assert_eq!(cfg.timestamp_mode, TimestampMode::Counter);
        assert!(cfg.sync_to_clock);
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let json = r#"{"target": {"kind": "window", "id": 42}}"#;

        let cfg: SessionConfig = serde_json::from_str(json).expect("valid partial config");
        assert_eq!(cfg.target, CaptureTarget::Window { id: 42 });
        assert_eq!(cfg.cursor_mode, CursorMode::Embedded);
        assert_eq!(cfg.timestamp_mode, TimestampMode::Clock);
    }

    #[test]
    fn cursor_mode_wire_values() {
        assert_eq!(CursorMode::Hidden.to_wire(), 0);
        assert_eq!(CursorMode::Embedded.to_wire(), 1);
        assert_eq!(CursorMode::Metadata.to_wire(), 2);
    }
}
