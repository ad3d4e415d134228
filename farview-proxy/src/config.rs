//! Configuration for the farview proxy.

use std::path::Path;
use std::time::Duration;

use farview_core::{IceServer, PacingConfig, RtcConfiguration};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Frame pacing tunables.
    pub pacing: PacingSettings,
    /// Peer transport servers.
    pub transport: TransportSettings,
    /// Globals advertised at start-up.
    pub globals: GlobalsSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Frame pacing tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Tick interval before any client reports telemetry (ms).
    pub initial_tick_ms: f64,
    /// Interval changes above this restart the timer (ms).
    pub restart_threshold_ms: u64,
    /// Callbacks park after this long without telemetry (ms).
    pub silence_timeout_ms: u64,
    /// Encoding samples kept for the server-cost average.
    pub window: usize,
}

/// Relay and discovery servers handed to every peer connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub turn_url: String,
    pub turn_username: String,
    pub turn_credential: String,
    pub stun_url: String,
}

/// Globals section: `[[globals.advertise]]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalsSettings {
    pub advertise: Vec<GlobalEntry>,
}

/// One advertised global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEntry {
    pub interface: String,
    pub version: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            initial_tick_ms: 16.667,
            restart_threshold_ms: 500,
            silence_timeout_ms: 1500,
            window: 60,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            turn_url: "turn:localhost:3478?transport=tcp".into(),
            turn_username: "farview".into(),
            turn_credential: "farview".into(),
            stun_url: "stun:stun.l.google.com:19302".into(),
        }
    }
}

impl Default for GlobalsSettings {
    fn default() -> Self {
        let entry = |interface: &str, version| GlobalEntry {
            interface: interface.into(),
            version,
        };
        Self {
            advertise: vec![
                entry("fv_compositor", 4),
                entry("fv_subcompositor", 1),
                entry("fv_seat", 6),
                entry("fv_output", 3),
                entry("fv_data_device_manager", 3),
                entry("fv_rtc_peer_connection_factory", 1),
                entry("xdg_wm_base", 2),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ProxyConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Default configuration as TOML text.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = Self::default_toml().map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert pacing settings into the scheduler's config.
    pub fn to_pacing_config(&self) -> PacingConfig {
        let p = &self.pacing;
        let tick_ms = if p.initial_tick_ms.is_finite() {
            p.initial_tick_ms.clamp(1.0, 1000.0)
        } else {
            PacingSettings::default().initial_tick_ms
        };
        PacingConfig {
            initial_tick: Duration::from_micros((tick_ms * 1000.0).round() as u64),
            restart_threshold: Duration::from_millis(p.restart_threshold_ms),
            silence_timeout: Duration::from_millis(p.silence_timeout_ms),
            window: p.window.max(1),
        }
    }

    /// Convert transport settings into a peer-connection configuration.
    pub fn to_rtc_configuration(&self) -> RtcConfiguration {
        let t = &self.transport;
        RtcConfiguration::new(
            IceServer::relay(&t.turn_url, &t.turn_username, &t.turn_credential),
            IceServer::discovery(&t.stun_url),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = ProxyConfig::default_toml().unwrap();
        assert!(text.contains("initial_tick_ms"));
        assert!(text.contains("turn_url"));
        assert!(text.contains("fv_compositor"));
    }

    #[test]
    fn roundtrip_config() {
        let text = ProxyConfig::default_toml().unwrap();
        let parsed: ProxyConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.pacing.window, 60);
        assert_eq!(parsed.pacing.silence_timeout_ms, 1500);
        assert_eq!(parsed.globals.advertise.len(), 7);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ProxyConfig = toml::from_str("[pacing]\nwindow = 30\n").unwrap();
        assert_eq!(parsed.pacing.window, 30);
        assert_eq!(parsed.pacing.restart_threshold_ms, 500);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn write_default_then_load() {
        let path = std::env::temp_dir().join(format!("farview-proxy-{}.toml", std::process::id()));
        ProxyConfig::write_default(&path).unwrap();
        let loaded = ProxyConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.to_pacing_config(), PacingConfig::default());
        assert_eq!(loaded.globals.advertise, GlobalsSettings::default().advertise);
    }

    #[test]
    fn to_pacing_config_defaults() {
        let cfg = ProxyConfig::default().to_pacing_config();
        assert_eq!(cfg, PacingConfig::default());
    }

    #[test]
    fn to_pacing_config_clamps() {
        let mut cfg = ProxyConfig::default();
        cfg.pacing.initial_tick_ms = 0.0;
        cfg.pacing.window = 0;
        let pacing = cfg.to_pacing_config();
        assert_eq!(pacing.initial_tick, Duration::from_millis(1));
        assert_eq!(pacing.window, 1);
    }

    #[test]
    fn rtc_configuration_matches_defaults() {
        assert_eq!(
            ProxyConfig::default().to_rtc_configuration(),
            RtcConfiguration::default()
        );
    }
}
