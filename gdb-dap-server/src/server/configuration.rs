//! The launch/attach configuration surface.
//!
//! Everything arrives as DAP request arguments (camelCase JSON); the two
//! CLI options `--config` and `--config-frozen` are deep-merged over them
//! before deserialization.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DebuggerError;

fn default_gdb() -> String {
    "gdb".to_string()
}

fn default_true() -> bool {
    true
}

fn default_stepping_timeout() -> u64 {
    250
}

/// Arguments shared by the `launch` and `attach` requests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Path to the binary to debug.
    pub program: Option<String>,

    /// Arguments passed to the inferior via `-exec-arguments`.
    pub arguments: Option<String>,

    /// Path to the GDB binary.
    #[serde(default = "default_gdb")]
    pub gdb: String,

    /// Additional command line arguments for GDB itself.
    #[serde(default)]
    pub gdb_arguments: Vec<String>,

    /// Working directory for GDB (and so for the inferior).
    pub cwd: Option<PathBuf>,

    /// Environment overrides; a null value unsets the variable.
    #[serde(default)]
    pub environment: std::collections::BTreeMap<String, Option<String>>,

    /// Log internal diagnostics at verbose level.
    #[serde(default)]
    pub verbose: bool,

    /// Write the diagnostic log to this file instead of the Debug Console.
    pub log_file: Option<PathBuf>,

    /// Default to hardware breakpoints for new source breakpoints.
    #[serde(default)]
    pub hardware_breakpoint: bool,

    /// Request MI async mode.
    #[serde(default = "default_true")]
    pub gdb_async: bool,

    /// Request non-stop mode; implies async.
    #[serde(default)]
    pub gdb_non_stop: bool,

    /// Commands run right after GDB starts.
    #[serde(default)]
    pub init_commands: Vec<String>,

    /// Commands run just before the initial `-exec-run`/`-exec-continue`.
    #[serde(default)]
    pub pre_run_commands: Vec<String>,

    /// Commands run by the custom reset request, after a silent pause.
    #[serde(default)]
    pub custom_reset_commands: Vec<String>,

    /// Milliseconds to wait for a stepping result before answering the DAP
    /// request anyway, so the UI does not stall.
    #[serde(default = "default_stepping_timeout")]
    pub stepping_response_timeout: u64,

    /// Run GDB in the client's integrated terminal through a PTY.
    #[serde(default)]
    pub open_gdb_console: bool,

    /// Image and symbol files for remote targets.
    pub image_and_symbols: Option<ImageAndSymbols>,

    /// Remote target description. When present, the session connects with
    /// `-target-select` instead of running a local inferior.
    pub target: Option<TargetConfig>,

    /// Process id for the `attach` request.
    #[serde(alias = "processId")]
    pub pid: Option<i64>,
}

impl SessionConfig {
    pub fn is_remote(&self) -> bool {
        self.target.is_some()
    }

    /// Non-stop implies async.
    pub fn wants_async(&self) -> bool {
        self.gdb_async || self.gdb_non_stop
    }

    pub fn stepping_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stepping_response_timeout)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAndSymbols {
    pub image_file_name: Option<String>,
    pub image_offset: Option<String>,
    pub symbol_file_name: Option<String>,
    pub symbol_offset: Option<String>,
}

/// Remote target parameters. Supervision of a gdbserver or a UART bridge is
/// delegated to external tooling; these fields describe how to connect and
/// are carried for that tooling's benefit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// The `-target-select` type, e.g. "remote" or "extended-remote".
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    /// Raw connection parameters, used verbatim when host/port are absent.
    #[serde(default)]
    pub parameters: Vec<String>,
    pub server: Option<String>,
    #[serde(default)]
    pub server_parameters: Vec<String>,
    pub server_port_reg_exp: Option<String>,
    pub server_startup_delay: Option<u64>,
    pub automatically_kill_server: Option<bool>,
    pub uart: Option<Value>,
}

impl TargetConfig {
    /// The connection string handed to `-target-select`.
    pub fn connect_parameters(&self) -> Option<String> {
        match (&self.host, &self.port) {
            (Some(host), Some(port)) => Some(format!("{host}:{port}")),
            _ if !self.parameters.is_empty() => Some(self.parameters.join(" ")),
            (None, Some(port)) => Some(format!("localhost:{port}")),
            _ => None,
        }
    }
}

/// CLI overrides for the request arguments.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// `--config`: merged over the request arguments.
    pub config: Option<Value>,
    /// `--config-frozen`: merged last, wins over everything.
    pub frozen: Option<Value>,
}

impl ConfigOverrides {
    /// Parse a `--config`/`--config-frozen` value: inline JSON, or
    /// `@some/file.json`.
    pub fn parse_value(raw: &str) -> Result<Value, DebuggerError> {
        let text = match raw.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).map_err(|error| {
                DebuggerError::UserMessage(format!("Cannot read config file {path:?}: {error}"))
            })?,
            None => raw.to_string(),
        };
        serde_json::from_str(&text).map_err(|error| {
            DebuggerError::UserMessage(format!("Invalid configuration JSON: {error}"))
        })
    }

    /// Apply the overrides to a request's arguments.
    pub fn apply(&self, arguments: Value) -> Value {
        let mut merged = arguments;
        if let Some(config) = &self.config {
            merged = deep_merge(merged, config.clone());
        }
        if let Some(frozen) = &self.frozen {
            merged = deep_merge(merged, frozen.clone());
        }
        merged
    }
}

/// Recursive merge: objects merge key by key, everything else is replaced
/// by the overlay. (A shallow spread would clobber nested blocks such as
/// `target`.)
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let config: SessionConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.gdb, "gdb");
        assert!(config.gdb_async);
        assert!(!config.gdb_non_stop);
        assert_eq!(config.stepping_response_timeout, 250);
    }

    #[test]
    fn non_stop_implies_async() {
        let config: SessionConfig =
            serde_json::from_value(json!({"gdbAsync": false, "gdbNonStop": true})).unwrap();
        assert!(config.wants_async());
    }

    #[test]
    fn environment_null_means_unset() {
        let config: SessionConfig =
            serde_json::from_value(json!({"environment": {"A": "1", "B": null}})).unwrap();
        assert_eq!(config.environment.get("A"), Some(&Some("1".to_string())));
        assert_eq!(config.environment.get("B"), Some(&None));
    }

    #[test]
    fn deep_merge_preserves_nested_siblings() {
        let base = json!({"target": {"host": "dev-board", "port": "3333"}, "program": "a.out"});
        let overlay = json!({"target": {"port": "4444"}});
        let merged = deep_merge(base, overlay);
        assert_eq!(
            merged,
            json!({"target": {"host": "dev-board", "port": "4444"}, "program": "a.out"})
        );
    }

    #[test]
    fn frozen_wins_over_config_and_request() {
        let overrides = ConfigOverrides {
            config: Some(json!({"gdb": "gdb-multiarch"})),
            frozen: Some(json!({"gdb": "/opt/gdb"})),
        };
        let merged = overrides.apply(json!({"gdb": "gdb", "program": "a.out"}));
        assert_eq!(merged["gdb"], "/opt/gdb");
        assert_eq!(merged["program"], "a.out");
    }

    #[test]
    fn target_connect_parameters() {
        let target: TargetConfig =
            serde_json::from_value(json!({"host": "dev", "port": "2331"})).unwrap();
        assert_eq!(target.connect_parameters().unwrap(), "dev:2331");

        let target: TargetConfig =
            serde_json::from_value(json!({"parameters": ["/dev/ttyUSB0"]})).unwrap();
        assert_eq!(target.connect_parameters().unwrap(), "/dev/ttyUSB0");

        let target: TargetConfig = serde_json::from_value(json!({"port": "2331"})).unwrap();
        assert_eq!(target.connect_parameters().unwrap(), "localhost:2331");
    }
}
