//! Configuration for a single MCP server child process.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to launch and tear down the MCP server child process.
///
/// A session speaks newline-delimited JSON-RPC over the child's stdio; there
/// is no multi-server fan-out and no SSE/Streamable transport, since the
/// runtime only ever talks to one tool-server process per conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpSessionConfig {
    /// Executable to spawn (e.g. `"python3"`, `"npx"`).
    pub command: String,

    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables merged into the child's environment.
    #[serde(default)]
    pub envs: HashMap<String, String>,

    /// Override the server name instead of deriving it (see [`super::naming`]).
    #[serde(default)]
    pub server_name: Option<String>,

    /// Timeout for the initial `initialize` handshake.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Grace period after requesting shutdown before escalating to SIGTERM.
    #[serde(default = "default_graceful_teardown_secs")]
    pub graceful_teardown_secs: u64,

    /// Grace period after SIGTERM before escalating to SIGKILL.
    #[serde(default = "default_force_teardown_secs")]
    pub force_teardown_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_graceful_teardown_secs() -> u64 {
    3
}

fn default_force_teardown_secs() -> u64 {
    1
}

impl McpSessionConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            envs: HashMap::new(),
            server_name: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            graceful_teardown_secs: default_graceful_teardown_secs(),
            force_teardown_secs: default_force_teardown_secs(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn graceful_teardown(&self) -> Duration {
        Duration::from_secs(self.graceful_teardown_secs)
    }

    pub fn force_teardown(&self) -> Duration {
        Duration::from_secs(self.force_teardown_secs)
    }

    /// Load configuration from a YAML file.
    pub async fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_teardown_escalation_budget() {
        let config = McpSessionConfig::new("mcp-server");
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.graceful_teardown(), Duration::from_secs(3));
        assert_eq!(config.force_teardown(), Duration::from_secs(1));
    }

    #[test]
    fn builder_sets_args() {
        let config = McpSessionConfig::new("python3").with_args(["server.py", "--port", "3000"]);
        assert_eq!(config.args, vec!["server.py", "--port", "3000"]);
    }

    #[test]
    fn yaml_minimal_config() {
        let yaml = r#"
command: "python3"
args: ["server.py"]
"#;
        let config: McpSessionConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.command, "python3");
        assert_eq!(config.args, vec!["server.py"]);
        assert_eq!(config.connect_timeout_secs, 30);
        assert!(config.server_name.is_none());
    }

    #[test]
    fn yaml_overrides_teardown_timings() {
        let yaml = r#"
command: "python3"
args: ["server.py"]
graceful_teardown_secs: 5
force_teardown_secs: 2
"#;
        let config: McpSessionConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.graceful_teardown_secs, 5);
        assert_eq!(config.force_teardown_secs, 2);
    }
}
