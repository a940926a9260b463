use std::time::Duration;

/// Where the gateway finds its identity and group directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryBackend {
    /// Remote directory services reached over HTTP.
    Http {
        identity_url: String,
        group_url: String,
    },
    /// In-process directories. State is lost on restart; for local runs only.
    Memory,
}

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    pub directory: DirectoryBackend,
    /// Upper bound on every single directory call.
    pub directory_timeout: Duration,
    /// Heartbeat interval advertised to clients in HELLO (ms).
    pub heartbeat_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        // Zero would make every directory call time out and every heartbeat
        // timer panic, so it falls back to the default like garbage does.
        let positive_ms = |name: &str, default: u64| {
            var(name)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(default)
        };

        let directory = match var("DIRECTORY_BACKEND").as_deref() {
            Some("memory") => DirectoryBackend::Memory,
            Some("http") | None => DirectoryBackend::Http {
                identity_url: required(&var, "IDENTITY_DIRECTORY_URL"),
                group_url: required(&var, "GROUP_DIRECTORY_URL"),
            },
            Some(other) => panic!("DIRECTORY_BACKEND must be `http` or `memory`, got `{other}`"),
        };

        Self {
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
            directory,
            directory_timeout: Duration::from_millis(positive_ms("DIRECTORY_TIMEOUT_MS", 5000)),
            heartbeat_interval_ms: positive_ms("HEARTBEAT_INTERVAL_MS", 41_250),
        }
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, name: &str) -> String {
    var(name).unwrap_or_else(|| panic!("{name} env var is required"))
}
