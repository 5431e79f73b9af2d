//! CLI configuration management.
//!
//! Settings live in `~/.config/ferry/config.json` as a single flat JSON
//! object; command-line flags are layered on top at startup.

use std::path::{Path, PathBuf};

use ferry_http_backend::HttpBackendConfig;
use ferry_upload::UploadConfig;
use serde::{Deserialize, Serialize};

/// Unified view of the engine tunables and the backend connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FerryConfig {
    #[serde(flatten)]
    pub http: HttpBackendConfig,

    #[serde(flatten)]
    pub upload: UploadConfig,
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Base URL of the upload API.
    #[arg(long, env = "FERRY_ENDPOINT", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Bearer token for the upload API.
    #[arg(long, env = "FERRY_API_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Chunk size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Attempts per chunk before the upload fails.
    #[arg(long, value_name = "NUM")]
    pub max_retries: Option<u32>,

    /// Backoff unit between chunk attempts, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Largest accepted file, in MiB.
    #[arg(long, value_name = "MIB")]
    pub max_size_mb: Option<u64>,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl FerryConfig {
    /// Loads `~/.config/ferry/config.json`, or defaults when it is missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads from `path`. An unparsable file is logged and ignored.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<FerryConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Saves to `~/.config/ferry/config.json`.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        // The file may hold an API token.
        set_permissions_0600(path);

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line values on top of the loaded ones.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(endpoint) = &overrides.endpoint {
            self.http.endpoint = endpoint.clone();
        }
        if let Some(token) = &overrides.token {
            self.http.api_token = Some(token.clone());
        }
        if let Some(secs) = overrides.timeout {
            self.http.request_timeout_secs = Some(secs);
        }
        if let Some(bytes) = overrides.chunk_size {
            self.upload.chunk_size_bytes = bytes;
        }
        if let Some(n) = overrides.max_retries {
            self.upload.max_retries = n;
        }
        if let Some(ms) = overrides.retry_delay_ms {
            self.upload.retry_base_delay_ms = ms;
        }
        if let Some(mb) = overrides.max_size_mb {
            self.upload.max_size_mb = mb;
        }
    }

    /// Copy with the API token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.http.api_token.is_some() {
            shown.http.api_token = Some("********".into());
        }
        shown
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("ferry").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
            && !xdg.is_empty()
        {
            return Ok(PathBuf::from(xdg));
        }
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME is not set; cannot locate config directory"))?;
        Ok(PathBuf::from(home).join(".config"))
    }
}
