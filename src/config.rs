//! Configuration types for the conversation client.

use crate::session::export::{HistoryFormat, Locale};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted for the inference credential when the
/// config file does not carry one.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Inference service settings.
    pub gateway: GatewayConfig,
    /// Camera settings.
    pub camera: CameraConfig,
    /// Session and history settings.
    pub session: SessionConfig,
}

/// Remote inference service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// API credential. When unset, `api_key_env` is read at startup.
    pub api_key: Option<String>,
    /// Environment variable holding the credential.
    pub api_key_env: String,
    /// Base URL of the Gemini REST API.
    pub base_url: String,
    /// Model used for both classification and reply generation.
    pub model: String,
    /// Upper bound for a single inference call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Per-call timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Resolve the credential: explicit value first, then the environment.
    ///
    /// Blank values are treated as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
    }
}

/// Where frames come from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSourceKind {
    /// No camera attached; every permission check fails.
    #[default]
    None,
    /// A still image on disk stands in for the camera.
    File,
    /// An HTTP snapshot endpoint (IP camera, webcam bridge).
    Snapshot,
}

/// Which camera to ask the device for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera, pointed at the person talking.
    #[default]
    User,
    /// Rear camera.
    Environment,
}

/// Camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame source.
    pub source: CameraSourceKind,
    /// Image path for [`CameraSourceKind::File`].
    pub file_path: Option<PathBuf>,
    /// Snapshot URL for [`CameraSourceKind::Snapshot`].
    pub snapshot_url: Option<String>,
    /// Preferred camera.
    pub facing: Facing,
    /// JPEG quality for captured frames (1-100).
    pub jpeg_quality: u8,
    /// Timeout for opening a stream and for grabbing one frame, in seconds.
    pub open_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSourceKind::None,
            file_path: None,
            snapshot_url: None,
            facing: Facing::User,
            jpeg_quality: 85,
            open_timeout_secs: 10,
        }
    }
}

impl CameraConfig {
    /// Stream-open timeout as a [`Duration`].
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs.max(1))
    }
}

/// Session and history export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// First assistant message shown in every session.
    pub welcome_message: String,
    /// Language used for sender labels in exported history.
    pub locale: Locale,
    /// Export format used by `/save` without an argument.
    pub export_format: HistoryFormat,
    /// Directory history files are written to (None = downloads directory).
    pub export_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            welcome_message: crate::conversation::DEFAULT_WELCOME_MESSAGE.to_owned(),
            locale: Locale::default(),
            export_format: HistoryFormat::default(),
            export_dir: None,
        }
    }
}

impl SessionConfig {
    /// Directory to export into: configured, else downloads, else cwd.
    pub fn resolved_export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl ChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/moodcam/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("moodcam").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("moodcam")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/moodcam-config/config.toml")
        }
    }
}
