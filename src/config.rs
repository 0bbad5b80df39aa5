use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::{self, Deserializer};

use crate::catalog::SelectionMode;

pub const DEFAULT_LOCAL_PATH: &str = "~/Photos/Frame";
pub const DEFAULT_SESSION_PATH: &str = "~/.config/epaper-photo-frame/remote-session.json";
pub const DEFAULT_CACHE_PATH: &str = "~/.cache/epaper-photo-frame/remote";

/// Commented configuration written when the requested file does not exist.
pub const TEMPLATE: &str = r#"# e-paper photo frame configuration

display:
  # How often a new photo is shown.
  refresh-interval: 1h
  # Perform a full refresh every N updates (clears ghosting).
  full-refresh-every: 10
  # Palette blend handed to the panel driver (0.0 muted .. 1.0 saturated).
  saturation: 0.5
  driver:
    kind: simulator
    width: 1600
    height: 1200
    # output: /tmp/photo-frame.png

photo:
  # Folder scanned for photos (~ expands to $HOME).
  local-path: "~/Photos/Frame"
  # random | sequential
  selection-mode: random
  recursive: true
  watch: true

processing:
  # Multipliers applied before the panel quantizes the image.
  saturation: 1.3
  contrast: 1.2
  # top | center
  portrait-bias: top

remote:
  enabled: false
  # account: "someone@example.com"
  # endpoint: "https://photos.example.com/api"
  session-path: "~/.config/epaper-photo-frame/remote-session.json"
  cache-path: "~/.cache/epaper-photo-frame/remote"

logging:
  # trace | debug | info | warning | error | critical
  level: info
  # file: "/var/log/photo-frame.log"
"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayOptions {
    /// Delay between two displayed photos.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Every Nth update uses a full refresh.
    pub full_refresh_every: u64,
    /// Palette blend passed to the panel driver, 0.0..=1.0.
    pub saturation: f32,
    /// Which panel driver to detect.
    pub driver: PanelDriverConfig,
}

impl DisplayOptions {
    const fn default_refresh_interval() -> Duration {
        Duration::from_secs(3600)
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Self::default_refresh_interval(),
            full_refresh_every: 10,
            saturation: 0.5,
            driver: PanelDriverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PanelDriverConfig {
    Simulator(SimulatorOptions),
}

impl PanelDriverConfig {
    /// Resolution the driver is configured for, used when rendering
    /// without a panel attached.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Self::Simulator(sim) => (sim.width, sim.height),
        }
    }
}

impl Default for PanelDriverConfig {
    fn default() -> Self {
        Self::Simulator(SimulatorOptions::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulatorOptions {
    pub width: u32,
    pub height: u32,
    /// PNG written after every refresh, if set.
    pub output: Option<PathBuf>,
    /// Time a simulated refresh blocks for.
    #[serde(with = "humantime_serde")]
    pub refresh_delay: Duration,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 1200,
            output: None,
            refresh_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PhotoOptions {
    /// Root folder scanned for local photos.
    pub local_path: PathBuf,
    pub selection_mode: SelectionMode,
    /// Descend into subfolders.
    pub recursive: bool,
    /// Refresh automatically when files appear or disappear.
    pub watch: bool,
    /// Optional deterministic seed for random selection.
    pub selection_seed: Option<u64>,
}

impl Default for PhotoOptions {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from(DEFAULT_LOCAL_PATH),
            selection_mode: SelectionMode::Random,
            recursive: true,
            watch: true,
            selection_seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortraitBias {
    #[default]
    Top,
    Center,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ProcessingOptions {
    /// Saturation multiplier applied before quantization (1.0 = unchanged).
    pub saturation: f32,
    /// Contrast multiplier applied before quantization (1.0 = unchanged).
    pub contrast: f32,
    pub portrait_bias: PortraitBias,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            saturation: 1.3,
            contrast: 1.2,
            portrait_bias: PortraitBias::Top,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RemoteOptions {
    pub enabled: bool,
    /// Account identifier used to sign in.
    pub account: Option<String>,
    /// Base URL of the photo library gateway.
    pub endpoint: Option<String>,
    /// File holding the persisted session token.
    pub session_path: PathBuf,
    /// Folder receiving downloaded originals.
    pub cache_path: PathBuf,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            account: None,
            endpoint: None,
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    const NAMES: &'static [&'static str] =
        &["trace", "debug", "info", "warning", "error", "critical"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            // tracing has no level above error
            "error" | "critical" => Ok(Self::Error),
            _ => Err(de::Error::unknown_variant(&raw, Self::NAMES)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LoggingOptions {
    pub level: LogLevel,
    /// Optional file receiving a copy of the log output.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    pub display: DisplayOptions,
    pub photo: PhotoOptions,
    pub processing: ProcessingOptions,
    pub remote: RemoteOptions,
    pub logging: LoggingOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Writes [`TEMPLATE`] to `path`, creating parent folders.
    pub fn write_template(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, TEMPLATE)
            .with_context(|| format!("failed to write template to {}", path.display()))
    }

    /// Every range violation in the loaded values, in a stable order.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.display.refresh_interval.is_zero() {
            problems.push("display.refresh-interval must be positive".to_string());
        }
        if self.display.full_refresh_every == 0 {
            problems.push("display.full-refresh-every must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.display.saturation) {
            problems.push("display.saturation must be between 0.0 and 1.0".to_string());
        }
        let PanelDriverConfig::Simulator(sim) = &self.display.driver;
        if sim.width == 0 || sim.height == 0 {
            problems.push("display.driver width and height must be positive".to_string());
        }
        if !(self.processing.saturation.is_finite() && self.processing.saturation >= 0.0) {
            problems.push("processing.saturation must be non-negative".to_string());
        }
        if !(self.processing.contrast.is_finite() && self.processing.contrast >= 0.0) {
            problems.push("processing.contrast must be non-negative".to_string());
        }
        if self.photo.local_path.as_os_str().is_empty() {
            problems.push("photo.local-path must not be empty".to_string());
        }
        if self.remote.enabled {
            if self.remote.account.as_deref().is_none_or(|a| a.trim().is_empty()) {
                problems.push("remote.account is required when remote.enabled is true".to_string());
            }
            match self.remote.endpoint.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(_) => problems.push("remote.endpoint must be an http(s) URL".to_string()),
                None => problems
                    .push("remote.endpoint is required when remote.enabled is true".to_string()),
            }
        }
        problems
    }

    /// Rejects out-of-range values and expands `~` in every configured path.
    pub fn validated(mut self) -> Result<Self> {
        let problems = self.problems();
        if !problems.is_empty() {
            bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
        }
        self.photo.local_path = expand_home(&self.photo.local_path);
        self.remote.session_path = expand_home(&self.remote.session_path);
        self.remote.cache_path = expand_home(&self.remote.cache_path);
        self.logging.file = self.logging.file.as_deref().map(expand_home);
        let PanelDriverConfig::Simulator(sim) = &mut self.display.driver;
        sim.output = sim.output.as_deref().map(expand_home);
        Ok(self)
    }
}

/// Replaces a leading `~` with `$HOME`; other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let cfg: Configuration = serde_yaml::from_str(TEMPLATE).unwrap();
        assert_eq!(cfg.display.refresh_interval, Duration::from_secs(3600));
        assert_eq!(cfg.display.full_refresh_every, 10);
        assert_eq!(cfg.photo.selection_mode, SelectionMode::Random);
        assert_eq!(cfg.processing.portrait_bias, PortraitBias::Top);
        assert!(!cfg.remote.enabled);
        assert!(cfg.problems().is_empty());
    }

    #[test]
    fn expands_leading_tilde_only() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(
            expand_home(Path::new("~/Photos")),
            PathBuf::from(home).join("Photos")
        );
        assert_eq!(expand_home(Path::new("/srv/~x")), PathBuf::from("/srv/~x"));
    }

    #[test]
    fn log_level_accepts_python_style_names() {
        let level: LogLevel = serde_yaml::from_str("WARNING").unwrap();
        assert_eq!(level, LogLevel::Warning);
        let level: LogLevel = serde_yaml::from_str("CRITICAL").unwrap();
        assert_eq!(level, LogLevel::Error);
        assert!(serde_yaml::from_str::<LogLevel>("loud").is_err());
    }
}
