//! Simple configuration persistence for LUX
//!
//! Stores the rig description: pixel count, frame rate, color handling and
//! where frames are sent.

use lux_render::{ColorSpace, EngineConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Target frame rate of the render loop
    pub fps: f64,
    /// Render on a dedicated thread instead of the caller's
    pub threaded: bool,
    pub color_space: ColorSpace,
    /// Number of pixels in the strip
    pub pixels: usize,
    pub transition_ms: f64,
    pub auto_cycle_ms: f64,
    /// Output brightness, 0 to 1
    pub brightness: f64,
    pub gamma: f64,
    /// RGB byte order name, e.g. `grb`
    pub byte_order: String,
    pub artnet_host: Option<String>,
    pub kinet_host: Option<String>,
    /// Project file loaded at startup and saved on exit
    pub project: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: 60.0,
            threaded: true,
            color_space: ColorSpace::Rgb8,
            pixels: 150,
            transition_ms: 1000.0,
            auto_cycle_ms: 60_000.0,
            brightness: 1.0,
            gamma: 1.0,
            byte_order: "rgb".to_string(),
            artnet_host: None,
            kinet_host: None,
            project: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lux")
            .join("config.txt")
    }

    /// Engine settings derived from this config
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            space: self.color_space,
            fps: self.fps,
            ..EngineConfig::default()
        }
    }

    /// Parse config from simple key=value format
    ///
    /// Unknown keys are ignored; malformed values keep their default.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "fps" => parse_into(key, value, &mut config.fps),
                "threaded" => parse_into(key, value, &mut config.threaded),
                "color_space" => match ColorSpace::from_name(value) {
                    Some(space) => config.color_space = space,
                    None => warn!(key = "color_space", value, "config: bad value"),
                },
                "pixels" => parse_into(key, value, &mut config.pixels),
                "transition_ms" => parse_into(key, value, &mut config.transition_ms),
                "auto_cycle_ms" => parse_into(key, value, &mut config.auto_cycle_ms),
                "brightness" => parse_into(key, value, &mut config.brightness),
                "gamma" => parse_into(key, value, &mut config.gamma),
                "byte_order" => config.byte_order = value.to_ascii_lowercase(),
                "artnet_host" => config.artnet_host = non_empty(value).map(str::to_string),
                "kinet_host" => config.kinet_host = non_empty(value).map(str::to_string),
                "project" => config.project = non_empty(value).map(PathBuf::from),
                _ => {}
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# LUX Configuration".to_string(),
            format!("fps={}", self.fps),
            format!("threaded={}", self.threaded),
            format!("color_space={}", self.color_space.name()),
            format!("pixels={}", self.pixels),
            format!("transition_ms={}", self.transition_ms),
            format!("auto_cycle_ms={}", self.auto_cycle_ms),
            format!("brightness={}", self.brightness),
            format!("gamma={}", self.gamma),
            format!("byte_order={}", self.byte_order),
        ];
        if let Some(ref host) = self.artnet_host {
            lines.push(format!("artnet_host={host}"));
        }
        if let Some(ref host) = self.kinet_host {
            lines.push(format!("kinet_host={host}"));
        }
        if let Some(ref project) = self.project {
            lines.push(format!("project={}", project.display()));
        }
        lines.join("\n")
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value, "config: bad value"),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}
