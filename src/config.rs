// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is optional. A missing file means defaults, a broken file
// means defaults plus a warning. Command-line flags are layered on top with
// `Config::apply_cli`.

use crate::cli::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `graphics.max_frames_in_flight`
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// 0 = unlimited
    pub fps_limit: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.2, 1.0],
            max_frames_in_flight: 2,
            fps_limit: 0,
        }
    }
}

/// Shader sources and hot-reload
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// None = built-in vertex shader
    pub vertex: Option<PathBuf>,
    /// None = built-in fragment shader
    pub fragment: Option<PathBuf>,
    pub hot_reload: bool,
    /// Use a polling watcher instead of OS notifications
    pub poll: bool,
    pub poll_interval_ms: u64,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: None,
            fragment: None,
            hot_reload: true,
            poll: false,
            poll_interval_ms: 500,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub verbose: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: false,
            verbose: false,
            log_to_file: false,
            log_file: "tri-vk.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// `Ok(None)` means there is no file there and defaults apply. Nothing is
    /// logged here; the caller reports the outcome once logging is set up.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Layer command-line flags over the file configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(width) = cli.width {
            self.window.width = width;
        }
        if let Some(height) = cli.height {
            self.window.height = height;
        }
        if let Some(ref title) = cli.title {
            self.window.title = title.clone();
        }
        if let Some(ref mode) = cli.present_mode {
            self.graphics.present_mode = mode.clone();
        }
        if let Some(limit) = cli.fps_limit {
            self.graphics.fps_limit = limit;
        }
        if let Some(ref path) = cli.vertex_shader {
            self.shaders.vertex = Some(path.clone());
        }
        if let Some(ref path) = cli.fragment_shader {
            self.shaders.fragment = Some(path.clone());
        }
        // Switches only turn things on (or hot reload off)
        self.debug.validation_layers |= cli.validation;
        self.debug.verbose |= cli.debug;
        if cli.no_hot_reload {
            self.shaders.hot_reload = false;
        }
    }

    /// Frames in flight, clamped to something the renderer can use
    pub fn frames_in_flight(&self) -> usize {
        self.graphics
            .max_frames_in_flight
            .clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT)
    }

    /// Poll interval for the shader watcher, or None for native notifications
    pub fn watcher_poll_interval(&self) -> Option<Duration> {
        self.shaders
            .poll
            .then(|| Duration::from_millis(self.shaders.poll_interval_ms.max(50)))
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan Triangle");
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert!(config.shaders.hot_reload);
        assert!(config.shaders.vertex.is_none());
        assert!(!config.debug.validation_layers);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [window]
            width = 1920

            [shaders]
            fragment = "shaders/plasma.frag"
            poll = true
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 600);
        assert_eq!(
            config.shaders.fragment,
            Some(PathBuf::from("shaders/plasma.frag"))
        );
        assert_eq!(
            config.watcher_poll_interval(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Config::from_toml("[window\nwidth = ").is_err());
    }

    #[test]
    fn missing_file_is_reported_as_absent() {
        let loaded = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn existing_file_is_loaded_or_rejected() {
        let dir = std::env::temp_dir().join(format!("tri-vk-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        std::fs::write(&good, "[window]\nwidth = 1024\n").unwrap();
        let config = Config::load_from_path(&good).unwrap().unwrap();
        assert_eq!(config.window.width, 1024);

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "[window\n").unwrap();
        let err = Config::load_from_path(&bad).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.toml"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut config = Config::from_toml("[window]\nwidth = 1920\ntitle = \"file\"").unwrap();
        let cli = Cli {
            width: Some(640),
            title: Some("cli".to_string()),
            validation: true,
            debug: true,
            no_hot_reload: true,
            fps_limit: Some(30),
            vertex_shader: Some(PathBuf::from("a.vert")),
            ..Default::default()
        };
        config.apply_cli(&cli);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "cli");
        assert!(config.debug.validation_layers);
        assert!(config.debug.verbose);
        assert!(!config.shaders.hot_reload);
        assert_eq!(config.graphics.fps_limit, 30);
        assert_eq!(config.shaders.vertex, Some(PathBuf::from("a.vert")));
    }

    #[test]
    fn unset_switches_do_not_turn_file_settings_off() {
        let mut config = Config::from_toml("[debug]\nvalidation_layers = true").unwrap();
        config.apply_cli(&Cli::default());
        assert!(config.debug.validation_layers);
        assert!(config.shaders.hot_reload);
    }

    #[test]
    fn present_mode_names_map_to_vulkan() {
        let mut config = Config::default();
        for (name, mode) in [
            ("immediate", vk::PresentModeKHR::IMMEDIATE),
            ("MAILBOX", vk::PresentModeKHR::MAILBOX),
            ("fifo", vk::PresentModeKHR::FIFO),
            ("fifo_relaxed", vk::PresentModeKHR::FIFO_RELAXED),
            ("vsync-please", vk::PresentModeKHR::FIFO),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.present_mode(), mode, "{name}");
        }
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
        config.graphics.max_frames_in_flight = 16;
        assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT_LIMIT);
    }
}
