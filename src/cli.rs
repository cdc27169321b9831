// Command-line flags
//
// Every flag is optional: anything left unset keeps the value from
// config.toml (or its default).

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "tri-vk", version, about = "Vulkan triangle demo")]
pub struct Cli {
    /// Window width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Window title
    #[arg(long)]
    pub title: Option<String>,

    /// Enable Vulkan validation layers
    #[arg(long)]
    pub validation: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// GLSL (or .spv) vertex shader to load instead of the built-in one
    #[arg(long, value_name = "PATH")]
    pub vertex_shader: Option<PathBuf>,

    /// GLSL (or .spv) fragment shader to load instead of the built-in one
    #[arg(long, value_name = "PATH")]
    pub fragment_shader: Option<PathBuf>,

    /// immediate | mailbox | fifo | fifo_relaxed
    #[arg(long, value_name = "MODE")]
    pub present_mode: Option<String>,

    /// Don't watch shader files for changes
    #[arg(long)]
    pub no_hot_reload: bool,

    /// Cap the frame rate (0 = unlimited)
    #[arg(long, value_name = "FPS")]
    pub fps_limit: Option<u32>,
}
