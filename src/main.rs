// =============================================================================
// VULKAN TRIANGLE - minimal ash + winit renderer with shader hot-reload
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler: window, input, frame pacing)    │
// │    ├── ShaderWatcher (notify thread -> dirty flag)              │
// │    └── Renderer                                                 │
// │          └── Vulkan Device + Swapchain                          │
// │                └── Pipeline + Command Buffers                   │
// │                      └── Synchronization (fences, semaphores)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Check the shader watcher, rebuild the pipeline if sources changed
// 2. Wait for this frame slot's fence
// 3. Acquire swapchain image
// 4. Record + submit the triangle draw
// 5. Present rendered image to screen
//
// =============================================================================

mod backend;
mod cli;
mod config;
mod hot_reload;
mod renderer;
mod timing;
mod vertex;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Config;
use hot_reload::ShaderWatcher;
use renderer::{FrameOutcome, Renderer};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use timing::{FpsCounter, FrameLimiter, Pacing};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging depends on the config, so how loading went is reported once it is up
    let (mut config, loaded) = match Config::load_from_path(&cli.config) {
        Ok(Some(config)) => (config, Ok(true)),
        Ok(None) => (Config::default(), Ok(false)),
        Err(e) => (Config::default(), Err(e)),
    };
    config.apply_cli(&cli);

    init_logging(&config);
    match loaded {
        Ok(true) => {
            log::info!("Loaded configuration from {:?}", cli.config);
            log::debug!("Config: {:?}", config);
        }
        Ok(false) => log::info!("Config file not found at {:?}, using defaults", cli.config),
        Err(e) => log::warn!("{:#}. Using defaults.", e),
    }

    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Present mode: {}, validation: {}",
        config.graphics.present_mode,
        config.debug.validation_layers
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.exit_result()
}

/// Initialize logging, optionally mirroring everything into a file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let level = if config.debug.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // RUST_LOG still wins over the configured level
    let mut builder = Builder::new();
    builder.filter_level(level).parse_default_env();

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

/// Writes every log record to stderr and the log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Window + renderer + input handling.
///
/// IMPORTANT: Field order matters for Drop! The renderer owns the surface,
/// which must be destroyed before the window it was created from.
struct App {
    renderer: Option<Renderer>,
    watcher: Option<ShaderWatcher>,
    window: Option<Arc<Window>>,

    config: Config,
    is_fullscreen: bool,

    fps: FpsCounter,
    limiter: FrameLimiter,

    /// First fatal error; reported as the process exit status
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let limiter = FrameLimiter::new(config.graphics.fps_limit);
        if limiter.is_limited() {
            log::info!("Frame rate capped at {} FPS", config.graphics.fps_limit);
        }
        Self {
            renderer: None,
            watcher: None,
            window: None,
            config,
            is_fullscreen,
            fps: FpsCounter::new(Instant::now()),
            limiter,
            fatal: None,
        }
    }

    fn exit_result(&mut self) -> Result<()> {
        match self.fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Log a fatal error and stop the event loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    fn start_watcher(&mut self) {
        if !self.config.shaders.hot_reload {
            return;
        }
        let Some(ref renderer) = self.renderer else {
            return;
        };

        let paths = renderer.shader_paths();
        if paths.is_empty() {
            log::debug!("Built-in shaders only, hot-reload not needed");
            return;
        }

        match ShaderWatcher::new(&paths, self.config.watcher_poll_interval()) {
            Ok(watcher) => {
                log::info!("Hot-reload enabled for {} shader file(s)", watcher.files().len());
                self.watcher = Some(watcher);
            }
            Err(e) => log::warn!("Shader hot-reload disabled: {:#}", e),
        }
    }

    fn reload_shaders(&mut self) -> Result<()> {
        if let Some(ref mut renderer) = self.renderer {
            renderer.reload_shaders()?;
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let changed = self.watcher.as_ref().is_some_and(|w| w.take_changed());
        if changed {
            self.reload_shaders()?;
        }

        let Some(ref mut renderer) = self.renderer else {
            return Ok(());
        };

        let now = Instant::now();
        self.limiter.frame_started(now);

        if renderer.draw_frame()? == FrameOutcome::Rendered {
            self.update_fps(now);
        }
        Ok(())
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // The resulting Resized event triggers swapchain recreation
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self, now: Instant) {
        if !self.config.debug.show_fps {
            return;
        }

        if let Some(sample) = self.fps.tick(now) {
            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title, sample.fps, sample.frame_ms, mode
                ));
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
        self.start_watcher();
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::warn!("wait_idle before exit failed: {:#}", e);
                    }
                }
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            // ESC - Quit application
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            // F11 - Toggle fullscreen
                            KeyCode::F11 => self.toggle_fullscreen(),
                            // R - Reload shaders by hand
                            KeyCode::KeyR => {
                                if let Err(e) = self.reload_shaders() {
                                    self.fail(event_loop, e);
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Uncapped: redraw continuously. Capped: sleep until the next frame is due.
    /// Minimized: block until the next event (a resize brings it back).
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ref window) = self.window else {
            return;
        };

        let minimized = self.renderer.as_ref().is_some_and(Renderer::is_minimized);
        match self.limiter.pacing(Instant::now(), minimized) {
            Pacing::Idle => event_loop.set_control_flow(ControlFlow::Wait),
            Pacing::Sleep(deadline) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            Pacing::Redraw => {
                event_loop.set_control_flow(ControlFlow::Poll);
                window.request_redraw();
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Stop watching before tearing down the renderer the watcher feeds
        self.watcher = None;
        self.renderer = None;
    }
}
