use std::{
    ffi::CStr,
    fs::OpenOptions,
    sync::Arc,
    time::{Duration, Instant},
};

use ash::vk;
use clap::{Parser, ValueEnum};
use gfx_hal::{
    error::GfxHalError,
    instance::{Instance, InstanceConfig},
    physical_device::{PhysicalDevice, QueueFamilyIndices, Suitability},
    surface::Surface,
};
use renderer::{
    vulkan::find_depth_format, FrameLoopConfig, FrameStatus, Renderer, RendererError,
    SwapchainPreferences,
};
use resource_manager::{ResourceManager, ResourceManagerError};
use scene::{GridParams, Scene};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalPosition},
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

const APP_NAME: &str = "Vulkan Grid";
const ENGINE_NAME: &str = "Engine";

/// Pixel scroll deltas are scaled down to roughly match one wheel notch per 20px.
const PIXEL_SCROLL_SCALE: f32 = 0.05;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Window Creation Error: {0}")]
    WindowCreation(#[from] winit::error::OsError),
    #[error("Graphics HAL Error: {0}")]
    GfxHal(#[from] GfxHalError),
    #[error("Resource Manager Error: {0}")]
    ResourceManager(#[from] ResourceManagerError),
    #[error("Renderer Error: {0}")]
    Renderer(#[from] RendererError),
    #[error("Scene Error: {0}")]
    Scene(#[from] scene::SceneError),
    #[error("Suitable physical device not found")]
    NoSuitableDevice,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum PresentModeArg {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl From<PresentModeArg> for vk::PresentModeKHR {
    fn from(mode: PresentModeArg) -> Self {
        match mode {
            PresentModeArg::Fifo => vk::PresentModeKHR::FIFO,
            PresentModeArg::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModeArg::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Draws a triangle, a ground grid and the coordinate axes. Drag with the left
/// mouse button to rotate, scroll to zoom.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Grid cells on each side of the origin
    #[arg(long, default_value_t = 20)]
    grid_cells: i32,

    /// Edge length of one grid cell
    #[arg(long, default_value_t = 1.0)]
    cell_size: f32,

    /// Frames the CPU may record ahead of the GPU
    #[arg(long, default_value_t = 2)]
    frames_in_flight: usize,

    /// Preferred presentation mode, FIFO is used when unavailable
    #[arg(long, value_enum, default_value_t = PresentModeArg::Fifo)]
    present_mode: PresentModeArg,

    /// Enable Vulkan validation layers (on by default in debug builds)
    #[arg(long, default_value_t = cfg!(debug_assertions), action = clap::ArgAction::Set)]
    validation: bool,

    /// Console log level
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// Whether or not to create debug log (default false)
    #[arg(short, long, default_value_t = false)]
    debug_log: bool,
}

impl Args {
    fn frame_loop_config(&self) -> FrameLoopConfig {
        FrameLoopConfig {
            frames_in_flight: self.frames_in_flight,
            ..Default::default()
        }
    }

    fn swapchain_preferences(&self) -> SwapchainPreferences {
        SwapchainPreferences {
            present_mode: self.present_mode.into(),
            ..Default::default()
        }
    }

    fn grid_params(&self) -> GridParams {
        GridParams {
            cell_count: self.grid_cells,
            cell_size: self.cell_size,
        }
    }
}

struct Application {
    // Dropped first: drains the GPU before the handles below go away.
    renderer: Renderer,
    _resource_manager: Arc<ResourceManager>,
    _surface: Arc<Surface>,
    _instance: Arc<Instance>,

    scene: Scene,

    // --- Input State ---
    is_lmb_pressed: bool,
    last_cursor_pos: Option<PhysicalPosition<f64>>,

    window: Arc<Window>,

    frame_count: u32,
    last_fps_update_time: Instant,
}

struct ApplicationWrapper {
    args: Args,
    app: Option<Application>,
}

impl ApplicationWrapper {
    fn new(args: Args) -> Self {
        Self { args, app: None }
    }
}

impl ApplicationHandler for ApplicationWrapper {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title(format!("{} - {}", ENGINE_NAME, APP_NAME))
            .with_inner_size(LogicalSize::new(self.args.width, self.args.height));
        let app = event_loop
            .create_window(attributes)
            .map_err(AppError::from)
            .and_then(|window| Application::new(Arc::new(window), &self.args));
        match app {
            Ok(app) => self.app = Some(app),
            Err(e) => {
                error!("Failed to initialize: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let Some(app) = &mut self.app {
            app.handle_event(&event, event_loop);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut app) = self.app.take() {
            app.renderer.shutdown();
            info!("Rendered {} frames.", app.renderer.frames_rendered());
        }
    }
}

impl Application {
    fn new(window: Arc<Window>, args: &Args) -> Result<Self, AppError> {
        info!("Initializing Application...");

        let instance_config = InstanceConfig {
            application_name: APP_NAME.to_string(),
            engine_name: ENGINE_NAME.to_string(),
            enable_validation: args.validation,
            ..Default::default()
        };
        let instance = Instance::new(&instance_config, window.as_ref())?;
        info!("Vulkan Instance created.");

        // Safety: the window is owned by `Application` and outlives the surface.
        let surface = unsafe { instance.create_surface(window.as_ref())? };
        info!("Vulkan Surface created.");

        let required_device_extensions = [ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];
        let (physical_device, queue_family_indices) =
            select_physical_device(&instance, &surface, &required_device_extensions)?;
        debug!("Using Queue Families: {:?}", queue_family_indices);

        let enabled_features = vk::PhysicalDeviceFeatures::default();
        let device = unsafe {
            physical_device.create_logical_device(
                &required_device_extensions,
                &queue_family_indices,
                &enabled_features,
                true,
            )?
        };
        let depth_format = find_depth_format(&physical_device)?;
        debug!("Depth format: {:?}", depth_format);

        let resource_manager = Arc::new(ResourceManager::new(instance.clone(), device)?);
        info!("Resource Manager initialized.");

        let scene = Scene::new(args.grid_params())?;
        let geometry = scene.upload(&resource_manager)?;

        let size = window.inner_size();
        let renderer = Renderer::new(
            resource_manager.clone(),
            surface.clone(),
            geometry,
            depth_format,
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            &args.frame_loop_config(),
            args.swapchain_preferences(),
        )?;
        info!("Renderer initialized.");

        window.request_redraw();

        Ok(Self {
            renderer,
            _resource_manager: resource_manager,
            _surface: surface,
            _instance: instance,
            scene,
            is_lmb_pressed: false,
            last_cursor_pos: None,
            window,
            frame_count: 0,
            last_fps_update_time: Instant::now(),
        })
    }

    fn handle_event(&mut self, event: &WindowEvent, active_event_loop: &ActiveEventLoop) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Exiting...");
                self.renderer.shutdown();
                active_event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                debug!(
                    "Window resized to: {}x{}",
                    physical_size.width, physical_size.height
                );
                self.renderer
                    .resize(physical_size.width, physical_size.height);
                self.window.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("Scale factor changed: {}", scale_factor);
                let new_inner_size = self.window.inner_size();
                self.renderer
                    .resize(new_inner_size.width, new_inner_size.height);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.is_lmb_pressed = *state == ElementState::Pressed;
                if !self.is_lmb_pressed {
                    self.last_cursor_pos = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.is_lmb_pressed {
                    if let Some(last) = self.last_cursor_pos {
                        self.scene.camera.rotate(
                            (position.x - last.x) as f32,
                            (position.y - last.y) as f32,
                        );
                    }
                    self.last_cursor_pos = Some(*position);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let notches = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 * PIXEL_SCROLL_SCALE,
                };
                self.scene.camera.zoom_by(notches);
            }
            WindowEvent::RedrawRequested => {
                self.update_fps();

                match self.renderer.render_frame(&self.scene.camera) {
                    Ok(FrameStatus::Presented) => {}
                    Ok(FrameStatus::PresentedStale) => {
                        debug!("Swapchain went stale, rebuilding next frame.");
                    }
                    Ok(FrameStatus::Skipped) => {
                        // Minimized: wait for the next resize before drawing again.
                        return;
                    }
                    Err(RendererError::TransientPresentation(reason)) => {
                        warn!("Frame dropped: {}", reason);
                    }
                    Err(e) => {
                        error!("Failed to render frame: {}", e);
                        self.renderer.shutdown();
                        active_event_loop.exit();
                        return;
                    }
                }

                self.window.request_redraw();
            }
            _ => {}
        }
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_fps_update_time);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.window
                .set_title(&format!("{} - {} - {:.0} FPS", ENGINE_NAME, APP_NAME, fps));
            self.frame_count = 0;
            self.last_fps_update_time = now;
        }
    }
}

/// Returns the highest scoring device that can present to `surface`.
fn select_physical_device(
    instance: &Arc<Instance>,
    surface: &Surface,
    required_extensions: &[&CStr],
) -> Result<(PhysicalDevice, QueueFamilyIndices), AppError> {
    let mut best: Option<(u32, PhysicalDevice, QueueFamilyIndices)> = None;

    for pd in instance.enumerate_physical_devices()? {
        let name = unsafe { pd.name() };
        match unsafe { pd.check_suitability(required_extensions, surface)? } {
            Suitability::Suitable { score, indices, .. } => {
                debug!("Candidate device {} (score {})", name, score);
                if best.as_ref().map_or(true, |(best_score, ..)| score > *best_score) {
                    best = Some((score, pd, indices));
                }
            }
            Suitability::NotSuitable { reason } => {
                warn!("Skipping physical device {}: {}", name, reason);
            }
        }
    }

    let (_, physical_device, indices) = best.ok_or(AppError::NoSuitableDevice)?;
    info!("Selected Physical Device: {}", unsafe { physical_device.name() });
    Ok((physical_device, indices))
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(args.log_level);

    let registry = tracing_subscriber::registry().with(fmt_layer);

    if args.debug_log {
        let log_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open("log-debug.log")?;

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(log_file)
            .with_filter(LevelFilter::DEBUG);

        registry.with(json_layer).init();
    } else {
        registry.init();
    }

    let event_loop = EventLoop::new()?;

    info!("Starting event loop...");
    let mut app = ApplicationWrapper::new(args);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_window() {
        let args = Args::parse_from(["engine"]);
        assert_eq!((args.width, args.height), (1280, 720));
        assert_eq!(args.grid_params(), GridParams::default());
        assert_eq!(args.frame_loop_config().frames_in_flight, 2);
        assert_eq!(
            args.swapchain_preferences().present_mode,
            vk::PresentModeKHR::FIFO
        );
        assert!(!args.debug_log);
    }

    #[test]
    fn present_mode_flag_is_forwarded() {
        let args = Args::parse_from(["engine", "--present-mode", "mailbox"]);
        assert_eq!(
            args.swapchain_preferences().present_mode,
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn overrides_reach_typed_configs() {
        let args = Args::parse_from([
            "engine",
            "--grid-cells",
            "5",
            "--cell-size",
            "0.5",
            "--frames-in-flight",
            "3",
            "--validation",
            "false",
            "--log-level",
            "warn",
        ]);
        assert_eq!(
            args.grid_params(),
            GridParams {
                cell_count: 5,
                cell_size: 0.5
            }
        );
        assert_eq!(args.frame_loop_config().frames_in_flight, 3);
        assert!(!args.validation);
        assert_eq!(args.log_level, LevelFilter::WARN);
    }
}
