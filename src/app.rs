use anyhow::Context;
use std::{sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

use crate::config::LifeConfig;
use crate::error::{DeviceError, LifeError};
use crate::gfx::render_engine::RenderEngine;
use crate::scheduler::FrameScheduler;

pub struct LifeApp {
    config: LifeConfig,
}

struct AppState {
    config: LifeConfig,
    window: Option<Arc<Window>>,
    scheduler: Option<FrameScheduler<RenderEngine>>,
    /// First fatal error. Once set no further ticks are issued.
    error: Option<LifeError>,
}

impl LifeApp {
    pub fn new(config: LifeConfig) -> Self {
        Self { config }
    }

    /// Open the window and tick until it is closed.
    ///
    /// A device failure stops the simulation but leaves the window and its
    /// last frame up; the error is returned once the window closes.
    pub fn run(self) -> anyhow::Result<()> {
        self.config.validate().context("Invalid configuration")?;

        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut state = AppState {
            config: self.config,
            window: None,
            scheduler: None,
            error: None,
        };
        event_loop
            .run_app(&mut state)
            .context("Failed to run event loop")?;

        if let Some(scheduler) = state.scheduler.as_ref() {
            log::info!("Stopped at generation {}", scheduler.generation());
        }
        match state.error {
            Some(err) => Err(anyhow::Error::new(err).context("Simulation stopped")),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn fail(&mut self, err: LifeError) {
        log::error!("{err}");
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = self.config.window_size;
        let attributes = WindowAttributes::default()
            .with_title(self.config.window_title.clone())
            .with_inner_size(LogicalSize::new(width, height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(LifeError::Initialization(DeviceError::Surface(
                    err.to_string(),
                )));
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let (width, height) = window.inner_size().into();
        let scheduler = pollster::block_on(RenderEngine::new(window, width, height))
            .map_err(LifeError::Initialization)
            .and_then(|engine| FrameScheduler::new(engine, &self.config));

        match scheduler {
            Ok(scheduler) => self.scheduler = Some(scheduler),
            Err(err) => {
                self.fail(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: winit::event::WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    winit::event::KeyEvent {
                        physical_key: winit::keyboard::PhysicalKey::Code(key_code),
                        ..
                    },
                ..
            } => {
                if matches!(key_code, winit::keyboard::KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.device_mut().resize(width, height);
                }
            }
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(scheduler) = self.scheduler.as_mut() else {
                    return;
                };
                if scheduler.is_halted() {
                    return;
                }
                if let Err(err) = scheduler.poll(Instant::now()) {
                    self.fail(err);
                    log::warn!("Simulation halted, keeping the last presented frame");
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(scheduler)) = (self.window.as_ref(), self.scheduler.as_ref())
        else {
            return;
        };
        if scheduler.is_halted() {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }

        match scheduler.next_deadline() {
            Some(deadline) if deadline > Instant::now() => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            _ => window.request_redraw(),
        }
    }
}
