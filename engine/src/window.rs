use std::time::Duration;

use anyhow::Result;
use log::*;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::config::Config;
use crate::error::{ErrorKind, Fatal};

const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Events gathered during one poll of the window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowEvents {
    pub resized: bool,
    pub size: (u32, u32),
}

#[derive(Debug)]
pub struct AppWindow {
    event_loop: EventLoop<()>,
    window: Window,
    close_requested: bool,
}

impl AppWindow {
    pub fn new(config: &Config) -> Result<AppWindow> {
        let event_loop = EventLoop::new().fatal(ErrorKind::InitWindow, "Failed to create event loop")?;
        AppWindow::with_event_loop(event_loop, config)
    }

    pub fn with_event_loop(event_loop: EventLoop<()>, config: &Config) -> Result<AppWindow> {
        let window = WindowBuilder::new()
            .with_title("Ember")
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(true)
            .build(&event_loop)
            .fatal(ErrorKind::InitWindow, "Failed to create window")?;

        Ok(AppWindow {
            event_loop,
            window,
            close_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let PhysicalSize { width, height } = self.window.inner_size();
        (width, height)
    }

    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }

    /// Drains pending events without blocking.
    pub fn poll_events(&mut self) -> WindowEvents {
        self.pump(Duration::ZERO)
    }

    /// Waits briefly for events; used while the window is minimized.
    pub fn wait_events(&mut self) -> WindowEvents {
        self.pump(MINIMIZED_POLL_INTERVAL)
    }

    fn pump(&mut self, timeout: Duration) -> WindowEvents {
        let mut resized = false;
        let mut close_requested = false;

        let status = self.event_loop.pump_events(Some(timeout), |event, _| {
            if let Event::WindowEvent { event, .. } = event {
                match event {
                    WindowEvent::Resized(_) => resized = true,
                    WindowEvent::CloseRequested => close_requested = true,
                    _ => {}
                }
            }
        });

        if let PumpStatus::Exit(code) = status {
            debug!("Event loop exited with code {}.", code);
            close_requested = true;
        }
        if close_requested {
            self.close_requested = true;
        }

        WindowEvents {
            resized,
            size: self.framebuffer_size(),
        }
    }
}
