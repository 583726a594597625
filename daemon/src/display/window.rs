//! The marquee window itself: runs inside the `show-image` process.
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::RgbaImage;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder, WindowId, WindowLevel};

use super::{color_or_black, render, select_monitor, DisplayError, DisplayRequest};

const WINDOW_TITLE: &str = "Cabinet Marquee";
/// How often the close flag is checked.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

type MarqueeSurface = softbuffer::Surface<Rc<Window>, Rc<Window>>;

/// Returns a flag that a watcher thread sets after `delay`.
pub fn close_after(delay: Duration) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&flag);
    thread::spawn(move || {
        thread::sleep(delay);
        setter.store(true, Ordering::Relaxed);
    });
    flag
}

fn load_image(request: &DisplayRequest) -> Result<RgbaImage, DisplayError> {
    if !request.image_path.exists() {
        return Err(DisplayError::ImageNotFound(request.image_path.clone()));
    }
    let decoded = image::open(&request.image_path).map_err(|source| DisplayError::Decode {
        path: request.image_path.clone(),
        source,
    })?;
    Ok(decoded.to_rgba8())
}

/// Opens the marquee window for `request` and blocks until it closes.
///
/// Without a `close` flag the window stays up until the process is killed.
pub fn run(request: &DisplayRequest, close: Option<Arc<AtomicBool>>) -> Result<(), DisplayError> {
    let image = load_image(request)?;
    let background = color_or_black(&request.background_color);

    let event_loop = EventLoop::new().map_err(|e| DisplayError::Window(e.to_string()))?;

    let monitors: Vec<_> = event_loop.available_monitors().collect();
    let monitor = match select_monitor(request.monitor_index, monitors.len()) {
        Some((idx, fell_back)) => {
            if fell_back {
                tracing::warn!(
                    requested = request.monitor_index,
                    available = monitors.len(),
                    "Monitor index out of range, using monitor 0"
                );
            }
            monitors[idx].clone()
        }
        None => event_loop.primary_monitor().ok_or(DisplayError::NoMonitor)?,
    };
    tracing::info!(
        monitor = %monitor.name().unwrap_or_default(),
        "Opening marquee window for {}",
        request.image_path.display()
    );

    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_decorations(false)
        .with_resizable(false)
        .with_window_level(WindowLevel::AlwaysOnTop)
        .with_position(monitor.position())
        .with_inner_size(monitor.size())
        .build(&event_loop)
        .map_err(|e| DisplayError::Window(e.to_string()))?;
    let window = Rc::new(window);
    window.set_cursor_visible(false);

    let context =
        softbuffer::Context::new(window.clone()).map_err(|e| DisplayError::Window(e.to_string()))?;
    let mut surface = softbuffer::Surface::new(&context, window.clone())
        .map_err(|e| DisplayError::Window(e.to_string()))?;

    // Frame cache, rebuilt only when the window size changes.
    let mut frame: Option<(PhysicalSize<u32>, Vec<u32>)> = None;
    window.request_redraw();

    event_loop
        .run(move |event, elwt| {
            let _ = &context;
            elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + CLOSE_POLL_INTERVAL));

            match step_for(&event, window.id(), close.as_deref()) {
                Step::Exit => elwt.exit(),
                Step::RequestRedraw => window.request_redraw(),
                Step::Redraw => {
                    if let Err(e) =
                        present(&mut surface, &image, window.inner_size(), background, &mut frame)
                    {
                        tracing::warn!("Marquee redraw failed: {e}");
                    }
                }
                Step::Continue => {}
            }
        })
        .map_err(|e| DisplayError::Window(e.to_string()))
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    RequestRedraw,
    Redraw,
    Exit,
}

/// Decides what the event loop does with `event`. Only the close flag ends
/// the marquee; close requests from the window manager are ignored.
fn step_for(event: &Event<()>, window: WindowId, close: Option<&AtomicBool>) -> Step {
    match event {
        Event::WindowEvent { window_id, event } if *window_id == window => match event {
            WindowEvent::CloseRequested => {
                tracing::debug!("Ignoring close request for marquee window");
                Step::Continue
            }
            WindowEvent::Resized(_) => Step::RequestRedraw,
            WindowEvent::RedrawRequested => Step::Redraw,
            _ => Step::Continue,
        },
        Event::AboutToWait if close.is_some_and(|flag| flag.load(Ordering::Relaxed)) => Step::Exit,
        _ => Step::Continue,
    }
}

fn present(
    surface: &mut MarqueeSurface,
    image: &RgbaImage,
    size: PhysicalSize<u32>,
    background: u32,
    frame: &mut Option<(PhysicalSize<u32>, Vec<u32>)>,
) -> Result<()> {
    let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
    else {
        return Ok(());
    };
    surface
        .resize(width, height)
        .map_err(|e| anyhow!("resize surface: {e}"))?;

    if frame.as_ref().map(|(cached, _)| *cached) != Some(size) {
        *frame = Some((size, render::compose(image, size.width, size.height, background)));
    }
    let Some((_, pixels)) = frame.as_ref() else {
        return Ok(());
    };

    let mut buffer = surface
        .buffer_mut()
        .map_err(|e| anyhow!("borrow surface buffer: {e}"))?;
    buffer.copy_from_slice(pixels);
    buffer.present().map_err(|e| anyhow!("present frame: {e}"))?;
    Ok(())
}
