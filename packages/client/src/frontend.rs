//! Choosing the render backend the frame loop draws to.

use crate::settings::Settings;
use graphics::{
    RenderBackend,
    SoftwareBackend,
};
use anyhow::Result;
use vek::*;


const WINDOW_TITLE: &'static str = "image pipeline demo";


/// Event source of the window, if there is one.
pub struct WindowEvents {
    #[cfg(feature = "sdl")]
    pump: Option<sdl2::EventPump>,
}

impl WindowEvents {
    fn none() -> Self {
        WindowEvents {
            #[cfg(feature = "sdl")]
            pump: None,
        }
    }

    /// Drain pending window events, returning whether the user asked to
    /// close the window.
    #[cfg(feature = "sdl")]
    pub fn quit_requested(&mut self) -> bool {
        match self.pump {
            Some(ref mut pump) => pump
                .poll_iter()
                .fold(false, |quit, event| quit || matches!(event, sdl2::event::Event::Quit { .. })),
            None => false,
        }
    }

    #[cfg(not(feature = "sdl"))]
    pub fn quit_requested(&mut self) -> bool {
        false
    }
}

/// Open a window if built with SDL and not headless, otherwise draw into an
/// offscreen framebuffer.
pub fn open_backend(settings: &Settings) -> Result<(Box<dyn RenderBackend>, WindowEvents)> {
    let size = Extent2::from(settings.window_size);
    if !settings.draw.headless {
        if let Some(window) = open_window(size)? {
            return Ok(window);
        }
    }
    debug!(?size, "drawing offscreen");
    Ok((Box::new(SoftwareBackend::new(size)), WindowEvents::none()))
}

#[cfg(feature = "sdl")]
fn open_window(size: Extent2<u32>) -> Result<Option<(Box<dyn RenderBackend>, WindowEvents)>> {
    let backend = graphics::SdlBackend::new(WINDOW_TITLE, size)?;
    let pump = backend.event_pump()?;
    info!(?size, title=%WINDOW_TITLE, "opened window");
    Ok(Some((Box::new(backend), WindowEvents { pump: Some(pump) })))
}

#[cfg(not(feature = "sdl"))]
fn open_window(size: Extent2<u32>) -> Result<Option<(Box<dyn RenderBackend>, WindowEvents)>> {
    debug!(?size, title=%WINDOW_TITLE, "built without a windowing backend");
    Ok(None)
}
