//! The boundary between drawing code and whatever actually puts pixels on
//! the screen.

use crate::{
    rect::Rect,
    texture::Texture,
};
use anyhow::Result;
use image::RgbaImage;
use vek::*;

mod software;
mod uploads;
#[cfg(feature = "sdl")]
mod sdl;

pub use self::software::SoftwareBackend;
pub use self::uploads::Uploads;
#[cfg(feature = "sdl")]
pub use self::sdl::SdlBackend;


/// Parameters for copying (part of) a texture onto the render surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CopyParams {
    /// Source region relative to the texture's own source rect. `None`
    /// copies all of it.
    pub src: Option<Rect>,
    /// Destination in viewport coordinates. The source is stretched to fit.
    pub dst: Rect,
    pub flip_h: bool,
    pub flip_v: bool,
    /// Multiplied into the source alpha.
    pub alpha_mod: u8,
    /// Multiplied into the source color channels.
    pub color_mod: Rgb<u8>,
}

impl CopyParams {
    pub fn new(dst: Rect) -> Self {
        CopyParams {
            src: None,
            dst,
            flip_h: false,
            flip_v: false,
            alpha_mod: 255,
            color_mod: Rgb::new(255, 255, 255),
        }
    }
}

/// Draw call counters, for diagnostics and tests.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub fills: u64,
    pub lines: u64,
    pub points: u64,
    pub copies: u64,
    pub presents: u64,
}

/// A renderer. All coordinates given to drawing methods are relative to the
/// current viewport, and the clip rect is relative to the viewport too.
pub trait RenderBackend {
    /// Size of the window or screen, regardless of render target.
    fn output_size(&self) -> Extent2<u32>;

    /// Display refresh rate in Hz, if known.
    fn refresh_rate(&self) -> Option<u32>;

    fn clip(&self) -> Option<Rect>;

    fn set_clip(&mut self, clip: Option<Rect>);

    /// The current viewport, resolved against the render surface if unset.
    fn viewport(&self) -> Rect;

    /// Set the viewport. `None` resets to the whole render surface.
    fn set_viewport(&mut self, viewport: Option<Rect>);

    fn target(&self) -> Option<Texture>;

    /// Redirect drawing into a target texture, or back to the screen with
    /// `None`. Resets the viewport and clip.
    fn set_target(&mut self, target: Option<Texture>) -> Result<()>;

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>);

    fn draw_line(&mut self, from: Vec2<i32>, to: Vec2<i32>, color: Rgba<u8>);

    fn draw_points(&mut self, points: &[Vec2<i32>], color: Rgba<u8>);

    fn copy(&mut self, texture: &Texture, params: &CopyParams);

    /// Read back pixels of the current render surface, in viewport
    /// coordinates.
    fn read_pixels(&mut self, area: Rect) -> RgbaImage;

    /// Flip the back buffer onto the display.
    fn present(&mut self);

    fn stats(&self) -> BackendStats;
}
