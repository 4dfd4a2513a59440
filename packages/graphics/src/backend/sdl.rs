//! SDL2 renderer backend. Compiled with the `sdl` feature.

use super::{
    RenderBackend,
    CopyParams,
    BackendStats,
    Uploads,
};
use crate::{
    rect::Rect,
    texture::Texture,
};
use std::ptr;
use anyhow::{Result, Error, bail};
use sdl2::{
    Sdl,
    VideoSubsystem,
    EventPump,
    pixels::{
        Color,
        PixelFormatEnum,
    },
    rect::{
        Rect as SdlRect,
        Point,
    },
    render::{
        Canvas,
        BlendMode,
        TextureCreator,
        Texture as SdlTexture,
    },
    video::{
        Window,
        WindowContext,
    },
};
use image::RgbaImage;
use vek::*;


// little-endian RGBA byte order
const PIXEL_FORMAT: PixelFormatEnum = PixelFormatEnum::ABGR8888;


/// Renders through an SDL2 window canvas.
pub struct SdlBackend {
    canvas: Canvas<Window>,
    creator: TextureCreator<WindowContext>,
    video: VideoSubsystem,
    sdl: Sdl,
    uploaded: Uploads<SdlTexture>,
    target: Option<Texture>,
    stats: BackendStats,
}

fn to_sdl_rect(r: Rect) -> Option<SdlRect> {
    if r.is_empty() {
        None
    } else {
        Some(SdlRect::new(r.x, r.y, r.w as u32, r.h as u32))
    }
}

fn from_sdl_rect(r: SdlRect) -> Rect {
    Rect::new(r.x(), r.y(), r.width() as i32, r.height() as i32)
}

fn sdl_color(c: Rgba<u8>) -> Color {
    Color::RGBA(c.r, c.g, c.b, c.a)
}

// make sure the GPU copy of a texture is current
fn upload(
    creator: &TextureCreator<WindowContext>,
    uploaded: &mut Uploads<SdlTexture>,
    texture: &Texture,
) -> Result<()> {
    if uploaded.is_current(texture, texture.is_target()) {
        return Ok(());
    }
    let size = texture.buffer_size();
    let mut sdl_texture =
        if texture.is_target() {
            creator.create_texture_target(PIXEL_FORMAT, size.w, size.h)?
        } else {
            let mut t = creator.create_texture_static(PIXEL_FORMAT, size.w, size.h)?;
            let pixels = texture.pixels();
            t.update(None, pixels.as_raw(), size.w as usize * 4)?;
            t
        };
    sdl_texture.set_blend_mode(BlendMode::Blend);
    if let Some(old) = uploaded.insert(texture, sdl_texture) {
        // safety: the renderer that created it is still alive
        unsafe { old.destroy() };
    }
    Ok(())
}

impl SdlBackend {
    /// Open a resizable window and an accelerated renderer for it.
    pub fn new<E: Into<Extent2<u32>>>(title: &str, size: E) -> Result<Self> {
        let size = size.into();
        let sdl = sdl2::init().map_err(Error::msg)?;
        let video = sdl.video().map_err(Error::msg)?;
        let window = video
            .window(title, size.w, size.h)
            .position_centered()
            .resizable()
            .build()?;
        let mut canvas = window
            .into_canvas()
            .accelerated()
            .build()?;
        canvas.set_blend_mode(BlendMode::Blend);
        let creator = canvas.texture_creator();
        trace!("opened sdl window");
        Ok(SdlBackend {
            canvas,
            creator,
            video,
            sdl,
            uploaded: Uploads::new(),
            target: None,
            stats: BackendStats::default(),
        })
    }

    pub fn event_pump(&self) -> Result<EventPump> {
        self.sdl.event_pump().map_err(Error::msg)
    }
}

impl RenderBackend for SdlBackend {
    fn output_size(&self) -> Extent2<u32> {
        self.canvas
            .output_size()
            .map(|(w, h)| Extent2::new(w, h))
            .unwrap_or_else(|e| {
                error!(%e, "unable to query renderer output size");
                Extent2::zero()
            })
    }

    fn refresh_rate(&self) -> Option<u32> {
        self.video
            .current_display_mode(0)
            .ok()
            .filter(|mode| mode.refresh_rate > 0)
            .map(|mode| mode.refresh_rate as u32)
    }

    fn clip(&self) -> Option<Rect> {
        self.canvas.clip_rect().map(from_sdl_rect)
    }

    fn set_clip(&mut self, clip: Option<Rect>) {
        match clip {
            // sdl treats an empty clip rect as "no clip"
            Some(r) if r.is_empty() => self.canvas.set_clip_rect(SdlRect::new(-1, -1, 1, 1)),
            Some(r) => self.canvas.set_clip_rect(to_sdl_rect(r)),
            None => self.canvas.set_clip_rect(None),
        }
    }

    fn viewport(&self) -> Rect {
        from_sdl_rect(self.canvas.viewport())
    }

    fn set_viewport(&mut self, viewport: Option<Rect>) {
        self.canvas.set_viewport(viewport.and_then(to_sdl_rect));
    }

    fn target(&self) -> Option<Texture> {
        self.target.clone()
    }

    fn set_target(&mut self, target: Option<Texture>) -> Result<()> {
        let raw = match target {
            Some(ref texture) => {
                if !texture.is_target() {
                    bail!("texture {:?} is not a render target", texture);
                }
                upload(&self.creator, &mut self.uploaded, texture)?;
                match self.uploaded.get(texture) {
                    Some(uploaded) => uploaded.raw(),
                    None => bail!("render target {:?} was not uploaded", texture),
                }
            }
            None => ptr::null_mut(),
        };
        // safety: both pointers belong to this renderer and are alive
        let status = unsafe { sdl2::sys::SDL_SetRenderTarget(self.canvas.raw(), raw) };
        if status != 0 {
            bail!("SDL_SetRenderTarget failed: {}", sdl2::get_error());
        }
        self.target = target;
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.stats.fills += 1;
        if let Some(r) = to_sdl_rect(rect) {
            self.canvas.set_draw_color(sdl_color(color));
            if let Err(e) = self.canvas.fill_rect(r) {
                error!(%e, "SDL_RenderFillRect failed");
            }
        }
    }

    fn draw_line(&mut self, from: Vec2<i32>, to: Vec2<i32>, color: Rgba<u8>) {
        self.stats.lines += 1;
        self.canvas.set_draw_color(sdl_color(color));
        if let Err(e) = self.canvas.draw_line(Point::new(from.x, from.y), Point::new(to.x, to.y)) {
            error!(%e, "SDL_RenderDrawLine failed");
        }
    }

    fn draw_points(&mut self, points: &[Vec2<i32>], color: Rgba<u8>) {
        self.stats.points += points.len() as u64;
        let points = points
            .iter()
            .map(|p| Point::new(p.x, p.y))
            .collect::<Vec<_>>();
        self.canvas.set_draw_color(sdl_color(color));
        if let Err(e) = self.canvas.draw_points(&points[..]) {
            error!(%e, "SDL_RenderDrawPoints failed");
        }
    }

    fn copy(&mut self, texture: &Texture, params: &CopyParams) {
        self.stats.copies += 1;
        if let Err(e) = upload(&self.creator, &mut self.uploaded, texture) {
            error!(%e, "unable to upload texture");
            return;
        }
        let tex_src = texture.src_rect();
        let src = match params.src {
            Some(src) => src.shifted(tex_src.pos()).intersect(&tex_src),
            None => tex_src,
        };
        let (src, dst) = match (to_sdl_rect(src), to_sdl_rect(params.dst)) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return,
        };
        let uploaded = match self.uploaded.get_mut(texture) {
            Some(uploaded) => uploaded,
            None => return,
        };
        let color = params.color_mod;
        uploaded.set_color_mod(color.r, color.g, color.b);
        uploaded.set_alpha_mod(params.alpha_mod);
        let result = self.canvas.copy_ex(
            &*uploaded,
            src,
            dst,
            0.0,
            None,
            params.flip_h,
            params.flip_v,
        );
        if let Err(e) = result {
            error!(%e, "SDL_RenderCopyEx failed");
        }
    }

    fn read_pixels(&mut self, area: Rect) -> RgbaImage {
        let size = Extent2::new(area.w.max(0) as u32, area.h.max(0) as u32);
        to_sdl_rect(area)
            .and_then(|r| self.canvas
                .read_pixels(r, PIXEL_FORMAT)
                .map_err(|e| error!(%e, "SDL_RenderReadPixels failed"))
                .ok())
            .and_then(|bytes| RgbaImage::from_raw(size.w, size.h, bytes))
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    fn present(&mut self) {
        self.stats.presents += 1;
        self.canvas.present();

        let dead = self.uploaded.sweep();
        if !dead.is_empty() {
            trace!(freed=%dead.len(), kept=%self.uploaded.len(), "freed textures of dropped buffers");
        }
        for texture in dead {
            // safety: the renderer that created it is still alive
            unsafe { texture.destroy() };
        }
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

impl Drop for SdlBackend {
    fn drop(&mut self) {
        for texture in self.uploaded.drain() {
            // safety: the renderer is dropped after this
            unsafe { texture.destroy() };
        }
    }
}
