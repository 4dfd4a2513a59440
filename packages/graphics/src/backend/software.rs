//! CPU rasterizing backend over an in-memory framebuffer.
//!
//! Used for headless runs and tests. Pixels are blended source-over; texture
//! copies are scaled nearest-neighbour.

use super::{
    RenderBackend,
    CopyParams,
    BackendStats,
};
use crate::{
    rect::Rect,
    texture::Texture,
};
use anyhow::{Result, ensure};
use image::{
    RgbaImage,
    imageops,
};
use vek::*;


#[derive(Debug)]
pub struct SoftwareBackend {
    back: RgbaImage,
    front: RgbaImage,
    refresh_rate: Option<u32>,
    clip: Option<Rect>,
    viewport: Option<Rect>,
    target: Option<Texture>,
    stats: BackendStats,
}

impl SoftwareBackend {
    /// Framebuffer of the given size, cleared to opaque black.
    pub fn new<E: Into<Extent2<u32>>>(size: E) -> Self {
        let size = size.into();
        let black = image::Rgba([0, 0, 0, 255]);
        SoftwareBackend {
            back: RgbaImage::from_pixel(size.w, size.h, black),
            front: RgbaImage::from_pixel(size.w, size.h, black),
            refresh_rate: None,
            clip: None,
            viewport: None,
            target: None,
            stats: BackendStats::default(),
        }
    }

    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.refresh_rate = Some(hz);
        self
    }

    /// What was on the display as of the last `present`.
    pub fn front(&self) -> &RgbaImage {
        &self.front
    }

    /// The back buffer, including drawing since the last `present`.
    pub fn back(&self) -> &RgbaImage {
        &self.back
    }

    fn surface_size(&self) -> Extent2<u32> {
        match self.target {
            Some(ref target) => target.buffer_size(),
            None => Extent2::new(self.back.width(), self.back.height()),
        }
    }

    fn surface_rect(&self) -> Rect {
        let size = self.surface_size();
        Rect::new(0, 0, size.w as i32, size.h as i32)
    }

    // area pixels may be written to, in surface coordinates, and the
    // offset from viewport to surface coordinates
    fn drawable_area(&self) -> (Rect, Vec2<i32>) {
        let viewport = self.viewport();
        let mut area = viewport.intersect(&self.surface_rect());
        if let Some(clip) = self.clip {
            area = area.intersect(&clip.shifted(viewport.pos()));
        }
        (area, viewport.pos())
    }

    fn with_surface<F>(&mut self, f: F)
    where
        F: FnOnce(&mut RgbaImage, Rect, Vec2<i32>),
    {
        let (area, offset) = self.drawable_area();
        if area.is_empty() {
            return;
        }
        match self.target {
            Some(ref target) => target.write_pixels(|pixels| f(pixels, area, offset)),
            None => f(&mut self.back, area, offset),
        }
    }
}

fn blend(dst: &mut image::Rgba<u8>, src: [u8; 4]) {
    let sa = src[3] as u32;
    if sa == 0 {
        return;
    }
    if sa == 255 {
        dst.0 = src;
        return;
    }
    let inv = 255 - sa;
    for c in 0..3 {
        dst.0[c] = ((src[c] as u32 * sa + dst.0[c] as u32 * inv) / 255) as u8;
    }
    dst.0[3] = (sa + dst.0[3] as u32 * inv / 255).min(255) as u8;
}

fn put(pixels: &mut RgbaImage, area: Rect, p: Vec2<i32>, color: [u8; 4]) {
    if area.contains_point(p) {
        blend(pixels.get_pixel_mut(p.x as u32, p.y as u32), color);
    }
}

fn line_points(from: Vec2<i32>, to: Vec2<i32>) -> Vec<Vec2<i32>> {
    // bresenham
    let mut points = Vec::new();
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let mut p = from;
    loop {
        points.push(p);
        if p == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            p.x += sx;
        }
        if e2 <= dx {
            err += dx;
            p.y += sy;
        }
    }
    points
}

impl RenderBackend for SoftwareBackend {
    fn output_size(&self) -> Extent2<u32> {
        Extent2::new(self.back.width(), self.back.height())
    }

    fn refresh_rate(&self) -> Option<u32> {
        self.refresh_rate
    }

    fn clip(&self) -> Option<Rect> {
        self.clip
    }

    fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }

    fn viewport(&self) -> Rect {
        self.viewport.unwrap_or_else(|| self.surface_rect())
    }

    fn set_viewport(&mut self, viewport: Option<Rect>) {
        self.viewport = viewport;
    }

    fn target(&self) -> Option<Texture> {
        self.target.clone()
    }

    fn set_target(&mut self, target: Option<Texture>) -> Result<()> {
        if let Some(ref texture) = target {
            ensure!(texture.is_target(), "texture {:?} is not a render target", texture);
        }
        self.target = target;
        self.viewport = None;
        self.clip = None;
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.stats.fills += 1;
        let color = color.into_array();
        self.with_surface(|pixels, area, offset| {
            let r = rect.shifted(offset).intersect(&area);
            for y in r.y..r.bottom() {
                for x in r.x..r.right() {
                    blend(pixels.get_pixel_mut(x as u32, y as u32), color);
                }
            }
        });
    }

    fn draw_line(&mut self, from: Vec2<i32>, to: Vec2<i32>, color: Rgba<u8>) {
        self.stats.lines += 1;
        let color = color.into_array();
        self.with_surface(|pixels, area, offset| {
            for p in line_points(from + offset, to + offset) {
                put(pixels, area, p, color);
            }
        });
    }

    fn draw_points(&mut self, points: &[Vec2<i32>], color: Rgba<u8>) {
        self.stats.points += points.len() as u64;
        let color = color.into_array();
        self.with_surface(|pixels, area, offset| {
            for &p in points {
                put(pixels, area, p + offset, color);
            }
        });
    }

    fn copy(&mut self, texture: &Texture, params: &CopyParams) {
        self.stats.copies += 1;
        let tex_src = texture.src_rect();
        let src = match params.src {
            Some(src) => src.shifted(tex_src.pos()).intersect(&tex_src),
            None => tex_src,
        };
        if src.is_empty() || params.dst.is_empty() {
            return;
        }
        // copy the source out first, it may be the buffer we're drawing into
        let source = {
            let pixels = texture.pixels();
            imageops::crop_imm(
                &*pixels,
                src.x as u32,
                src.y as u32,
                src.w as u32,
                src.h as u32,
            ).to_image()
        };
        let dst = params.dst;
        let alpha_mod = params.alpha_mod as u32;
        let color_mod = params.color_mod;
        let (flip_h, flip_v) = (params.flip_h, params.flip_v);
        self.with_surface(|pixels, area, offset| {
            let dst = dst.shifted(offset);
            let visible = dst.intersect(&area);
            for y in visible.y..visible.bottom() {
                let mut sy = ((y - dst.y) as i64 * src.h as i64 / dst.h as i64) as u32;
                if flip_v {
                    sy = src.h as u32 - 1 - sy;
                }
                for x in visible.x..visible.right() {
                    let mut sx = ((x - dst.x) as i64 * src.w as i64 / dst.w as i64) as u32;
                    if flip_h {
                        sx = src.w as u32 - 1 - sx;
                    }
                    let [r, g, b, a] = source.get_pixel(sx, sy).0;
                    let modded = [
                        (r as u32 * color_mod.r as u32 / 255) as u8,
                        (g as u32 * color_mod.g as u32 / 255) as u8,
                        (b as u32 * color_mod.b as u32 / 255) as u8,
                        (a as u32 * alpha_mod / 255) as u8,
                    ];
                    blend(pixels.get_pixel_mut(x as u32, y as u32), modded);
                }
            }
        });
    }

    fn read_pixels(&mut self, area: Rect) -> RgbaImage {
        let viewport = self.viewport();
        let r = area.shifted(viewport.pos()).intersect(&self.surface_rect());
        if r.is_empty() {
            return RgbaImage::new(0, 0);
        }
        let crop = |pixels: &RgbaImage| imageops::crop_imm(
            pixels,
            r.x as u32,
            r.y as u32,
            r.w as u32,
            r.h as u32,
        ).to_image();
        match self.target {
            Some(ref target) => crop(&*target.pixels()),
            None => crop(&self.back),
        }
    }

    fn present(&mut self) {
        self.stats.presents += 1;
        self.front.clone_from(&self.back);
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}


#[test]
fn test_fill_respects_clip_and_viewport() {
    let mut b = SoftwareBackend::new([8, 8]);
    b.set_viewport(Some(Rect::new(2, 2, 6, 6)));
    b.set_clip(Some(Rect::new(0, 0, 2, 2)));
    b.fill_rect(Rect::new(0, 0, 8, 8), Rgba::new(255, 0, 0, 255));
    let img = b.back();
    assert_eq!(img.get_pixel(2, 2).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(3, 3).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(4, 4).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0, 255]);
}

#[test]
fn test_copy_scales_and_flips() {
    let mut src = RgbaImage::new(2, 1);
    src.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
    src.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
    let tex = Texture::from_image(src);

    let mut b = SoftwareBackend::new([4, 2]);
    let mut params = CopyParams::new(Rect::new(0, 0, 4, 2));
    params.flip_h = true;
    b.copy(&tex, &params);
    assert_eq!(b.back().get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(b.back().get_pixel(1, 1).0, [0, 0, 255, 255]);
    assert_eq!(b.back().get_pixel(3, 1).0, [255, 0, 0, 255]);
}

#[test]
fn test_render_target_receives_drawing() {
    let mut b = SoftwareBackend::new([4, 4]);
    let target = Texture::new_target([2, 2]);
    b.set_target(Some(target.clone())).unwrap();
    b.fill_rect(Rect::new(0, 0, 10, 10), Rgba::new(0, 255, 0, 255));
    b.set_target(None).unwrap();
    assert_eq!(target.to_image().get_pixel(1, 1).0, [0, 255, 0, 255]);
    assert_eq!(b.back().get_pixel(0, 0).0, [0, 0, 0, 255]);
    assert!(b.set_target(Some(Texture::from_image(RgbaImage::new(1, 1)))).is_err());
}

#[test]
fn test_line_endpoints() {
    let pts = line_points(Vec2::new(0, 0), Vec2::new(3, 1));
    assert_eq!(pts.first(), Some(&Vec2::new(0, 0)));
    assert_eq!(pts.last(), Some(&Vec2::new(3, 1)));
    assert_eq!(pts.len(), 4);
}
