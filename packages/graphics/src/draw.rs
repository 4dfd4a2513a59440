//! Drawing primitives over the active render backend, and RAII guards for
//! clip, viewport and render target state.

use crate::{
    rect::Rect,
    texture::Texture,
    backend::{
        RenderBackend,
        CopyParams,
    },
};
use std::ops::{Deref, DerefMut};
use anyhow::Result;
use image::RgbaImage;
use vek::*;


/// Octant mask selecting the whole circle.
pub const ALL_OCTANTS: u8 = 0xff;


/// Handle for issuing draw calls. Lent out to drawables for the duration of
/// a render or expose call.
pub struct Draw<'a> {
    backend: &'a mut dyn RenderBackend,
}

impl<'a> Draw<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend) -> Self {
        Draw { backend }
    }

    pub fn reborrow<'b>(&'b mut self) -> Draw<'b> {
        Draw {
            backend: &mut *self.backend,
        }
    }

    /// Fill the whole viewport, respecting the clip.
    pub fn fill(&mut self, color: Rgba<u8>) {
        let viewport = self.backend.viewport();
        self.backend.fill_rect(Rect::from_size(viewport.size()), color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.backend.fill_rect(rect, color);
    }

    /// One pixel wide outline just inside `rect`.
    pub fn rect(&mut self, rect: Rect, color: Rgba<u8>) {
        if rect.is_empty() {
            return;
        }
        self.backend.fill_rect(Rect::new(rect.x, rect.y, rect.w, 1), color);
        if rect.h > 1 {
            self.backend.fill_rect(Rect::new(rect.x, rect.bottom() - 1, rect.w, 1), color);
        }
        if rect.h > 2 {
            self.backend.fill_rect(Rect::new(rect.x, rect.y + 1, 1, rect.h - 2), color);
            if rect.w > 1 {
                self.backend.fill_rect(Rect::new(rect.right() - 1, rect.y + 1, 1, rect.h - 2), color);
            }
        }
    }

    pub fn line<V1, V2>(&mut self, from: V1, to: V2, color: Rgba<u8>)
    where
        V1: Into<Vec2<i32>>,
        V2: Into<Vec2<i32>>,
    {
        self.backend.draw_line(from.into(), to.into(), color);
    }

    pub fn points(&mut self, points: &[Vec2<i32>], color: Rgba<u8>) {
        if !points.is_empty() {
            self.backend.draw_points(points, color);
        }
    }

    /// Circle outline. Bit `n` of `octants` enables the `n`th octant,
    /// counting clockwise from twelve o'clock.
    pub fn circle<V>(&mut self, center: V, radius: i32, color: Rgba<u8>, octants: u8)
    where
        V: Into<Vec2<i32>>,
    {
        let c = center.into();
        let mut points = Vec::new();
        for (x, y) in circle_steps(radius) {
            for (bit, p) in octant_points(c, x, y) {
                if octants & bit != 0 {
                    points.push(p);
                }
            }
        }
        self.points(&points, color);
    }

    /// Filled circle, with the same octant mask as `circle`.
    pub fn disc<V>(&mut self, center: V, radius: i32, color: Rgba<u8>, octants: u8)
    where
        V: Into<Vec2<i32>>,
    {
        let c = center.into();
        let mut points = Vec::new();
        for (x, y) in circle_steps(radius) {
            // spans from the diagonal out to the edge of each octant
            for i in y..=x {
                let spans = [
                    (0x01, Vec2::new(c.x + y, c.y - i)),
                    (0x02, Vec2::new(c.x + i, c.y - y)),
                    (0x04, Vec2::new(c.x + i, c.y + y)),
                    (0x08, Vec2::new(c.x + y, c.y + i)),
                    (0x10, Vec2::new(c.x - y, c.y + i)),
                    (0x20, Vec2::new(c.x - i, c.y + y)),
                    (0x40, Vec2::new(c.x - i, c.y - y)),
                    (0x80, Vec2::new(c.x - y, c.y - i)),
                ];
                for (bit, p) in spans {
                    if octants & bit != 0 {
                        points.push(p);
                    }
                }
            }
        }
        points.sort_by_key(|p| (p.y, p.x));
        points.dedup();
        self.points(&points, color);
    }

    /// Draw the whole texture stretched over `dst`.
    pub fn blit(&mut self, texture: &Texture, dst: Rect) {
        self.backend.copy(texture, &CopyParams::new(dst));
    }

    /// Draw the texture at its draw size with its top left at `pos`.
    pub fn blit_at<V: Into<Vec2<i32>>>(&mut self, texture: &Texture, pos: V) {
        let pos = pos.into();
        let size = texture.draw_size();
        self.blit(texture, Rect::new(pos.x, pos.y, size.w as i32, size.h as i32));
    }

    /// Draw the `src` part of the texture stretched over `dst`.
    pub fn blit_src(&mut self, texture: &Texture, dst: Rect, src: Rect) {
        let mut params = CopyParams::new(dst);
        params.src = Some(src);
        self.backend.copy(texture, &params);
    }

    pub fn blit_with(&mut self, texture: &Texture, params: &CopyParams) {
        self.backend.copy(texture, params);
    }

    pub fn flipped(&mut self, texture: &Texture, dst: Rect, flip_h: bool, flip_v: bool) {
        let mut params = CopyParams::new(dst);
        params.flip_h = flip_h;
        params.flip_v = flip_v;
        self.backend.copy(texture, &params);
    }

    /// Repeat the texture at its draw size to fill `dst`.
    ///
    /// With `centered`, one tile is centered in `dst` and the rest laid out
    /// around it. With `mirrored`, every other column and row is flipped so
    /// that tile edges match up.
    pub fn tiled(&mut self, texture: &Texture, dst: Rect, centered: bool, mirrored: bool) {
        let size = texture.draw_size();
        let (tw, th) = (size.w as i32, size.h as i32);
        if tw <= 0 || th <= 0 || dst.is_empty() {
            return;
        }
        let mut draw = self.reduce_clip(dst);

        let (mut x0, mut y0) = (dst.x, dst.y);
        let (mut skip_x, mut skip_y) = (0, 0);
        if centered {
            x0 += (dst.w - tw) / 2;
            y0 += (dst.h - th) / 2;
            skip_x = (x0 - dst.x + tw - 1).div_euclid(tw);
            skip_y = (y0 - dst.y + th - 1).div_euclid(th);
            x0 -= skip_x * tw;
            y0 -= skip_y * th;
        }

        let mut row = 0;
        let mut y = y0;
        while y < dst.bottom() {
            let mut col = 0;
            let mut x = x0;
            while x < dst.right() {
                let flip_h = mirrored && (col + skip_x) % 2 == 1;
                let flip_v = mirrored && (row + skip_y) % 2 == 1;
                draw.flipped(texture, Rect::new(x, y, tw, th), flip_h, flip_v);
                x += tw;
                col += 1;
            }
            y += th;
            row += 1;
        }
    }

    /// Current clip, relative to the viewport. `None` means unclipped.
    pub fn clip(&self) -> Option<Rect> {
        self.backend.clip()
    }

    /// Set the clip without restoring it later. Prefer the guards.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.backend.set_clip(clip);
    }

    /// Whether the current clip forbids all drawing.
    pub fn null_clip(&self) -> bool {
        self.backend.clip().map(|c| c.is_empty()).unwrap_or(false)
    }

    pub fn viewport(&self) -> Rect {
        self.backend.viewport()
    }

    pub fn output_size(&self) -> Extent2<u32> {
        self.backend.output_size()
    }

    pub fn read_pixels(&mut self, area: Rect) -> RgbaImage {
        self.backend.read_pixels(area)
    }

    /// Intersect the clip with `rect` until the guard drops.
    pub fn reduce_clip(&mut self, rect: Rect) -> ClipGuard<'_> {
        let old = self.backend.clip();
        let new = match old {
            Some(clip) => clip.intersect(&rect),
            None => rect,
        };
        self.backend.set_clip(Some(new));
        ClipGuard {
            draw: self.reborrow(),
            old,
        }
    }

    /// Replace the clip with `rect` until the guard drops.
    pub fn override_clip(&mut self, rect: Rect) -> ClipGuard<'_> {
        let old = self.backend.clip();
        self.backend.set_clip(Some(rect));
        ClipGuard {
            draw: self.reborrow(),
            old,
        }
    }

    /// Replace the viewport until the guard drops. An active clip keeps
    /// covering the same pixels.
    pub fn set_viewport(&mut self, viewport: Rect) -> ViewportGuard<'_> {
        let old_viewport = self.backend.viewport();
        let old_clip = self.backend.clip();
        self.backend.set_viewport(Some(viewport));
        if let Some(clip) = old_clip {
            self.backend.set_clip(Some(clip.shifted(old_viewport.pos() - viewport.pos())));
        }
        ViewportGuard {
            draw: self.reborrow(),
            old_viewport,
            old_clip,
        }
    }

    /// Draw into `texture` until the guard drops. Fails if the texture was
    /// not created as a render target.
    pub fn set_render_target(&mut self, texture: &Texture) -> Result<TargetGuard<'_>> {
        let old_target = self.backend.target();
        let old_viewport = self.backend.viewport();
        let old_clip = self.backend.clip();
        self.backend.set_target(Some(texture.clone()))?;
        Ok(TargetGuard {
            draw: self.reborrow(),
            old_target,
            old_viewport,
            old_clip,
        })
    }
}

fn circle_steps(radius: i32) -> Vec<(i32, i32)> {
    // midpoint circle, one step per octant-local position
    let mut steps = Vec::new();
    if radius < 0 {
        return steps;
    }
    let mut x = radius;
    let mut y = 0;
    let mut d = -radius / 2;
    while y <= x {
        steps.push((x, y));
        d += 2 * y + 1;
        y += 1;
        if d > 0 {
            d += 2 - 2 * x;
            x -= 1;
        }
    }
    steps
}

fn octant_points(c: Vec2<i32>, x: i32, y: i32) -> [(u8, Vec2<i32>); 8] {
    [
        (0x01, Vec2::new(c.x + y, c.y - x)),
        (0x02, Vec2::new(c.x + x, c.y - y)),
        (0x04, Vec2::new(c.x + x, c.y + y)),
        (0x08, Vec2::new(c.x + y, c.y + x)),
        (0x10, Vec2::new(c.x - y, c.y + x)),
        (0x20, Vec2::new(c.x - x, c.y + y)),
        (0x40, Vec2::new(c.x - x, c.y - y)),
        (0x80, Vec2::new(c.x - y, c.y - x)),
    ]
}


/// Restores the previous clip on drop.
pub struct ClipGuard<'a> {
    draw: Draw<'a>,
    old: Option<Rect>,
}

impl<'a> Deref for ClipGuard<'a> {
    type Target = Draw<'a>;

    fn deref(&self) -> &Draw<'a> {
        &self.draw
    }
}

impl<'a> DerefMut for ClipGuard<'a> {
    fn deref_mut(&mut self) -> &mut Draw<'a> {
        &mut self.draw
    }
}

impl<'a> Drop for ClipGuard<'a> {
    fn drop(&mut self) {
        self.draw.backend.set_clip(self.old);
    }
}

/// Restores the previous viewport and clip on drop.
pub struct ViewportGuard<'a> {
    draw: Draw<'a>,
    old_viewport: Rect,
    old_clip: Option<Rect>,
}

impl<'a> Deref for ViewportGuard<'a> {
    type Target = Draw<'a>;

    fn deref(&self) -> &Draw<'a> {
        &self.draw
    }
}

impl<'a> DerefMut for ViewportGuard<'a> {
    fn deref_mut(&mut self) -> &mut Draw<'a> {
        &mut self.draw
    }
}

impl<'a> Drop for ViewportGuard<'a> {
    fn drop(&mut self) {
        self.draw.backend.set_viewport(Some(self.old_viewport));
        self.draw.backend.set_clip(self.old_clip);
    }
}

/// Restores the previous render target, viewport and clip on drop.
pub struct TargetGuard<'a> {
    draw: Draw<'a>,
    old_target: Option<Texture>,
    old_viewport: Rect,
    old_clip: Option<Rect>,
}

impl<'a> Deref for TargetGuard<'a> {
    type Target = Draw<'a>;

    fn deref(&self) -> &Draw<'a> {
        &self.draw
    }
}

impl<'a> DerefMut for TargetGuard<'a> {
    fn deref_mut(&mut self) -> &mut Draw<'a> {
        &mut self.draw
    }
}

impl<'a> Drop for TargetGuard<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.draw.backend.set_target(self.old_target.take()) {
            error!(%e, "unable to restore render target");
        }
        self.draw.backend.set_viewport(Some(self.old_viewport));
        self.draw.backend.set_clip(self.old_clip);
    }
}


#[cfg(test)]
use crate::backend::SoftwareBackend;

#[cfg(test)]
const RED: Rgba<u8> = Rgba { r: 255, g: 0, b: 0, a: 255 };

#[cfg(test)]
fn px(backend: &SoftwareBackend, x: u32, y: u32) -> [u8; 4] {
    backend.back().get_pixel(x, y).0
}

#[test]
fn test_clip_guards_restore() {
    let mut backend = SoftwareBackend::new([10, 10]);
    {
        let mut draw = Draw::new(&mut backend);
        draw.set_clip(Some(Rect::new(0, 0, 8, 8)));
        {
            let mut clipped = draw.reduce_clip(Rect::new(4, 4, 10, 10));
            assert_eq!(clipped.clip(), Some(Rect::new(4, 4, 4, 4)));
            {
                let overridden = clipped.override_clip(Rect::new(9, 9, 1, 1));
                assert_eq!(overridden.clip(), Some(Rect::new(9, 9, 1, 1)));
            }
            assert_eq!(clipped.clip(), Some(Rect::new(4, 4, 4, 4)));
            clipped.fill(RED);
        }
        assert_eq!(draw.clip(), Some(Rect::new(0, 0, 8, 8)));
    }
    assert_eq!(px(&backend, 4, 4), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 3, 3), [0, 0, 0, 255]);
    assert_eq!(px(&backend, 8, 8), [0, 0, 0, 255]);
}

#[test]
fn test_clip_guard_restores_during_unwind() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    let mut backend = SoftwareBackend::new([10, 10]);
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut draw = Draw::new(&mut backend);
        let _clip = draw.override_clip(Rect::new(1, 1, 1, 1));
        panic!("boom");
    }));
    assert!(result.is_err());
    assert_eq!(backend.clip(), None);
}

#[test]
fn test_viewport_guard_offsets_and_keeps_clip() {
    let mut backend = SoftwareBackend::new([10, 10]);
    {
        let mut draw = Draw::new(&mut backend);
        draw.set_clip(Some(Rect::new(0, 0, 6, 6)));
        {
            let mut inner = draw.set_viewport(Rect::new(4, 4, 6, 6));
            assert_eq!(inner.clip(), Some(Rect::new(-4, -4, 6, 6)));
            inner.fill(RED);
        }
        assert_eq!(draw.viewport(), Rect::new(0, 0, 10, 10));
        assert_eq!(draw.clip(), Some(Rect::new(0, 0, 6, 6)));
    }
    assert_eq!(px(&backend, 4, 4), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 5, 5), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 6, 6), [0, 0, 0, 255]);
    assert_eq!(px(&backend, 3, 3), [0, 0, 0, 255]);
}

#[test]
fn test_render_target_guard() {
    let mut backend = SoftwareBackend::new([10, 10]);
    let target = Texture::new_target([4, 4]);
    {
        let mut draw = Draw::new(&mut backend);
        let mut clipped = draw.override_clip(Rect::new(0, 0, 2, 2));
        {
            let mut on_target = clipped.set_render_target(&target).unwrap();
            assert_eq!(on_target.clip(), None);
            on_target.fill(RED);
        }
        assert_eq!(clipped.clip(), Some(Rect::new(0, 0, 2, 2)));
        assert!(clipped.set_render_target(&Texture::from_image(RgbaImage::new(2, 2))).is_err());
    }
    assert!(backend.target().is_none());
    assert_eq!(target.to_image().get_pixel(3, 3).0, [255, 0, 0, 255]);
    assert_eq!(px(&backend, 0, 0), [0, 0, 0, 255]);
}

#[test]
fn test_rect_outline() {
    let mut backend = SoftwareBackend::new([6, 6]);
    Draw::new(&mut backend).rect(Rect::new(1, 1, 4, 4), RED);
    assert_eq!(px(&backend, 1, 1), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 4, 4), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 1, 3), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 2, 2), [0, 0, 0, 255]);
    assert_eq!(px(&backend, 5, 5), [0, 0, 0, 255]);
}

#[test]
fn test_circle_octants() {
    let mut backend = SoftwareBackend::new([21, 21]);
    {
        let mut draw = Draw::new(&mut backend);
        // right half only
        draw.circle([10, 10], 8, RED, 0x0f);
    }
    assert_eq!(px(&backend, 18, 10), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 10, 2), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 2, 10), [0, 0, 0, 255]);

    let mut backend = SoftwareBackend::new([21, 21]);
    Draw::new(&mut backend).disc([10, 10], 5, RED, ALL_OCTANTS);
    assert_eq!(px(&backend, 10, 10), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 13, 12), [255, 0, 0, 255]);
    assert_eq!(px(&backend, 16, 10), [0, 0, 0, 255]);
}

#[test]
fn test_tiled_fills_destination() {
    let tile = Texture::from_image(RgbaImage::from_pixel(3, 3, image::Rgba([0, 255, 0, 255])));
    let mut backend = SoftwareBackend::new([10, 10]);
    Draw::new(&mut backend).tiled(&tile, Rect::new(1, 1, 8, 8), true, true);
    assert_eq!(px(&backend, 1, 1), [0, 255, 0, 255]);
    assert_eq!(px(&backend, 8, 8), [0, 255, 0, 255]);
    assert_eq!(px(&backend, 0, 0), [0, 0, 0, 255]);
    assert_eq!(px(&backend, 9, 9), [0, 0, 0, 255]);
    assert_eq!(backend.clip(), None);
}
