//! Shareable pixel buffers that can be drawn by a render backend.

use crate::rect::Rect;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        Arc,
        Weak,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};
use parking_lot::{
    RwLock,
    RwLockReadGuard,
};
use image::{
    RgbaImage,
    imageops,
};
use vek::*;


static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);


/// Handle to a pixel buffer, cheap to clone.
///
/// Several textures may share one buffer, each showing a different source
/// sub-rectangle of it. This is how atlas sprites are represented.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
    src: Option<Rect>,
    draw_size: Option<Extent2<u32>>,
}

struct TextureInner {
    id: u64,
    generation: AtomicU64,
    target: bool,
    pixels: RwLock<RgbaImage>,
}

impl Texture {
    fn from_parts(image: RgbaImage, target: bool) -> Self {
        Texture {
            inner: Arc::new(TextureInner {
                id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
                generation: AtomicU64::new(0),
                target,
                pixels: RwLock::new(image),
            }),
            src: None,
            draw_size: None,
        }
    }

    /// Wrap an image. The texture takes ownership of the pixels.
    pub fn from_image(image: RgbaImage) -> Self {
        Self::from_parts(image, false)
    }

    /// A transparent texture that can be used as a render target.
    pub fn new_target<E: Into<Extent2<u32>>>(size: E) -> Self {
        let size = size.into();
        Self::from_parts(RgbaImage::new(size.w, size.h), true)
    }

    /// Process-unique id of the underlying buffer.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Bumped whenever the pixels are written to.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn is_target(&self) -> bool {
        self.inner.target
    }

    /// Whether both handles point at the same pixel buffer.
    pub fn same_buffer(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Size of the whole underlying buffer.
    pub fn buffer_size(&self) -> Extent2<u32> {
        let pixels = self.inner.pixels.read();
        Extent2::new(pixels.width(), pixels.height())
    }

    /// The region of the buffer this texture shows, in buffer coordinates.
    pub fn src_rect(&self) -> Rect {
        self.src.unwrap_or_else(|| {
            let size = self.buffer_size();
            Rect::new(0, 0, size.w as i32, size.h as i32)
        })
    }

    /// Size in pixels of the region this texture shows.
    pub fn pixel_size(&self) -> Extent2<u32> {
        let src = self.src_rect();
        Extent2::new(src.w.max(0) as u32, src.h.max(0) as u32)
    }

    /// Size this texture is drawn at when no destination size is given.
    pub fn draw_size(&self) -> Extent2<u32> {
        self.draw_size.unwrap_or_else(|| self.pixel_size())
    }

    pub fn with_draw_size<E: Into<Extent2<u32>>>(mut self, size: E) -> Self {
        self.draw_size = Some(size.into());
        self
    }

    /// A texture sharing this buffer, showing `rect` (relative to this
    /// texture's own source region).
    pub fn sub_texture(&self, rect: Rect) -> Texture {
        let src = self.src_rect();
        let sub = rect.shifted(src.pos()).intersect(&src);
        Texture {
            inner: Arc::clone(&self.inner),
            src: Some(sub),
            draw_size: None,
        }
    }

    /// Read access to the whole underlying buffer.
    pub fn pixels(&self) -> RwLockReadGuard<'_, RgbaImage> {
        self.inner.pixels.read()
    }

    /// Mutate the underlying buffer, bumping the generation.
    pub fn write_pixels<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut RgbaImage) -> R,
    {
        let mut pixels = self.inner.pixels.write();
        let r = f(&mut pixels);
        self.inner.generation.fetch_add(1, Ordering::Release);
        r
    }

    /// A handle that doesn't keep the buffer alive.
    pub fn downgrade(&self) -> WeakTexture {
        WeakTexture {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Copy out the visible region as a standalone image.
    pub fn to_image(&self) -> RgbaImage {
        let src = self.src_rect();
        let pixels = self.pixels();
        if src.is_empty() {
            return RgbaImage::new(0, 0);
        }
        imageops::crop_imm(
            &*pixels,
            src.x as u32,
            src.y as u32,
            src.w as u32,
            src.h as u32,
        ).to_image()
    }
}

/// Non-owning reference to a texture's buffer.
#[derive(Clone)]
pub struct WeakTexture {
    inner: Weak<TextureInner>,
}

impl WeakTexture {
    /// Whether any `Texture` sharing the buffer is still around.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("src", &self.src)
            .field("draw_size", &self.draw_size)
            .finish()
    }
}


#[test]
fn test_sub_texture_shares_buffer() {
    let tex = Texture::from_image(RgbaImage::new(16, 8));
    let sub = tex.sub_texture(Rect::new(4, 2, 8, 4));
    assert!(sub.same_buffer(&tex));
    assert_eq!(sub.pixel_size(), Extent2::new(8, 4));
    assert_eq!(sub.src_rect(), Rect::new(4, 2, 8, 4));

    let subsub = sub.sub_texture(Rect::new(1, 1, 100, 100));
    assert_eq!(subsub.src_rect(), Rect::new(5, 3, 7, 3));
}

#[test]
fn test_write_bumps_generation() {
    let tex = Texture::new_target([2, 2]);
    let g = tex.generation();
    tex.write_pixels(|p| p.put_pixel(0, 0, image::Rgba([1, 2, 3, 4])));
    assert!(tex.generation() > g);
    assert_eq!(tex.to_image().get_pixel(0, 0).0, [1, 2, 3, 4]);
}

#[test]
fn test_weak_texture_follows_buffer() {
    let tex = Texture::from_image(RgbaImage::new(4, 4));
    let weak = tex.downgrade();
    let sub = tex.sub_texture(Rect::new(0, 0, 2, 2));
    drop(tex);
    assert!(weak.is_alive());
    drop(sub);
    assert!(!weak.is_alive());
}
