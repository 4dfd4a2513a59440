//! The staged surface pipeline.
//!
//! Each stage has its own cache and is computed from the stage below it on
//! a miss:
//!
//! - unscaled: the decoded file, or for sub-file locators the base file with
//!   modifications applied and a sub-rectangle cut out
//! - hexed: unscaled, alpha-masked to the hex shape
//! - tod-colored: hexed, shifted by the time-of-day color adjustment
//!
//! Lit variants are cached per locator, keyed by a fingerprint of the
//! lights.

use crate::{
    ImageConfig,
    Placeholder,
    cache::Cache,
    color_range::ColorRegistry,
    data_uri,
    localized,
    locator::{
        Locator,
        LocatorKind,
    },
    modification::{
        ImageSource,
        Modification,
        ModificationContext,
        ModificationQueue,
    },
};
use graphics::{
    Rect,
    Texture,
};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use anyhow::{
    Result,
    Context,
    anyhow,
};
use image::{
    RgbaImage,
    imageops,
};
use vek::*;


const MISSING_CHECKER_SIZE: u32 = 16;
const MISSING_CHECKER_CELL: u32 = 4;
const WEBP_FALLBACK_EXTENSIONS: &'static [&'static str] = &["png", "jpg"];


#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageType {
    Unscaled,
    Hexed,
    TodColored,
}

/// Counters for observing the loader's caching.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Image files and data URIs decoded.
    pub decodes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Images that fell back to the placeholder.
    pub errors: u64,
}

/// One light affecting an image.
///
/// `direction` is a hex edge, 0 being north and counting clockwise, or -1
/// for light over the whole image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LightAdjust {
    pub direction: i8,
    pub r: i16,
    pub g: i16,
    pub b: i16,
}

/// Key identifying a set of lights in the lit variant cache.
pub fn light_fingerprint(lights: &[LightAdjust]) -> String {
    let mut fingerprint = String::new();
    for light in lights {
        let _ = write!(fingerprint, "{},{},{},{};", light.direction, light.r, light.g, light.b);
    }
    fingerprint
}

fn apply_lights(image: &mut RgbaImage, lights: &[LightAdjust]) {
    let (w, h) = image.dimensions();
    let center = Vec2::new(w as f32, h as f32) / 2.0;
    let radius = center.x.max(center.y).max(1.0);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if pixel.0[3] == 0 {
            continue;
        }
        let offset = (Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center) / radius;
        let mut shift = Vec3::<f32>::zero();
        for light in lights {
            let weight =
                if light.direction < 0 {
                    1.0
                } else {
                    let angle = (light.direction as f32 * 60.0).to_radians();
                    offset.dot(Vec2::new(angle.sin(), -angle.cos())).max(0.0)
                };
            shift += Vec3::new(light.r, light.g, light.b).map(|c| c as f32) * weight;
        }
        for c in 0..3 {
            pixel.0[c] = (pixel.0[c] as f32 + shift[c]).round().max(0.0).min(255.0) as u8;
        }
    }
}

fn missing_checker() -> RgbaImage {
    RgbaImage::from_fn(MISSING_CHECKER_SIZE, MISSING_CHECKER_SIZE, |x, y| {
        if (x / MISSING_CHECKER_CELL + y / MISSING_CHECKER_CELL) % 2 == 0 {
            image::Rgba([255, 0, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    })
}

fn placeholder_image(placeholder: Placeholder) -> RgbaImage {
    let missing = match placeholder {
        Placeholder::Default => cfg!(debug_assertions),
        Placeholder::Missing => true,
        Placeholder::Blank => false,
    };
    if missing {
        missing_checker()
    } else {
        RgbaImage::new(1, 1)
    }
}

/// Flat-topped hexagon filling a `size`x`size` square.
pub fn generate_hex_mask(size: u32) -> RgbaImage {
    let half = size as f32 / 2.0;
    RgbaImage::from_fn(size, size, |x, y| {
        let dx = (x as f32 + 0.5 - half).abs();
        let dy = (y as f32 + 0.5 - half).abs();
        if dy <= half && dx <= half - dy / 2.0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    })
}

// alpha-mask with the mask centered over the image, returning whether
// nothing visible is left
fn mask_centered(image: &mut RgbaImage, mask: &RgbaImage) -> bool {
    let ox = (image.width() as i64 - mask.width() as i64) / 2;
    let oy = (image.height() as i64 - mask.height() as i64) / 2;
    let mut empty = true;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (mx, my) = (x as i64 - ox, y as i64 - oy);
        let inside = mx >= 0
            && my >= 0
            && mx < mask.width() as i64
            && my < mask.height() as i64;
        pixel.0[3] =
            if inside {
                pixel.0[3].min(mask.get_pixel(mx as u32, my as u32).0[3])
            } else {
                0
            };
        empty &= pixel.0[3] == 0;
    }
    empty
}

// cut `area` out of the image, transparent where it lies outside
fn cut(image: &RgbaImage, area: Rect) -> RgbaImage {
    let mut out = RgbaImage::new(area.w.max(0) as u32, area.h.max(0) as u32);
    let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);
    let visible = area.intersect(&bounds);
    if !visible.is_empty() {
        let part = imageops::crop_imm(
            image,
            visible.x as u32,
            visible.y as u32,
            visible.w as u32,
            visible.h as u32,
        ).to_image();
        imageops::replace(
            &mut out,
            &part,
            (visible.x - area.x) as i64,
            (visible.y - area.y) as i64,
        );
    }
    out
}


#[derive(Default)]
struct Caches {
    unscaled: Cache<Arc<RgbaImage>>,
    hexed: Cache<Arc<RgbaImage>>,
    tod_colored: Cache<Arc<RgbaImage>>,
    is_empty_hex: Cache<bool>,
    exists: Cache<bool>,
    lit: Cache<HashMap<String, Arc<RgbaImage>>>,
    textures: HashMap<ImageType, Cache<Texture>>,
    hex_mask: Option<Arc<RgbaImage>>,
}

impl Caches {
    fn stage(&self, ty: ImageType) -> &Cache<Arc<RgbaImage>> {
        match ty {
            ImageType::Unscaled => &self.unscaled,
            ImageType::Hexed => &self.hexed,
            ImageType::TodColored => &self.tod_colored,
        }
    }

    fn stage_mut(&mut self, ty: ImageType) -> &mut Cache<Arc<RgbaImage>> {
        match ty {
            ImageType::Unscaled => &mut self.unscaled,
            ImageType::Hexed => &mut self.hexed,
            ImageType::TodColored => &mut self.tod_colored,
        }
    }
}

/// Loads images through the stage pipeline, caching every stage.
///
/// Single-threaded: all methods take `&self`, and no cache borrow is held
/// while a lower stage is being computed, so stages may recurse into the
/// loader freely.
pub struct ImageLoader {
    config: ImageConfig,
    colors: ColorRegistry,
    caches: RefCell<Caches>,
    color_adjust: Cell<Vec3<i32>>,
    stats: Cell<LoaderStats>,
    placeholder: Arc<RgbaImage>,
    void: Arc<RgbaImage>,
}

impl ImageLoader {
    pub fn new(config: ImageConfig) -> Self {
        Self::with_colors(config, ColorRegistry::default())
    }

    pub fn with_colors(config: ImageConfig, colors: ColorRegistry) -> Self {
        let placeholder = Arc::new(placeholder_image(config.placeholder));
        ImageLoader {
            config,
            colors,
            caches: RefCell::new(Caches::default()),
            color_adjust: Cell::new(Vec3::zero()),
            stats: Cell::new(LoaderStats::default()),
            placeholder,
            void: Arc::new(RgbaImage::new(0, 0)),
        }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub fn colors(&self) -> &ColorRegistry {
        &self.colors
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats.get()
    }

    fn count<F: FnOnce(&mut LoaderStats)>(&self, f: F) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn simplify(&self, loc: &Locator, mut ty: ImageType) -> ImageType {
        if ty == ImageType::TodColored && self.color_adjust.get() == Vec3::zero() {
            ty = ImageType::Hexed;
        }
        if ty == ImageType::Hexed && !loc.location().is_empty() {
            ty = ImageType::Unscaled;
        }
        ty
    }

    /// The image for `loc` at stage `ty`. Never fails: images that can't be
    /// loaded are logged once and replaced with the placeholder.
    pub fn get_surface(&self, loc: &Locator, ty: ImageType, skip_cache: bool) -> Arc<RgbaImage> {
        if loc.is_void() {
            return self.void.clone();
        }
        let ty = self.simplify(loc, ty);

        let cached = self.caches.borrow()
            .stage(ty)
            .locate_in_cache(loc)
            .ok()
            .cloned();
        if let Some(image) = cached {
            self.count(|s| s.hits += 1);
            return image;
        }
        self.count(|s| s.misses += 1);

        let image = match ty {
            ImageType::Unscaled => self.load_unscaled(loc),
            ImageType::Hexed => self.load_hexed(loc),
            ImageType::TodColored => self.load_tod_colored(loc),
        };
        if !skip_cache {
            self.caches.borrow_mut()
                .stage_mut(ty)
                .add_to_cache(loc, image.clone());
        }
        image
    }

    fn load_unscaled(&self, loc: &Locator) -> Arc<RgbaImage> {
        match loc.kind() {
            LocatorKind::Void => self.void.clone(),
            LocatorKind::File => match self.load_file(loc) {
                Ok(image) => {
                    self.count(|s| s.decodes += 1);
                    Arc::new(image)
                }
                Err(e) => {
                    error!("could not load image {}: {:#}", loc, e);
                    self.count(|s| s.errors += 1);
                    self.placeholder.clone()
                }
            },
            LocatorKind::SubFile => self.load_sub_file(loc),
        }
    }

    fn load_file(&self, loc: &Locator) -> Result<RgbaImage> {
        if loc.is_data_uri() {
            return Ok(data_uri::parse(loc.filename())?.decode_image(false)?);
        }
        let path = self.resolve_path(loc.filename())
            .ok_or_else(|| anyhow!("file not found"))?;
        let mut image = self.decode_path(&path)?;
        if let Some(lang) = self.language() {
            if let Some(overlay) = localized::find_overlay(&path, lang) {
                match self.decode_path(&overlay) {
                    Ok(overlay) => imageops::overlay(&mut image, &overlay, 0, 0),
                    Err(e) => warn!("could not load translated overlay: {:#}", e),
                }
            }
        }
        Ok(image)
    }

    fn decode_path(&self, path: &Path) -> Result<RgbaImage> {
        let bytes = fs::read(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("decoding {}", path.display()))?;
        Ok(image.to_rgba8())
    }

    fn language(&self) -> Option<&str> {
        self.config.language
            .as_deref()
            .filter(|lang| !lang.is_empty())
    }

    /// Find the file an image name refers to.
    ///
    /// Searches the configured paths in order. A missing `.png` or `.jpg`
    /// is also looked for as `.webp`. An up to date translation of the
    /// found file replaces it.
    pub fn resolve_path(&self, filename: &str) -> Option<PathBuf> {
        let path = self.search(Path::new(filename))
            .or_else(|| {
                let ext = Path::new(filename).extension()?.to_str()?;
                if WEBP_FALLBACK_EXTENSIONS.contains(&ext) {
                    let webp = self.search(&Path::new(filename).with_extension("webp"))?;
                    debug!(%filename, webp=%webp.display(), "falling back to webp");
                    Some(webp)
                } else {
                    None
                }
            })?;
        match self.language().and_then(|lang| localized::find_localized(&path, lang)) {
            Some(localized) => Some(localized),
            None => Some(path),
        }
    }

    fn search(&self, name: &Path) -> Option<PathBuf> {
        if name.is_absolute() || self.config.search_paths.is_empty() {
            return Some(name.to_owned()).filter(|path| path.is_file());
        }
        self.config.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    fn load_sub_file(&self, loc: &Locator) -> Arc<RgbaImage> {
        let base = self.get_surface(&loc.base(), ImageType::Unscaled, false);
        let mut image =
            if loc.modifications().is_empty() {
                (*base).clone()
            } else {
                let context = ModificationContext::new(&self.colors).with_images(self);
                ModificationQueue::decode(loc.modifications(), &context)
                    .apply((*base).clone())
            };

        let mut area = loc.location();
        if !area.is_empty() {
            if loc.center_x() >= 0 && loc.center_y() >= 0 {
                area.x += image.width() as i32 / 2 - loc.center_x();
                area.y += image.height() as i32 / 2 - loc.center_y();
            }
            image = cut(&image, area);
        }
        Arc::new(image)
    }

    fn hex_mask(&self) -> Arc<RgbaImage> {
        if let Some(mask) = self.caches.borrow().hex_mask.clone() {
            return mask;
        }
        let mask = match self.config.hex_mask {
            Some(ref path) => self.get_surface(&Locator::new(path), ImageType::Unscaled, false),
            None => Arc::new(generate_hex_mask(self.config.tile_size)),
        };
        self.caches.borrow_mut().hex_mask = Some(mask.clone());
        mask
    }

    fn load_hexed(&self, loc: &Locator) -> Arc<RgbaImage> {
        let mut image = (*self.get_surface(loc, ImageType::Unscaled, false)).clone();
        let empty = mask_centered(&mut image, &self.hex_mask());
        self.caches.borrow_mut().is_empty_hex.add_to_cache(loc, empty);
        Arc::new(image)
    }

    fn load_tod_colored(&self, loc: &Locator) -> Arc<RgbaImage> {
        let base = self.get_surface(loc, ImageType::Hexed, false);
        let mut image = (*base).clone();
        if let Err(e) = Modification::ColorShift(self.color_adjust.get()).apply(&mut image) {
            error!(%e, locator=%loc, "time of day coloring failed");
        }
        Arc::new(image)
    }

    /// Set the time-of-day color adjustment. Changing it discards every
    /// tod-colored and lit image.
    pub fn set_color_adjustment(&self, r: i32, g: i32, b: i32) {
        let adjust = Vec3::new(r, g, b);
        if self.color_adjust.replace(adjust) == adjust {
            return;
        }
        debug!(%r, %g, %b, "color adjustment changed");
        let mut caches = self.caches.borrow_mut();
        caches.tod_colored.flush();
        caches.lit.flush();
        if let Some(textures) = caches.textures.get_mut(&ImageType::TodColored) {
            textures.flush();
        }
    }

    pub fn color_adjustment(&self) -> Vec3<i32> {
        self.color_adjust.get()
    }

    /// The tod-colored image with `lights` applied on top.
    pub fn get_lighted_surface(&self, loc: &Locator, lights: &[LightAdjust]) -> Arc<RgbaImage> {
        if lights.is_empty() {
            return self.get_surface(loc, ImageType::TodColored, false);
        }
        if loc.is_void() {
            return self.void.clone();
        }
        let fingerprint = light_fingerprint(lights);
        let cached = self.caches.borrow()
            .lit
            .locate_in_cache(loc)
            .ok()
            .and_then(|variants| variants.get(&fingerprint).cloned());
        if let Some(image) = cached {
            self.count(|s| s.hits += 1);
            return image;
        }
        self.count(|s| s.misses += 1);

        let mut image = (*self.get_surface(loc, ImageType::TodColored, false)).clone();
        apply_lights(&mut image, lights);
        let image = Arc::new(image);
        self.caches.borrow_mut()
            .lit
            .access_in_cache(loc)
            .insert(fingerprint, image.clone());
        image
    }

    /// Whether the file behind `loc` can be found, without decoding it.
    pub fn exists(&self, loc: &Locator) -> bool {
        if loc.is_void() {
            return false;
        }
        let base = loc.base();
        if let Ok(&exists) = self.caches.borrow().exists.locate_in_cache(&base) {
            return exists;
        }
        let exists =
            if base.is_data_uri() {
                data_uri::parse(base.filename()).is_ok()
            } else {
                self.resolve_path(base.filename()).is_some()
            };
        self.caches.borrow_mut().exists.add_to_cache(&base, exists);
        exists
    }

    /// Whether masking `loc` to the hex shape leaves nothing visible.
    pub fn is_empty_hex(&self, loc: &Locator) -> bool {
        let known = self.caches.borrow()
            .is_empty_hex
            .locate_in_cache(loc)
            .ok()
            .copied();
        if let Some(empty) = known {
            return empty;
        }
        self.get_surface(loc, ImageType::Hexed, false);
        self.caches.borrow()
            .is_empty_hex
            .locate_in_cache(loc)
            .ok()
            .copied()
            .unwrap_or(false)
    }

    /// The image for `loc` as a texture, cached per stage.
    ///
    /// Unlike surfaces, textures may come from WebP data URIs.
    pub fn get_texture(&self, loc: &Locator, ty: ImageType) -> Texture {
        let ty = self.simplify(loc, ty);
        let cached = self.caches.borrow()
            .textures
            .get(&ty)
            .and_then(|cache| cache.locate_in_cache(loc).ok().cloned());
        if let Some(texture) = cached {
            self.count(|s| s.hits += 1);
            return texture;
        }

        let webp = Some(loc)
            .filter(|loc| loc.kind() == LocatorKind::File && loc.is_data_uri())
            .and_then(|loc| data_uri::parse(loc.filename()).ok())
            .filter(|uri| uri.mime == "image/webp");
        let image = match webp {
            Some(uri) => match uri.decode_image(true) {
                Ok(image) => {
                    self.count(|s| s.decodes += 1);
                    image
                }
                Err(e) => {
                    error!(%e, locator=%loc, "could not load image");
                    self.count(|s| s.errors += 1);
                    (*self.placeholder).clone()
                }
            },
            None => (*self.get_surface(loc, ty, false)).clone(),
        };
        let texture = Texture::from_image(image);
        self.caches.borrow_mut()
            .textures
            .entry(ty)
            .or_default()
            .add_to_cache(loc, texture.clone());
        texture
    }

    /// Forget every cached image, texture, and flag.
    pub fn flush_cache(&self) {
        *self.caches.borrow_mut() = Caches::default();
        debug!("image caches flushed");
    }
}

impl ImageSource for ImageLoader {
    fn image(&self, locator: &Locator) -> Arc<RgbaImage> {
        self.get_surface(locator, ImageType::Unscaled, false)
    }
}

/// Save an image, in the format its extension names.
pub fn save_image(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    image.save(path)
        .with_context(|| format!("saving image to {}", path.display()))?;
    Ok(())
}


#[cfg(test)]
fn test_loader(dir: &Path) -> ImageLoader {
    ImageLoader::new(ImageConfig {
        search_paths: vec![dir.to_owned()],
        placeholder: Placeholder::Missing,
        ..Default::default()
    })
}

#[cfg(test)]
fn write_png(path: &Path, image: &RgbaImage) {
    image.save_with_format(path, image::ImageFormat::Png).unwrap();
}

#[cfg(test)]
fn grass() -> RgbaImage {
    RgbaImage::from_fn(72, 72, |x, y| image::Rgba([(x * 3) as u8, 200, (y * 3) as u8, 255]))
}

#[test]
fn test_decoded_once() {
    let dir = localized::test_dir("decoded-once");
    write_png(&dir.join("grass.png"), &grass());
    let loader = test_loader(&dir);

    let a = loader.get_surface(&Locator::new("grass.png"), ImageType::Unscaled, false);
    let b = loader.get_surface(&Locator::new("grass.png"), ImageType::Unscaled, false);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*a, grass());

    let grey = loader.get_surface(&Locator::new("grass.png~GS()"), ImageType::Unscaled, false);
    assert_eq!(loader.stats().decodes, 1);
    for p in grey.pixels() {
        assert_eq!(p.0[0], p.0[1]);
        assert_eq!(p.0[1], p.0[2]);
    }

    loader.flush_cache();
    loader.get_surface(&Locator::new("grass.png"), ImageType::Unscaled, false);
    assert_eq!(loader.stats().decodes, 2);
}

#[test]
fn test_missing_file_placeholder() {
    let dir = localized::test_dir("missing");
    let loader = test_loader(&dir);
    let loc = Locator::new("nope.png");
    let image = loader.get_surface(&loc, ImageType::Unscaled, false);
    assert_eq!(*image, missing_checker());
    loader.get_surface(&loc, ImageType::Unscaled, false);
    assert_eq!(loader.stats().errors, 1);
    assert!(!loader.exists(&loc));
    assert!(loader.get_surface(&Locator::default(), ImageType::Hexed, false).is_empty());
}

#[test]
fn test_webp_fallback() {
    let dir = localized::test_dir("webp");
    // decoding sniffs the format, so png bytes under a .webp name will do
    write_png(&dir.join("tree.webp"), &RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255])));
    let loader = test_loader(&dir);
    assert_eq!(loader.resolve_path("tree.png"), Some(dir.join("tree.webp")));
    assert_eq!(loader.resolve_path("tree.gif"), None);
    assert!(loader.exists(&Locator::new("tree.jpg~FL()")));
    let loaded = loader.get_surface(&Locator::new("tree.png"), ImageType::Unscaled, false);
    assert_eq!(loaded.dimensions(), (4, 4));
    assert_eq!(loader.stats().errors, 0);
}

#[test]
fn test_localized_replacement() {
    let dir = localized::test_dir("loader-l10n");
    let l10n = dir.join("l10n").join("de");
    fs::create_dir_all(&l10n).unwrap();
    write_png(&dir.join("title.png"), &RgbaImage::from_pixel(2, 2, image::Rgba([1, 1, 1, 255])));
    write_png(&l10n.join("title.png"), &RgbaImage::from_pixel(2, 2, image::Rgba([2, 2, 2, 255])));
    let loader = ImageLoader::new(ImageConfig {
        search_paths: vec![dir.clone()],
        language: Some("de".to_owned()),
        ..Default::default()
    });
    let image = loader.get_surface(&Locator::new("title.png"), ImageType::Unscaled, false);
    assert_eq!(image.get_pixel(0, 0).0, [2, 2, 2, 255]);
}

#[test]
fn test_sub_file_cut_and_center() {
    let dir = localized::test_dir("sub-file");
    write_png(&dir.join("grass.png"), &grass());
    let loader = test_loader(&dir);

    let loc = Locator::sub_file("grass.png", "", Rect::new(10, 20, 5, 5), -1, -1);
    let image = loader.get_surface(&loc, ImageType::Hexed, false);
    assert_eq!(image.dimensions(), (5, 5));
    assert_eq!(image.get_pixel(0, 0), grass().get_pixel(10, 20));

    // centered on the image's own center, the rect doesn't move
    let centered = Locator::sub_file("grass.png", "", Rect::new(10, 20, 5, 5), 36, 36);
    assert_eq!(*loader.get_surface(&centered, ImageType::Unscaled, false), *image);

    // partly outside the image is transparent
    let edge = Locator::sub_file("grass.png", "", Rect::new(70, 0, 4, 1), -1, -1);
    let image = loader.get_surface(&edge, ImageType::Unscaled, false);
    assert_eq!(image.get_pixel(1, 0).0[3], 255);
    assert_eq!(image.get_pixel(2, 0).0[3], 0);
}

#[test]
fn test_sub_file_modified_then_cut() {
    let dir = localized::test_dir("sub-file-modified");
    write_png(&dir.join("grass.png"), &grass());
    let loader = test_loader(&dir);
    let flipped = imageops::flip_horizontal(&grass());

    let loc = Locator::sub_file("grass.png", "~FL()", Rect::new(10, 20, 5, 5), -1, -1);
    let unscaled = loader.get_surface(&loc, ImageType::Unscaled, false);
    assert_eq!(unscaled.dimensions(), (5, 5));
    assert_eq!(unscaled.get_pixel(0, 0), flipped.get_pixel(10, 20));
    assert_eq!(unscaled.get_pixel(4, 4), flipped.get_pixel(14, 24));

    // a cut image is never hexed
    let hexed = loader.get_surface(&loc, ImageType::Hexed, false);
    assert_eq!(*hexed, *unscaled);

    // without a cut, hexing works on the modified image
    let whole = Locator::new("grass.png~FL()");
    let hexed = loader.get_surface(&whole, ImageType::Hexed, false);
    assert_eq!(hexed.dimensions(), (72, 72));
    assert_eq!(hexed.get_pixel(36, 36), flipped.get_pixel(36, 36));
    assert_eq!(hexed.get_pixel(0, 0).0[3], 0);
    assert_eq!(loader.stats().errors, 0);
    assert_eq!(loader.stats().decodes, 1);
}

#[test]
fn test_hexed_and_tod() {
    let dir = localized::test_dir("hexed");
    write_png(&dir.join("grass.png"), &grass());
    write_png(&dir.join("clear.png"), &RgbaImage::new(72, 72));
    let loader = test_loader(&dir);
    let loc = Locator::new("grass.png");

    let hexed = loader.get_surface(&loc, ImageType::Hexed, false);
    assert_eq!(hexed.get_pixel(0, 0).0[3], 0);
    assert_eq!(hexed.get_pixel(36, 36).0[3], 255);
    assert!(!loader.is_empty_hex(&loc));
    assert!(loader.is_empty_hex(&Locator::new("clear.png")));

    // no adjustment: same image as hexed
    let tod = loader.get_surface(&loc, ImageType::TodColored, false);
    assert!(Arc::ptr_eq(&tod, &hexed));

    loader.set_color_adjustment(-10, 0, 0);
    let tod = loader.get_surface(&loc, ImageType::TodColored, false);
    assert_eq!(tod.get_pixel(36, 36).0[0], hexed.get_pixel(36, 36).0[0].saturating_sub(10));
}

#[test]
fn test_lit_cache_keyed_by_fingerprint() {
    let dir = localized::test_dir("lit");
    write_png(&dir.join("grass.png"), &grass());
    let loader = test_loader(&dir);
    let loc = Locator::new("grass.png");
    let warm = [LightAdjust { direction: -1, r: 20, g: 0, b: 0 }];
    let cold = [LightAdjust { direction: -1, r: 0, g: 0, b: 20 }];

    let a = loader.get_lighted_surface(&loc, &warm);
    let b = loader.get_lighted_surface(&loc, &warm);
    let c = loader.get_lighted_surface(&loc, &cold);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_ne!(light_fingerprint(&warm), light_fingerprint(&cold));

    loader.set_color_adjustment(0, 5, 0);
    let d = loader.get_lighted_surface(&loc, &warm);
    assert!(!Arc::ptr_eq(&a, &d));
}

#[test]
fn test_data_uri_textures() {
    let image = RgbaImage::from_pixel(3, 3, image::Rgba([5, 6, 7, 255]));
    let loader = ImageLoader::new(ImageConfig::default());
    let loc = Locator::new(&data_uri::png_data_uri(&image));
    assert_eq!(*loader.get_surface(&loc, ImageType::Unscaled, false), image);
    let texture = loader.get_texture(&loc, ImageType::Unscaled);
    assert_eq!(texture.to_image(), image);
    let again = loader.get_texture(&loc, ImageType::Unscaled);
    assert!(texture.same_buffer(&again));
}

#[test]
fn test_data_uri_with_modifications() {
    let image = RgbaImage::from_fn(3, 3, |x, y| image::Rgba([x as u8 * 80, y as u8 * 60, 30, 255]));
    let loader = ImageLoader::new(ImageConfig::default());
    let uri = data_uri::png_data_uri(&image);

    let loc = Locator::new(&format!("{}~GS()", uri));
    let grey = loader.get_surface(&loc, ImageType::Unscaled, false);
    assert_eq!(grey.dimensions(), (3, 3));
    for p in grey.pixels() {
        assert_eq!(p.0[0], p.0[1]);
        assert_eq!(p.0[1], p.0[2]);
    }

    let loc = Locator::new(&format!("{}~FL()", uri));
    let flipped = loader.get_surface(&loc, ImageType::Unscaled, false);
    assert_eq!(*flipped, imageops::flip_horizontal(&image));
    assert_eq!(loader.stats().errors, 0);
}

#[test]
fn test_save_image() {
    let dir = localized::test_dir("save");
    let path = dir.join("out").join("shot.png");
    save_image(&grass(), &path).unwrap();
    assert_eq!(image::open(&path).unwrap().to_rgba8(), grass());
}
