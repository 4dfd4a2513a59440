//! Packing many small images into one atlas texture.

use crate::spritesheet;
use graphics::{
    Rect,
    Texture,
};
use std::{
    cmp::Reverse,
    collections::HashMap,
    fmt::{self, Formatter, Display},
    path::PathBuf,
};
use image::{
    RgbaImage,
    imageops,
};
use serde::{Serialize, Deserialize};
use vek::*;


pub const DEFAULT_MAX_DIMENSION: u32 = 4096;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Largest width or height an atlas may grow to.
    pub max_dimension: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        AtlasConfig {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    /// The sprites didn't fit before the atlas outgrew the maximum.
    TooLarge {
        max: u32,
        needed: Extent2<u32>,
    },
    Empty,
}

impl Display for PackError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PackError::TooLarge { max, needed } => write!(
                f, "atlas would need to be at least {}x{}, over the maximum of {}",
                needed.w, needed.h, max,
            ),
            PackError::Empty => f.write_str("no sprites to pack"),
        }
    }
}

impl std::error::Error for PackError {}


/// Where each sprite went, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packing {
    pub size: Extent2<u32>,
    pub placements: Vec<Rect>,
}

impl Packing {
    /// Fraction of the atlas covered by sprites.
    pub fn efficiency(&self) -> f32 {
        let total = self.size.w as f64 * self.size.h as f64;
        let used = self.placements
            .iter()
            .map(|rect| rect.area() as f64)
            .sum::<f64>();
        if total > 0.0 { (used / total) as f32 } else { 0.0 }
    }
}

/// Pack rectangles of the given sizes into the smallest power-of-two atlas
/// the packer finds.
///
/// Sprites are placed largest first into the free rectangle that leaves the
/// shortest leftover side. Leftover space is split along the free
/// rectangle's shorter axis, and free rectangles sharing a whole edge are
/// merged. When everything doesn't fit, the shorter side doubles.
pub fn pack(sizes: &[Extent2<u32>], config: &AtlasConfig) -> Result<Packing, PackError> {
    if sizes.is_empty() {
        return Err(PackError::Empty);
    }
    let mut order = (0..sizes.len()).collect::<Vec<_>>();
    order.sort_by_key(|&i| {
        let s = sizes[i];
        Reverse((s.w.max(s.h), s.w.min(s.h)))
    });

    // placements are i32 rects
    let max = config.max_dimension.min(i32::MAX as u32);
    if let Some(&needed) = sizes.iter().find(|s| s.w > max || s.h > max) {
        return Err(PackError::TooLarge { max, needed });
    }

    let area = sizes
        .iter()
        .fold(0u64, |area, s| area.saturating_add(s.w as u64 * s.h as u64));
    let bits = 64 - area.leading_zeros();
    let mut size = Extent2::new(1u32 << ((bits + 1) / 2).min(31), 1u32 << (bits / 2).min(31));

    loop {
        if size.w > max || size.h > max {
            return Err(PackError::TooLarge { max, needed: size });
        }
        if let Some(placements) = try_pack(size, sizes, &order) {
            return Ok(Packing { size, placements });
        }
        if size.w <= size.h {
            size.w = size.w.saturating_mul(2);
        } else {
            size.h = size.h.saturating_mul(2);
        }
    }
}

fn try_pack(size: Extent2<u32>, sizes: &[Extent2<u32>], order: &[usize]) -> Option<Vec<Rect>> {
    let mut free = vec![Rect::new(0, 0, size.w as i32, size.h as i32)];
    let mut placements = vec![Rect::empty(); sizes.len()];
    for &i in order {
        let (w, h) = (sizes[i].w as i32, sizes[i].h as i32);
        if w == 0 || h == 0 {
            continue;
        }
        let (best, _) = free
            .iter()
            .enumerate()
            .filter(|(_, f)| f.w >= w && f.h >= h)
            .min_by_key(|(_, f)| {
                let (lw, lh) = (f.w - w, f.h - h);
                (lw.min(lh), lw.max(lh))
            })?;
        let f = free.remove(best);
        placements[i] = Rect::new(f.x, f.y, w, h);

        let (right, below) =
            if f.w <= f.h {
                (
                    Rect::new(f.x + w, f.y, f.w - w, h),
                    Rect::new(f.x, f.y + h, f.w, f.h - h),
                )
            } else {
                (
                    Rect::new(f.x + w, f.y, f.w - w, f.h),
                    Rect::new(f.x, f.y + h, w, f.h - h),
                )
            };
        free.extend([right, below].into_iter().filter(|r| !r.is_empty()));
        merge_free(&mut free);
    }
    Some(placements)
}

// merge free rects that share a whole edge, until none do
fn merge_free(free: &mut Vec<Rect>) {
    'outer: loop {
        for i in 0..free.len() {
            for j in 0..free.len() {
                if i == j {
                    continue;
                }
                let (a, b) = (free[i], free[j]);
                let merged =
                    if a.x == b.x && a.w == b.w && a.bottom() == b.y {
                        Some(Rect::new(a.x, a.y, a.w, a.h + b.h))
                    } else if a.y == b.y && a.h == b.h && a.right() == b.x {
                        Some(Rect::new(a.x, a.y, a.w + b.w, a.h))
                    } else {
                        None
                    };
                if let Some(merged) = merged {
                    free[i] = merged;
                    free.remove(j);
                    continue 'outer;
                }
            }
        }
        break;
    }
}


/// One image holding many sprites.
#[derive(Debug, Clone)]
pub struct Atlas {
    pub image: RgbaImage,
    pub sprites: HashMap<String, Rect>,
}

impl Atlas {
    /// Pack named images into an atlas.
    pub fn from_images(images: Vec<(String, RgbaImage)>, config: &AtlasConfig) -> Result<Self, PackError> {
        let sizes = images
            .iter()
            .map(|(_, image)| Extent2::new(image.width(), image.height()))
            .collect::<Vec<_>>();
        let packing = pack(&sizes, config)?;
        debug!(
            sprites=%images.len(),
            width=%packing.size.w,
            height=%packing.size.h,
            efficiency=%packing.efficiency(),
            "packed atlas",
        );

        let mut image = RgbaImage::new(packing.size.w, packing.size.h);
        let mut sprites = HashMap::new();
        for ((name, sprite), rect) in images.into_iter().zip(packing.placements) {
            imageops::replace(&mut image, &sprite, rect.x as i64, rect.y as i64);
            sprites.insert(name, rect);
        }
        Ok(Atlas { image, sprites })
    }

    /// A texture per sprite, all sharing one pixel buffer.
    pub fn textures(&self) -> HashMap<String, Texture> {
        let base = Texture::from_image(self.image.clone());
        self.sprites
            .iter()
            .map(|(name, &rect)| (name.clone(), base.sub_texture(rect)))
            .collect()
    }
}

/// Load image files on worker threads and pack them into an atlas. Sprites
/// are named by their path.
pub fn build_atlas(paths: &[PathBuf], config: &AtlasConfig) -> Result<Atlas, PackError> {
    let images = spritesheet::load_images(paths)
        .into_iter()
        .map(|(path, image)| (path.to_string_lossy().into_owned(), image))
        .collect();
    Atlas::from_images(images, config)
}


#[cfg(test)]
fn assert_valid(packing: &Packing, sizes: &[Extent2<u32>]) {
    let bounds = Rect::new(0, 0, packing.size.w as i32, packing.size.h as i32);
    for (i, (a, size)) in packing.placements.iter().zip(sizes).enumerate() {
        assert_eq!((a.w as u32, a.h as u32), (size.w, size.h));
        assert!(bounds.contains(a), "{} outside {}", a, bounds);
        for b in &packing.placements[i + 1..] {
            assert!(!a.overlaps(b), "{} overlaps {}", a, b);
        }
    }
}

#[test]
fn test_pack_random_no_overlap() {
    use rand::prelude::*;
    use rand_pcg::Pcg32;

    let mut rng = Pcg32::seed_from_u64(0xa71a5);
    for _ in 0..20 {
        let n = rng.gen_range(1..60);
        let sizes = (0..n)
            .map(|_| Extent2::new(rng.gen_range(1..80), rng.gen_range(1..80)))
            .collect::<Vec<_>>();
        let packing = pack(&sizes, &AtlasConfig::default()).unwrap();
        assert!(packing.size.w.is_power_of_two() && packing.size.h.is_power_of_two());
        assert_valid(&packing, &sizes);
        assert!(packing.efficiency() > 0.0 && packing.efficiency() <= 1.0);
    }
}

#[test]
fn test_pack_exact_fit() {
    let sizes = vec![Extent2::new(16, 16); 4];
    let packing = pack(&sizes, &AtlasConfig::default()).unwrap();
    // 1024 pixels is an 11 bit area, so the first try is 64x32
    assert_eq!(packing.size, Extent2::new(64, 32));
    assert_valid(&packing, &sizes);
    assert_eq!(packing.efficiency(), 0.5);
}

#[test]
fn test_pack_errors() {
    let config = AtlasConfig { max_dimension: 64 };
    assert_eq!(pack(&[], &config), Err(PackError::Empty));
    assert!(matches!(
        pack(&[Extent2::new(65, 1)], &config),
        Err(PackError::TooLarge { max: 64, .. }),
    ));
    assert!(matches!(
        pack(&vec![Extent2::new(32, 32); 5], &config),
        Err(PackError::TooLarge { .. }),
    ));
}

#[test]
fn test_pack_huge_max_dimension_terminates() {
    let config = AtlasConfig { max_dimension: u32::MAX };
    let max = i32::MAX as u32;
    assert_eq!(
        pack(&[Extent2::new(u32::MAX, 1)], &config),
        Err(PackError::TooLarge { max, needed: Extent2::new(u32::MAX, 1) }),
    );
    assert!(matches!(
        pack(&vec![Extent2::new(1 << 30, 1 << 30); 5], &config),
        Err(PackError::TooLarge { max: m, .. }) if m == max,
    ));
    let packing = pack(&vec![Extent2::new(1 << 29, 1 << 29); 2], &config).unwrap();
    assert_eq!(packing.size, Extent2::new(1 << 30, 1 << 30));
}

#[test]
fn test_build_atlas_shares_buffer() {
    let dir = crate::localized::test_dir("atlas");
    let mut paths = Vec::new();
    for (i, (w, h)) in [(8, 8), (4, 12), (10, 3)].into_iter().enumerate() {
        let path = dir.join(format!("{}.png", i));
        RgbaImage::from_pixel(w, h, image::Rgba([i as u8 * 50, 0, 0, 255]))
            .save(&path)
            .unwrap();
        paths.push(path);
    }
    let atlas = build_atlas(&paths, &AtlasConfig::default()).unwrap();
    assert_eq!(atlas.sprites.len(), 3);

    let textures = atlas.textures();
    let first = &textures[&*paths[1].to_string_lossy()];
    let second = &textures[&*paths[2].to_string_lossy()];
    assert!(first.same_buffer(second));
    assert_eq!(first.pixel_size(), Extent2::new(4, 12));
    assert!(first.to_image().pixels().all(|p| p.0 == [50, 0, 0, 255]));
}
