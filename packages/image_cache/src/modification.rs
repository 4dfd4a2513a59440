//! The image modification mini-language: `~OP(args)~OP(args)...`.
//!
//! A modification string decodes into a queue of modifications, which is
//! then drained onto an image. Recoloring runs before everything else, since
//! it has to see the original hues; otherwise modifications apply in the
//! order written.

use crate::{
    locator::Locator,
    color_range::{
        ColorRegistry,
        ColorMap,
        recolor_range,
        palette_map,
    },
};
use graphics::Rect;
use std::{
    collections::{BTreeMap, VecDeque},
    fmt::{self, Formatter, Display},
    str::FromStr,
    sync::Arc,
};
use image::{
    RgbaImage,
    imageops::{self, FilterType},
};
use vek::*;


/// Priority of the recoloring modifications.
pub const RECOLOR_PRIORITY: i32 = 400;


/// Provides images referenced by modifications such as `BLIT`.
pub trait ImageSource {
    fn image(&self, locator: &Locator) -> Arc<RgbaImage>;
}

/// What decoding a modification string may refer to.
#[derive(Copy, Clone)]
pub struct ModificationContext<'a> {
    pub colors: &'a ColorRegistry,
    pub images: Option<&'a dyn ImageSource>,
}

impl<'a> ModificationContext<'a> {
    pub fn new(colors: &'a ColorRegistry) -> Self {
        ModificationContext {
            colors,
            images: None,
        }
    }

    pub fn with_images(mut self, images: &'a dyn ImageSource) -> Self {
        self.images = Some(images);
        self
    }
}


/// One segment of a modification string couldn't be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub segment: String,
    pub message: String,
}

impl DecodeError {
    fn new<M: Into<String>>(segment: &str, message: M) -> Self {
        DecodeError {
            segment: segment.to_owned(),
            message: message.into(),
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "invalid image modification {:?}: {}", self.segment, self.message)
    }
}

impl std::error::Error for DecodeError {}

/// A decoded modification couldn't be applied to a particular image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationError {
    pub operation: &'static str,
    pub message: String,
}

impl ModificationError {
    fn new<M: Into<String>>(operation: &'static str, message: M) -> Self {
        ModificationError {
            operation,
            message: message.into(),
        }
    }
}

impl Display for ModificationError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} modification failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for ModificationError {}


#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
            Channel::Alpha => 3,
        }
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "red" | "r" => Ok(Channel::Red),
            "green" | "g" => Ok(Channel::Green),
            "blue" | "b" => Ok(Channel::Blue),
            "alpha" | "a" => Ok(Channel::Alpha),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Modification {
    /// `RC`, `TC` and `PAL`.
    Recolor(ColorMap),
    Flip {
        horizontal: bool,
        vertical: bool,
    },
    /// Clockwise, in degrees.
    Rotate(i32),
    Greyscale,
    BlackWhite(u8),
    Sepia,
    /// Per channel, a value is inverted if its inverse exceeds the
    /// threshold.
    Negative(Vec3<i32>),
    /// Zero width or height extends to the image edge.
    Crop(Rect),
    Scale {
        w: u32,
        h: u32,
        sharp: bool,
        preserve_aspect: bool,
    },
    Blit {
        image: Arc<RgbaImage>,
        x: i32,
        y: i32,
    },
    Mask {
        image: Arc<RgbaImage>,
        x: i32,
        y: i32,
    },
    Light(Arc<RgbaImage>),
    Opacity(f32),
    ColorShift(Vec3<i32>),
    Blend {
        color: Rgb<u8>,
        amount: f32,
    },
    Blur(u32),
    Background(Rgba<u8>),
    Swap([Channel; 4]),
    /// Integer upscale.
    Upscale(u32),
}

fn pixels_mut<F>(image: &mut RgbaImage, mut f: F)
where
    F: FnMut(&mut [u8; 4]),
{
    for pixel in image.pixels_mut() {
        f(&mut pixel.0);
    }
}

fn clamp_u8(n: i32) -> u8 {
    n.max(0).min(255) as u8
}

fn luma(p: &[u8; 4]) -> u8 {
    ((77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32) / 256) as u8
}

fn rotate_any(image: &RgbaImage, degrees: i32) -> RgbaImage {
    let (sin, cos) = (degrees as f64).to_radians().sin_cos();
    let (w, h) = (image.width() as f64, image.height() as f64);
    let nw = (w * cos.abs() + h * sin.abs()).round() as u32;
    let nh = (w * sin.abs() + h * cos.abs()).round() as u32;
    let mut out = RgbaImage::new(nw, nh);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - nw as f64 / 2.0;
        let dy = y as f64 + 0.5 - nh as f64 / 2.0;
        let sx = (dx * cos + dy * sin + w / 2.0).floor();
        let sy = (-dx * sin + dy * cos + h / 2.0).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *pixel = *image.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}

impl Modification {
    pub fn priority(&self) -> i32 {
        match self {
            Modification::Recolor(_) => RECOLOR_PRIORITY,
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modification::Recolor(_) => "recolor",
            Modification::Flip { .. } => "FL",
            Modification::Rotate(_) => "ROTATE",
            Modification::Greyscale => "GS",
            Modification::BlackWhite(_) => "BW",
            Modification::Sepia => "SEPIA",
            Modification::Negative(_) => "NEG",
            Modification::Crop(_) => "CROP",
            Modification::Scale { .. } => "SCALE",
            Modification::Blit { .. } => "BLIT",
            Modification::Mask { .. } => "MASK",
            Modification::Light(_) => "L",
            Modification::Opacity(_) => "O",
            Modification::ColorShift(_) => "CS",
            Modification::Blend { .. } => "BLEND",
            Modification::Blur(_) => "BL",
            Modification::Background(_) => "BG",
            Modification::Swap(_) => "SWAP",
            Modification::Upscale(_) => "xBRZ",
        }
    }

    /// Apply to `image`. On error, `image` is left untouched.
    pub fn apply(&self, image: &mut RgbaImage) -> Result<(), ModificationError> {
        let (iw, ih) = image.dimensions();
        match *self {
            Modification::Recolor(ref map) => pixels_mut(image, |p| {
                if p[3] == 0 {
                    return;
                }
                if let Some(new) = map.get(&Rgb::new(p[0], p[1], p[2])) {
                    p[0] = new.r;
                    p[1] = new.g;
                    p[2] = new.b;
                }
            }),
            Modification::Flip { horizontal, vertical } => {
                if horizontal {
                    imageops::flip_horizontal_in_place(image);
                }
                if vertical {
                    imageops::flip_vertical_in_place(image);
                }
            }
            Modification::Rotate(degrees) => {
                *image = match degrees.rem_euclid(360) {
                    0 => return Ok(()),
                    90 => imageops::rotate90(image),
                    180 => imageops::rotate180(image),
                    270 => imageops::rotate270(image),
                    other => rotate_any(image, other),
                };
            }
            Modification::Greyscale => pixels_mut(image, |p| {
                let y = luma(p);
                p[0] = y;
                p[1] = y;
                p[2] = y;
            }),
            Modification::BlackWhite(threshold) => pixels_mut(image, |p| {
                let v = if luma(p) >= threshold { 255 } else { 0 };
                p[0] = v;
                p[1] = v;
                p[2] = v;
            }),
            Modification::Sepia => pixels_mut(image, |p| {
                let [r, g, b] = [p[0] as f32, p[1] as f32, p[2] as f32];
                p[0] = (r * 0.393 + g * 0.769 + b * 0.189).min(255.0) as u8;
                p[1] = (r * 0.349 + g * 0.686 + b * 0.168).min(255.0) as u8;
                p[2] = (r * 0.272 + g * 0.534 + b * 0.131).min(255.0) as u8;
            }),
            Modification::Negative(threshold) => pixels_mut(image, |p| {
                for (c, t) in p.iter_mut().zip(threshold.into_array()) {
                    let inv = 255 - *c;
                    if inv as i32 > t {
                        *c = inv;
                    }
                }
            }),
            Modification::Crop(rect) => {
                if rect.x < 0 || rect.y < 0 {
                    return Err(ModificationError::new("CROP", format!("negative crop origin {}", rect)));
                }
                let mut area = rect;
                if area.w <= 0 {
                    area.w = iw as i32 - area.x;
                }
                if area.h <= 0 {
                    area.h = ih as i32 - area.y;
                }
                let area = area.intersect(&Rect::new(0, 0, iw as i32, ih as i32));
                if area.is_empty() {
                    return Err(ModificationError::new("CROP", format!("{} lies outside the image", rect)));
                }
                *image = imageops::crop_imm(
                    image,
                    area.x as u32,
                    area.y as u32,
                    area.w as u32,
                    area.h as u32,
                ).to_image();
            }
            Modification::Scale { w, h, sharp, preserve_aspect } => {
                if iw == 0 || ih == 0 {
                    return Err(ModificationError::new("SCALE", "cannot scale an empty image"));
                }
                let (w, h) =
                    if preserve_aspect {
                        let rx = if w == 0 { f64::INFINITY } else { w as f64 / iw as f64 };
                        let ry = if h == 0 { f64::INFINITY } else { h as f64 / ih as f64 };
                        let ratio = rx.min(ry);
                        (
                            ((iw as f64 * ratio).round() as u32).max(1),
                            ((ih as f64 * ratio).round() as u32).max(1),
                        )
                    } else {
                        (if w == 0 { iw } else { w }, if h == 0 { ih } else { h })
                    };
                let filter = if sharp { FilterType::Nearest } else { FilterType::Triangle };
                *image = imageops::resize(image, w, h, filter);
            }
            Modification::Blit { image: ref blit, x, y } => {
                let fits = x >= 0
                    && y >= 0
                    && x as u32 + blit.width() <= iw
                    && y as u32 + blit.height() <= ih;
                if !fits {
                    return Err(ModificationError::new("BLIT", format!(
                        "{}x{} image at {},{} does not fit in {}x{}",
                        blit.width(), blit.height(), x, y, iw, ih,
                    )));
                }
                imageops::overlay(image, &**blit, x as i64, y as i64);
            }
            Modification::Mask { image: ref mask, x, y } => {
                if x < 0 || y < 0 {
                    return Err(ModificationError::new("MASK", format!("negative mask offset {},{}", x, y)));
                }
                for (px, py, pixel) in image.enumerate_pixels_mut() {
                    let (mx, my) = (px as i64 - x as i64, py as i64 - y as i64);
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
                }
            }
            Modification::Light(ref light) => {
                let resized;
                let light =
                    if light.dimensions() == (iw, ih) {
                        &**light
                    } else {
                        resized = imageops::resize(&**light, iw, ih, FilterType::Triangle);
                        &resized
                    };
                for (pixel, l) in image.pixels_mut().zip(light.pixels()) {
                    for c in 0..3 {
                        let delta = (l.0[c] as i32 - 128) * 2;
                        pixel.0[c] = clamp_u8(pixel.0[c] as i32 + delta);
                    }
                }
            }
            Modification::Opacity(opacity) => pixels_mut(image, |p| {
                p[3] = (p[3] as f32 * opacity).round().max(0.0).min(255.0) as u8;
            }),
            Modification::ColorShift(shift) => pixels_mut(image, |p| {
                if p[3] == 0 {
                    return;
                }
                for (c, d) in p.iter_mut().zip(shift.into_array()) {
                    *c = clamp_u8(*c as i32 + d);
                }
            }),
            Modification::Blend { color, amount } => pixels_mut(image, |p| {
                for (c, target) in p.iter_mut().zip(color.into_array()) {
                    *c = (*c as f32 * (1.0 - amount) + target as f32 * amount).round() as u8;
                }
            }),
            Modification::Blur(radius) => {
                if radius > 0 {
                    *image = imageops::blur(image, radius as f32);
                }
            }
            Modification::Background(color) => {
                let mut out = RgbaImage::from_pixel(iw, ih, image::Rgba(color.into_array()));
                imageops::overlay(&mut out, image, 0, 0);
                *image = out;
            }
            Modification::Swap(channels) => pixels_mut(image, |p| {
                let old = *p;
                for (c, from) in p.iter_mut().zip(channels) {
                    *c = old[from.index()];
                }
            }),
            Modification::Upscale(factor) => {
                *image = imageops::resize(image, iw * factor, ih * factor, FilterType::Nearest);
            }
        }
        Ok(())
    }
}


/// Priority-ordered, single-use queue of modifications.
///
/// The highest priority comes out first, equal priorities in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct ModificationQueue {
    buckets: BTreeMap<i32, VecDeque<Modification>>,
    len: usize,
}

impl ModificationQueue {
    pub fn new() -> Self {
        Default::default()
    }

    /// Decode a modification string. Segments that fail to decode are
    /// logged and skipped.
    pub fn decode(text: &str, context: &ModificationContext) -> Self {
        let mut queue = ModificationQueue::new();
        for segment in split_top_level(text, '~') {
            match decode_segment(segment, context) {
                Ok(Some(modification)) => queue.push(modification),
                Ok(None) => (),
                Err(e) => error!(%e, "skipping image modification"),
            }
        }
        queue
    }

    pub fn push(&mut self, modification: Modification) {
        self.buckets
            .entry(modification.priority())
            .or_default()
            .push_back(modification);
        self.len += 1;
    }

    pub fn top(&self) -> Option<&Modification> {
        self.buckets
            .values()
            .next_back()
            .and_then(VecDeque::front)
    }

    pub fn pop(&mut self) -> Option<Modification> {
        let mut bucket = self.buckets.last_entry()?;
        let modification = bucket.get_mut().pop_front();
        if bucket.get().is_empty() {
            bucket.remove();
        }
        if modification.is_some() {
            self.len -= 1;
        }
        modification
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain the queue onto `image`. A modification that fails is logged
    /// and skipped, keeping the image as modified so far.
    pub fn apply(mut self, mut image: RgbaImage) -> RgbaImage {
        while let Some(modification) = self.pop() {
            if let Err(e) = modification.apply(&mut image) {
                error!(%e, "failed to apply image modification");
            }
        }
        image
    }
}

// split on `sep` outside of parentheses, dropping empty pieces
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth <= 0 => {
                pieces.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => (),
        }
    }
    pieces.push(&text[start..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

struct Args<'s> {
    segment: &'s str,
    args: Vec<&'s str>,
}

impl<'s> Args<'s> {
    fn len(&self) -> usize {
        self.args.len()
    }

    fn err<M: Into<String>>(&self, message: M) -> DecodeError {
        DecodeError::new(self.segment, message)
    }

    fn expect_count(&self, allowed: &[usize]) -> Result<(), DecodeError> {
        if allowed.contains(&self.args.len()) {
            Ok(())
        } else {
            Err(self.err(format!("expected {:?} arguments, got {}", allowed, self.args.len())))
        }
    }

    fn str(&self, i: usize) -> Result<&'s str, DecodeError> {
        self.args
            .get(i)
            .copied()
            .ok_or_else(|| self.err(format!("missing argument {}", i + 1)))
    }

    fn parse<T: FromStr>(&self, i: usize) -> Result<T, DecodeError> {
        let s = self.str(i)?;
        s.parse().map_err(|_| self.err(format!("invalid argument {:?}", s)))
    }

    fn parse_or<T: FromStr>(&self, i: usize, default: T) -> Result<T, DecodeError> {
        if i < self.args.len() {
            self.parse(i)
        } else {
            Ok(default)
        }
    }

    fn color_component(&self, i: usize, default: i32) -> Result<u8, DecodeError> {
        let n = self.parse_or(i, default)?;
        if (0..=255).contains(&n) {
            Ok(n as u8)
        } else {
            Err(self.err(format!("color component {} out of range", n)))
        }
    }

    // `0.5` or `50%`
    fn fraction(&self, i: usize) -> Result<f32, DecodeError> {
        let s = self.str(i)?;
        let value = match s.strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f32>().map(|p| p / 100.0),
            None => s.parse::<f32>(),
        };
        match value {
            Ok(v) if v >= 0.0 && v.is_finite() => Ok(v),
            _ => Err(self.err(format!("invalid fraction {:?}", s))),
        }
    }

    fn image(&self, i: usize, context: &ModificationContext) -> Result<Arc<RgbaImage>, DecodeError> {
        let path = self.str(i)?;
        let images = context.images
            .ok_or_else(|| self.err("no image source to load from"))?;
        Ok(images.image(&Locator::new(path)))
    }
}

fn decode_segment(
    segment: &str,
    context: &ModificationContext,
) -> Result<Option<Modification>, DecodeError> {
    let open = segment
        .find('(')
        .ok_or_else(|| DecodeError::new(segment, "missing argument list"))?;
    let inner = segment[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| DecodeError::new(segment, "unterminated argument list"))?;
    let name = segment[..open].trim();
    let args = Args {
        segment,
        args: split_top_level(inner, ','),
    };

    let modification = match name {
        "RC" => {
            let (from, to) = inner
                .split_once('>')
                .ok_or_else(|| args.err("expected source>target"))?;
            let (from, to) = (from.trim(), to.trim());
            let palette = context.colors
                .palette(from)
                .ok_or_else(|| args.err(format!("unknown palette {:?}", from)))?;
            let range = context.colors
                .range_or_side(to)
                .ok_or_else(|| args.err(format!("unknown color range {:?}", to)))?;
            Modification::Recolor(recolor_range(range, palette))
        }
        "TC" => {
            args.expect_count(&[2])?;
            let side = args.parse::<u32>(0)?;
            let range = context.colors
                .team_range(side)
                .ok_or_else(|| args.err(format!("no team color for side {}", side)))?;
            let from = args.str(1)?;
            let palette = context.colors
                .palette(from)
                .ok_or_else(|| args.err(format!("unknown palette {:?}", from)))?;
            Modification::Recolor(recolor_range(range, palette))
        }
        "PAL" => {
            let (from, to) = inner
                .split_once('>')
                .ok_or_else(|| args.err("expected source>target"))?;
            let (from, to) = (from.trim(), to.trim());
            let from = context.colors
                .palette(from)
                .ok_or_else(|| args.err(format!("unknown palette {:?}", from)))?;
            let to = context.colors
                .palette(to)
                .ok_or_else(|| args.err(format!("unknown palette {:?}", to)))?;
            Modification::Recolor(palette_map(from, to))
        }
        "FL" => {
            let mut horizontal = args.len() == 0;
            let mut vertical = false;
            for &arg in &args.args {
                match arg {
                    "horiz" | "h" => horizontal = true,
                    "vert" | "v" => vertical = true,
                    "hv" | "vh" => {
                        horizontal = true;
                        vertical = true;
                    }
                    _ => return Err(args.err(format!("unknown flip direction {:?}", arg))),
                }
            }
            Modification::Flip { horizontal, vertical }
        }
        "ROTATE" => {
            args.expect_count(&[0, 1])?;
            Modification::Rotate(args.parse_or(0, 90)?)
        }
        "GS" => Modification::Greyscale,
        "BW" => {
            args.expect_count(&[1])?;
            Modification::BlackWhite(args.color_component(0, 0)?)
        }
        "SEPIA" => Modification::Sepia,
        "NEG" => {
            args.expect_count(&[0, 1, 3])?;
            let thresholds = match args.len() {
                0 => Vec3::broadcast(-1),
                1 => Vec3::broadcast(args.color_component(0, 0)? as i32),
                _ => Vec3::new(
                    args.color_component(0, 0)? as i32,
                    args.color_component(1, 0)? as i32,
                    args.color_component(2, 0)? as i32,
                ),
            };
            Modification::Negative(thresholds)
        }
        "CROP" => {
            args.expect_count(&[2, 4])?;
            Modification::Crop(Rect::new(
                args.parse(0)?,
                args.parse(1)?,
                args.parse_or(2, 0)?,
                args.parse_or(3, 0)?,
            ))
        }
        "SCALE" | "SCALE_SHARP" | "SCALE_INTO" | "SCALE_INTO_SHARP" => {
            args.expect_count(&[1, 2])?;
            let w = args.parse::<i32>(0)?;
            let h = args.parse_or::<i32>(1, 0)?;
            if w < 0 || h < 0 {
                return Err(args.err("negative dimensions"));
            }
            if w == 0 && h == 0 {
                return Err(args.err("no dimensions given"));
            }
            Modification::Scale {
                w: w as u32,
                h: h as u32,
                sharp: name.ends_with("_SHARP"),
                preserve_aspect: name.starts_with("SCALE_INTO"),
            }
        }
        "BLIT" | "MASK" => {
            args.expect_count(&[1, 3])?;
            let image = args.image(0, context)?;
            let x = args.parse_or(1, 0)?;
            let y = args.parse_or(2, 0)?;
            if name == "BLIT" {
                Modification::Blit { image, x, y }
            } else {
                Modification::Mask { image, x, y }
            }
        }
        "L" => {
            args.expect_count(&[1])?;
            Modification::Light(args.image(0, context)?)
        }
        "O" => {
            args.expect_count(&[1])?;
            Modification::Opacity(args.fraction(0)?)
        }
        "CS" => {
            args.expect_count(&[1, 2, 3])?;
            Modification::ColorShift(Vec3::new(
                args.parse(0)?,
                args.parse_or(1, 0)?,
                args.parse_or(2, 0)?,
            ))
        }
        "R" | "G" | "B" => {
            args.expect_count(&[1])?;
            let mut shift = Vec3::zero();
            let i = match name { "R" => 0, "G" => 1, _ => 2 };
            shift[i] = args.parse(0)?;
            Modification::ColorShift(shift)
        }
        "BLEND" => {
            args.expect_count(&[4])?;
            Modification::Blend {
                color: Rgb::new(
                    args.color_component(0, 0)?,
                    args.color_component(1, 0)?,
                    args.color_component(2, 0)?,
                ),
                amount: args.fraction(3)?.min(1.0),
            }
        }
        "BL" => {
            args.expect_count(&[1])?;
            Modification::Blur(args.parse(0)?)
        }
        "BG" => {
            args.expect_count(&[0, 1, 2, 3, 4])?;
            Modification::Background(Rgba::new(
                args.color_component(0, 0)?,
                args.color_component(1, 0)?,
                args.color_component(2, 0)?,
                args.color_component(3, 255)?,
            ))
        }
        "SWAP" => {
            args.expect_count(&[3, 4])?;
            let mut channels = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];
            for i in 0..args.len() {
                let arg = args.str(i)?;
                channels[i] = arg
                    .parse()
                    .map_err(|()| args.err(format!("unknown channel {:?}", arg)))?;
            }
            Modification::Swap(channels)
        }
        "xBRZ" => {
            args.expect_count(&[1])?;
            let factor = args.parse::<i32>(0)?;
            let clamped = factor.max(2).min(5);
            if clamped != factor {
                warn!(%factor, %clamped, "xBRZ factor out of range, clamping");
            }
            Modification::Upscale(clamped as u32)
        }
        "NOP" => return Ok(None),
        _ => return Err(DecodeError::new(segment, format!("unknown modification {:?}", name))),
    };
    Ok(Some(modification))
}


#[cfg(test)]
fn test_image() -> RgbaImage {
    RgbaImage::from_fn(4, 2, |x, y| image::Rgba([
        (x * 60) as u8,
        (y * 100) as u8,
        200,
        255,
    ]))
}

#[cfg(test)]
fn decode_test(text: &str) -> ModificationQueue {
    let colors = ColorRegistry::default();
    ModificationQueue::decode(text, &ModificationContext::new(&colors))
}

#[cfg(test)]
struct SolidSource;

#[cfg(test)]
impl ImageSource for SolidSource {
    fn image(&self, _: &Locator) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255])))
    }
}

#[test]
fn test_empty_queue_is_identity() {
    let queue = decode_test("");
    assert!(queue.is_empty());
    assert_eq!(queue.apply(test_image()), test_image());
    assert_eq!(decode_test("~NOP()").apply(test_image()), test_image());
}

#[test]
fn test_recolor_comes_first() {
    let mut queue = decode_test("~FL()~GS()~RC(magenta>red)~CROP(0,0,1,1)~TC(2,magenta)");
    assert_eq!(queue.len(), 5);
    let order = std::iter::from_fn(|| queue.pop())
        .map(|m| m.name())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["recolor", "recolor", "FL", "GS", "CROP"]);
    assert!(queue.buckets.is_empty());
    assert!(queue.top().is_none());
}

#[test]
fn test_bad_segments_skipped() {
    let queue = decode_test("~FL()~BOGUS(1)~SCALE(-1,2)~GS~RC(nope>red)~GS()");
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_greyscale() {
    let out = decode_test("~GS()").apply(test_image());
    for p in out.pixels() {
        assert_eq!(p.0[0], p.0[1]);
        assert_eq!(p.0[1], p.0[2]);
    }
}

#[test]
fn test_geometry() {
    assert_eq!(decode_test("~ROTATE()").apply(test_image()).dimensions(), (2, 4));
    assert_eq!(decode_test("~ROTATE(180)").apply(test_image()).dimensions(), (4, 2));
    assert_eq!(decode_test("~ROTATE(45)").apply(test_image()).dimensions(), (4, 4));
    assert_eq!(decode_test("~CROP(1,0)").apply(test_image()).dimensions(), (3, 2));
    assert_eq!(decode_test("~CROP(1,1,2,1)").apply(test_image()).dimensions(), (2, 1));
    assert_eq!(decode_test("~SCALE(8,0)").apply(test_image()).dimensions(), (8, 2));
    assert_eq!(decode_test("~SCALE_INTO(2,2)").apply(test_image()).dimensions(), (2, 1));
    assert_eq!(decode_test("~xBRZ(9)").apply(test_image()).dimensions(), (20, 10));

    let flipped = decode_test("~FL(horiz)").apply(test_image());
    assert_eq!(flipped.get_pixel(0, 0), test_image().get_pixel(3, 0));
}

#[test]
fn test_failed_modification_keeps_image() {
    // crop entirely outside, then greyscale still applies
    let out = decode_test("~CROP(10,10,2,2)~GS()").apply(test_image());
    assert_eq!(out.dimensions(), (4, 2));
    let p = out.get_pixel(3, 1).0;
    assert_eq!(p[0], p[2]);
}

#[test]
fn test_pixel_ops() {
    let out = decode_test("~O(50%)").apply(test_image());
    assert_eq!(out.get_pixel(0, 0).0[3], 128);

    let out = decode_test("~SWAP(blue,green,red)").apply(test_image());
    assert_eq!(out.get_pixel(1, 1).0, [200, 100, 60, 255]);

    let out = decode_test("~NEG()").apply(test_image());
    assert_eq!(out.get_pixel(1, 1).0, [195, 155, 55, 255]);

    let out = decode_test("~R(100)~G(-200)").apply(test_image());
    assert_eq!(out.get_pixel(3, 1).0, [255, 0, 200, 255]);

    let out = decode_test("~BW(128)").apply(test_image());
    assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[test]
fn test_blit_needs_source() {
    let colors = ColorRegistry::default();
    let without = ModificationQueue::decode("~BLIT(a.png)", &ModificationContext::new(&colors));
    assert!(without.is_empty());

    let source = SolidSource;
    let context = ModificationContext::new(&colors).with_images(&source);
    let queue = ModificationQueue::decode("~BLIT(a.png~FL(),1,0)", &context);
    assert_eq!(queue.len(), 1);
    let out = queue.apply(test_image());
    assert_eq!(out.get_pixel(1, 0).0, [9, 9, 9, 255]);
    assert_eq!(out.get_pixel(0, 0), test_image().get_pixel(0, 0));
}
