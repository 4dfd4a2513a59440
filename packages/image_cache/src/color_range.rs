//! Named color ranges and palettes used by recoloring modifications.

use std::collections::HashMap;
use vek::*;


/// Maps source colors to replacement colors. Alpha is left alone.
pub type ColorMap = HashMap<Rgb<u8>, Rgb<u8>>;

/// The range a palette is recolored into. `mid` replaces the palette's
/// reference color, darker colors tend towards `min` and lighter towards
/// `max`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColorRange {
    pub mid: Rgb<u8>,
    pub max: Rgb<u8>,
    pub min: Rgb<u8>,
}

impl ColorRange {
    pub fn new(mid: u32, max: u32, min: u32) -> Self {
        ColorRange {
            mid: rgb_hex(mid),
            max: rgb_hex(max),
            min: rgb_hex(min),
        }
    }
}

fn rgb_hex(hex: u32) -> Rgb<u8> {
    Rgb::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

const DEFAULT_RANGES: &'static [(&'static str, u32, u32, u32)] = &[
    ("red", 0xFF0000, 0xFFFFFF, 0x000000),
    ("blue", 0x2E419B, 0xFFFFFF, 0x0F0F0F),
    ("green", 0x62B664, 0xFFFFFF, 0x000000),
    ("purple", 0x93009D, 0xFFFFFF, 0x000000),
    ("black", 0x5A5A5A, 0xFFFFFF, 0x000000),
    ("brown", 0x945027, 0xFFFFFF, 0x000000),
    ("orange", 0xFF7E00, 0xFFFFFF, 0x0F0F0F),
    ("white", 0xE1E1E1, 0xFFFFFF, 0x1E1E1E),
    ("teal", 0x30CBC0, 0xFFFFFF, 0x000000),
];

// reference color first
const MAGENTA: &'static [u32] = &[
    0xF49AC1, 0x3F0016, 0x55002A, 0x690039, 0x7B0045, 0x8C0051, 0x9E005D,
    0xB10069, 0xC30074, 0xD6007F, 0xEC008C, 0xEE3D96, 0xEF5BA1, 0xF172AC,
    0xF287B6, 0xF39BC2, 0xF5AFCE, 0xF7C3DA, 0xF9D7E6, 0xFCEBF2,
];

const FLAG_GREEN: &'static [u32] = &[
    0x00FF00, 0x003000, 0x006000, 0x009000, 0x00C000, 0x40FF40, 0x80FF80,
    0xC0FFC0,
];

pub const DEFAULT_SOURCE_PALETTE: &'static str = "magenta";


/// Registry of named ranges and palettes.
#[derive(Debug, Clone)]
pub struct ColorRegistry {
    ranges: HashMap<String, ColorRange>,
    palettes: HashMap<String, Vec<Rgb<u8>>>,
    team_order: Vec<String>,
}

impl ColorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        ColorRegistry {
            ranges: HashMap::new(),
            palettes: HashMap::new(),
            team_order: Vec::new(),
        }
    }

    pub fn add_range(&mut self, name: &str, range: ColorRange) {
        self.ranges.insert(name.to_owned(), range);
    }

    pub fn add_palette(&mut self, name: &str, colors: Vec<Rgb<u8>>) {
        self.palettes.insert(name.to_owned(), colors);
    }

    /// Set which ranges side numbers 1, 2, ... map to.
    pub fn set_team_order(&mut self, order: Vec<String>) {
        self.team_order = order;
    }

    pub fn range(&self, name: &str) -> Option<&ColorRange> {
        self.ranges.get(name)
    }

    pub fn palette(&self, name: &str) -> Option<&[Rgb<u8>]> {
        self.palettes.get(name).map(|colors| &colors[..])
    }

    /// Range for a 1-based side number, wrapping around the team order.
    pub fn team_range(&self, side: u32) -> Option<&ColorRange> {
        if side == 0 || self.team_order.is_empty() {
            return None;
        }
        let name = &self.team_order[(side as usize - 1) % self.team_order.len()];
        self.ranges.get(name)
    }

    /// Look up a range by name, or by side number if the name is numeric.
    pub fn range_or_side(&self, name: &str) -> Option<&ColorRange> {
        self.range(name).or_else(|| name
            .parse::<u32>()
            .ok()
            .and_then(|side| self.team_range(side)))
    }
}

impl Default for ColorRegistry {
    /// The stock team colors and palettes.
    fn default() -> Self {
        let mut registry = ColorRegistry::new();
        for &(name, mid, max, min) in DEFAULT_RANGES {
            registry.add_range(name, ColorRange::new(mid, max, min));
        }
        registry.add_palette("magenta", MAGENTA.iter().copied().map(rgb_hex).collect());
        registry.add_palette("flag_green", FLAG_GREEN.iter().copied().map(rgb_hex).collect());
        registry.set_team_order(DEFAULT_RANGES
            .iter()
            .map(|&(name, ..)| name.to_owned())
            .collect());
        registry
    }
}

fn average(c: Rgb<u8>) -> u16 {
    (c.r as u16 + c.g as u16 + c.b as u16) / 3
}

/// Build the map recoloring `palette` into `range`.
///
/// The palette's first color is the reference and maps exactly to the
/// range's mid color. Darker colors are interpolated between mid and min by
/// brightness relative to the reference, lighter ones between mid and max.
pub fn recolor_range(range: &ColorRange, palette: &[Rgb<u8>]) -> ColorMap {
    let mut map = ColorMap::new();
    let reference = match palette.first() {
        Some(&c) => average(c),
        None => return map,
    };
    let mid = range.mid.map(|c| c as f32);
    let min = range.min.map(|c| c as f32);
    let max = range.max.map(|c| c as f32);
    for &old in palette {
        let old_avg = average(old);
        let new =
            if reference > 0 && old_avg <= reference {
                let ratio = old_avg as f32 / reference as f32;
                mid * ratio + min * (1.0 - ratio)
            } else if reference != 255 {
                let ratio = (255.0 - old_avg as f32) / (255.0 - reference as f32);
                mid * ratio + max * (1.0 - ratio)
            } else {
                mid
            };
        map.insert(old, new.map(|c| c.max(0.0).min(255.0) as u8));
    }
    map
}

/// Map each color of `from` to the color at the same index of `to`. Extra
/// colors of the longer palette are ignored.
pub fn palette_map(from: &[Rgb<u8>], to: &[Rgb<u8>]) -> ColorMap {
    from.iter().copied().zip(to.iter().copied()).collect()
}


#[test]
fn test_reference_maps_to_mid() {
    let registry = ColorRegistry::default();
    let magenta = registry.palette(DEFAULT_SOURCE_PALETTE).unwrap();
    let red = registry.range("red").unwrap();
    let map = recolor_range(red, magenta);
    assert_eq!(map[&magenta[0]], Rgb::new(255, 0, 0));
    assert_eq!(map.len(), magenta.len());
    // darkest magenta tends to black
    let darkest = map[&rgb_hex(0x3F0016)];
    assert!(darkest.r < 128 && darkest.g == 0 && darkest.b == 0);
}

#[test]
fn test_team_ranges_wrap() {
    let registry = ColorRegistry::default();
    assert_eq!(registry.team_range(1), registry.range("red"));
    assert_eq!(registry.team_range(2), registry.range("blue"));
    assert_eq!(registry.team_range(10), registry.range("red"));
    assert_eq!(registry.team_range(0), None);
    assert_eq!(registry.range_or_side("3"), registry.range("green"));
}
