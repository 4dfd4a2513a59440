//! Image loading: locators, the modification language, the staged surface
//! cache, and atlas packing.

#[macro_use]
extern crate tracing;

pub mod locator;
pub mod cache;
pub mod color_range;
pub mod modification;
pub mod data_uri;
pub mod localized;
pub mod loader;
pub mod spritesheet;
pub mod atlas;

pub use crate::{
    locator::{
        Locator,
        LocatorKind,
    },
    cache::{
        Cache,
        NotInCache,
    },
    color_range::{
        ColorRange,
        ColorRegistry,
    },
    modification::{
        Modification,
        ModificationContext,
        ModificationQueue,
    },
    loader::{
        ImageLoader,
        ImageType,
        LightAdjust,
        LoaderStats,
    },
    atlas::{
        Atlas,
        AtlasConfig,
        PackError,
    },
};

use std::path::PathBuf;
use serde::{Serialize, Deserialize};


pub const DEFAULT_TILE_SIZE: u32 = 72;


/// What stands in for images that fail to load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placeholder {
    /// `Missing` in debug builds, `Blank` in release builds.
    Default,
    /// A conspicuous checkerboard.
    Missing,
    /// A single transparent pixel.
    Blank,
}

impl Default for Placeholder {
    fn default() -> Self {
        Placeholder::Default
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Directories searched in order for relative image paths. If empty,
    /// paths are relative to the working directory.
    pub search_paths: Vec<PathBuf>,
    /// Language to look for translated images in.
    pub language: Option<String>,
    /// Image to mask hexes with. A hexagon of `tile_size` is generated if
    /// unset.
    pub hex_mask: Option<String>,
    pub placeholder: Placeholder,
    pub tile_size: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            search_paths: Vec::new(),
            language: None,
            hex_mask: None,
            placeholder: Placeholder::Default,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}
