//! Software-side rendering: rectangles, textures, render backends, draw
//! primitives and the frame-driving draw manager.

#[macro_use]
extern crate tracing;

pub mod rect;
pub mod texture;
pub mod backend;
pub mod draw;
pub mod invalidation;
pub mod draw_manager;

pub use crate::{
    rect::Rect,
    texture::Texture,
    backend::{
        RenderBackend,
        SoftwareBackend,
        CopyParams,
        BackendStats,
    },
    draw::Draw,
    draw_manager::{
        DrawManager,
        DrawManagerConfig,
        TopLevelDrawable,
    },
};
#[cfg(feature = "sdl")]
pub use crate::backend::SdlBackend;
