//! Demo client wiring the draw manager and image cache together.

#[macro_use]
extern crate tracing;

pub mod logging;
pub mod settings;
pub mod frontend;
pub mod demo;
