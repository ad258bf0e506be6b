//! Preview module - the host-facing side of the pipeline.
//!
//! [`PreviewController`] owns the engine handle and coordinates staging,
//! opening, paging and painting. [`Surface`] is the paint target it draws
//! into; [`PixelCanvas`] is an in-memory implementation.

pub mod controller;
pub mod surface;

pub use controller::{PointerButton, PreviewController};
pub use surface::{PixelCanvas, Rect, Surface};
