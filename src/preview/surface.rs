use crate::models::Bitmap;

/// Axis-aligned target rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Paint target handed to [`PreviewController::paint`](super::PreviewController::paint).
///
/// A host backs this with its real drawing context; [`PixelCanvas`] is an
/// in-memory implementation.
pub trait Surface {
    /// A surface that is not active must not be drawn on.
    fn is_active(&self) -> bool;

    fn erase(&mut self, area: Rect);

    /// Draw `image` stretched to fill `target`.
    fn draw_image(&mut self, target: Rect, image: &Bitmap);
}

/// In-memory ARGB32 surface with nearest-neighbour scaling.
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    background: u32,
    active: bool,
    draw_calls: usize,
}

impl PixelCanvas {
    pub const WHITE: u32 = 0xFFFF_FFFF;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Self::WHITE; (width as usize) * (height as usize)],
            background: Self::WHITE,
            active: true,
            draw_calls: 0,
        }
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_background(&mut self, argb: u32) {
        self.background = argb;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[self.offset(x, y)])
    }

    /// Number of `draw_image` calls since creation.
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    /// Intersect `area` with the canvas bounds as half-open ranges.
    fn clip(&self, area: Rect) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
        let x_end = area.x.saturating_add(area.width).min(self.width);
        let y_end = area.y.saturating_add(area.height).min(self.height);
        (area.x.min(x_end)..x_end, area.y.min(y_end)..y_end)
    }
}

impl Surface for PixelCanvas {
    fn is_active(&self) -> bool {
        self.active
    }

    fn erase(&mut self, area: Rect) {
        let (xs, ys) = self.clip(area);
        for y in ys {
            for x in xs.clone() {
                let offset = self.offset(x, y);
                self.pixels[offset] = self.background;
            }
        }
    }

    fn draw_image(&mut self, target: Rect, image: &Bitmap) {
        self.draw_calls += 1;
        if target.is_empty() || image.is_empty() {
            return;
        }

        let (xs, ys) = self.clip(target);
        for y in ys {
            let src_y = ((y - target.y) as u64 * image.height() as u64 / target.height as u64) as u32;
            for x in xs.clone() {
                let src_x =
                    ((x - target.x) as u64 * image.width() as u64 / target.width as u64) as u32;
                if let Some(argb) = image.pixel(src_x, src_y) {
                    let offset = self.offset(x, y);
                    self.pixels[offset] = argb;
                }
            }
        }
    }
}
