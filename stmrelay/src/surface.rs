//! Rendering surfaces

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Default surface width (pixels)
pub const DEFAULT_SURFACE_WIDTH: u32 = 640;

/// Default surface height (pixels)
pub const DEFAULT_SURFACE_HEIGHT: u32 = 360;

/// Opaque black, used for the blank placeholder
pub const BLANK_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Axis-aligned rectangle in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Something the relay can draw on
pub trait RenderSurface {
    /// Surface dimensions as `(width, height)`
    fn size(&self) -> (u32, u32);

    /// Draws `image` with its top-left corner at `(x, y)`
    ///
    /// With `size`, the image is scaled to `(width, height)` first.
    fn draw_image(&mut self, image: &DynamicImage, x: i64, y: i64, size: Option<(u32, u32)>);

    /// Fills `rect` with `color`
    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>);

    /// Whole surface
    fn bounds(&self) -> Rect {
        let (width, height) = self.size();
        Rect::new(0, 0, width, height)
    }
}

/// In-memory RGBA surface
#[derive(Debug, Clone)]
pub struct ImageSurface {
    canvas: RgbaImage,
}

impl Default for ImageSurface {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_WIDTH, DEFAULT_SURFACE_HEIGHT)
    }
}

impl ImageSurface {
    /// Creates a transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        (x < self.canvas.width() && y < self.canvas.height()).then(|| *self.canvas.get_pixel(x, y))
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }
}

impl RenderSurface for ImageSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn draw_image(&mut self, image: &DynamicImage, x: i64, y: i64, size: Option<(u32, u32)>) {
        let source = match size {
            Some((width, height)) if (width, height) != (image.width(), image.height()) => {
                imageops::resize(&image.to_rgba8(), width, height, FilterType::Triangle)
            }
            _ => image.to_rgba8(),
        };
        imageops::overlay(&mut self.canvas, &source, x, y);
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let (width, height) = self.canvas.dimensions();
        let x0 = rect.x.clamp(0, width as i64) as u32;
        let y0 = rect.y.clamp(0, height as i64) as u32;
        let x1 = (rect.x + rect.width as i64).clamp(0, width as i64) as u32;
        let y1 = (rect.y + rect.height as i64).clamp(0, height as i64) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                self.canvas.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut surface = ImageSurface::new(10, 10);
        surface.fill_rect(Rect::new(-5, 8, 8, 8), BLANK_COLOR);

        assert_eq!(surface.pixel(0, 9), Some(BLANK_COLOR));
        assert_eq!(surface.pixel(2, 9), Some(BLANK_COLOR));
        assert_eq!(surface.pixel(3, 9), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(surface.pixel(0, 7), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(surface.pixel(10, 0), None);
    }

    #[test]
    fn test_draw_image_scales_to_requested_size() {
        let mut surface = ImageSurface::new(8, 4);
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));

        surface.draw_image(&red, 0, 0, Some(surface.size()));

        assert!(surface
            .canvas()
            .pixels()
            .all(|p| p[0] > 250 && p[1] < 5 && p[3] > 250));
    }

    #[test]
    fn test_draw_image_at_natural_size() {
        let mut surface = ImageSurface::default();
        assert_eq!(surface.size(), (640, 360));

        let green = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 255, 0, 255])));
        surface.draw_image(&green, 1, 1, None);

        assert_eq!(surface.pixel(1, 1), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(surface.pixel(3, 3), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(surface.pixel(4, 4), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(surface.pixel(0, 0), Some(Rgba([0, 0, 0, 0])));
    }
}
