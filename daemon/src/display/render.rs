//! Aspect-preserving fit and software compositing for the marquee window.
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Where the scaled image lands inside the monitor area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Scales `image` (up or down) to fit `area` without distortion and centers it.
pub fn fit_within(image_w: u32, image_h: u32, area_w: u32, area_h: u32) -> Placement {
    if image_w == 0 || image_h == 0 || area_w == 0 || area_h == 0 {
        return Placement {
            x: area_w / 2,
            y: area_h / 2,
            width: 0,
            height: 0,
        };
    }

    let scale = f64::min(
        area_w as f64 / image_w as f64,
        area_h as f64 / image_h as f64,
    );
    let width = ((image_w as f64 * scale).round() as u32).clamp(1, area_w);
    let height = ((image_h as f64 * scale).round() as u32).clamp(1, area_h);

    Placement {
        x: (area_w - width) / 2,
        y: (area_h - height) / 2,
        width,
        height,
    }
}

fn blend_channel(src: u8, dst: u32, alpha: u32) -> u32 {
    (src as u32 * alpha + dst * (255 - alpha) + 127) / 255
}

/// Renders `image` fitted and centered over `background` (`0x00RRGGBB`) into
/// a row-major `area_w * area_h` buffer in softbuffer's pixel format.
pub fn compose(image: &RgbaImage, area_w: u32, area_h: u32, background: u32) -> Vec<u32> {
    let mut frame = vec![background; area_w as usize * area_h as usize];
    let placement = fit_within(image.width(), image.height(), area_w, area_h);
    if placement.width == 0 || placement.height == 0 {
        return frame;
    }

    let resized;
    let scaled = if placement.width == image.width() && placement.height == image.height() {
        image
    } else {
        resized = imageops::resize(image, placement.width, placement.height, FilterType::Triangle);
        &resized
    };

    let (bg_r, bg_g, bg_b) = ((background >> 16) & 0xFF, (background >> 8) & 0xFF, background & 0xFF);
    for (x, y, pixel) in scaled.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let out = (blend_channel(r, bg_r, alpha) << 16)
            | (blend_channel(g, bg_g, alpha) << 8)
            | blend_channel(b, bg_b, alpha);
        let idx = (placement.y + y) as usize * area_w as usize + (placement.x + x) as usize;
        frame[idx] = out;
    }
    frame
}
