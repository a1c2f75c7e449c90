//! Built-in 5×7 bitmap font for track labels.
//!
//! Only the glyphs labels need are defined; anything else advances the
//! cursor without drawing.

use image::{Rgb, RgbImage};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Blank column between glyphs
const GLYPH_SPACING: u32 = 1;

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '#' => [0b01010, 0b01010, 0b11111, 0b01010, 0b11111, 0b01010, 0b01010],
        _ => return None,
    };
    Some(rows)
}

/// Pixel size of `text` at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return (0, 0);
    }
    let width = chars * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING;
    (width * scale, GLYPH_HEIGHT * scale)
}

/// Draw `text` with its top-left corner at (x, y). Clipped to the image.
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1) as i32;
    let advance = (GLYPH_WIDTH + GLYPH_SPACING) as i32 * scale;

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin_x = x + i as i32 * advance;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if (bits >> (GLYPH_WIDTH as i32 - 1 - col)) & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as i32 * scale;
                fill_block(image, px, py, scale, color);
            }
        }
    }
}

/// Draw `text` on a filled background box with a one-scale-unit margin.
pub fn draw_label(
    image: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: u32,
    color: Rgb<u8>,
    background: Rgb<u8>,
) {
    let (w, h) = text_size(text, scale);
    let pad = scale.max(1) as i32;
    for dy in 0..h as i32 + 2 * pad {
        for dx in 0..w as i32 + 2 * pad {
            put(image, x + dx, y + dy, background);
        }
    }
    draw_text(image, text, x + pad, y + pad, scale, color);
}

fn fill_block(image: &mut RgbImage, x: i32, y: i32, size: i32, color: Rgb<u8>) {
    for dy in 0..size {
        for dx in 0..size {
            put(image, x + dx, y + dy, color);
        }
    }
}

#[inline]
fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_text_size() {
        assert_eq!(text_size("#12", 1), (17, 7));
        assert_eq!(text_size("#12", 2), (34, 14));
        assert_eq!(text_size("", 2), (0, 0));
    }

    #[test]
    fn test_draws_inside_bounds_only() {
        let mut image = RgbImage::new(20, 10);
        draw_text(&mut image, "#1", -3, -2, 1, WHITE);
        draw_text(&mut image, "88", 15, 5, 2, WHITE);
        assert!(image.pixels().any(|p| *p == WHITE));
    }

    #[test]
    fn test_digit_one_stem() {
        let mut image = RgbImage::new(5, 7);
        draw_text(&mut image, "1", 0, 0, 1, WHITE);
        // Centre column is lit on every row of '1'
        assert!((0..7).all(|y| *image.get_pixel(2, y) == WHITE));
    }

    #[test]
    fn test_label_fills_background() {
        let mut image = RgbImage::new(40, 20);
        let bg = Rgb([10, 20, 30]);
        draw_label(&mut image, "#3", 0, 0, 1, WHITE, bg);
        assert_eq!(*image.get_pixel(0, 0), bg);
    }
}
