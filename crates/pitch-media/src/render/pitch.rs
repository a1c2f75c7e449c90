//! Abstract pitch background shared by the top-down views.

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

const GRASS: Rgb<u8> = Rgb([34, 120, 50]);
const GRASS_STRIPE: Rgb<u8> = Rgb([40, 132, 58]);
const MARKING: Rgb<u8> = Rgb([235, 235, 235]);

/// Pitch dimensions in metres.
const PITCH_LENGTH_M: f32 = 105.0;
const PITCH_WIDTH_M: f32 = 68.0;
const CENTRE_CIRCLE_M: f32 = 9.15;
const PENALTY_DEPTH_M: f32 = 16.5;
const PENALTY_WIDTH_M: f32 = 40.32;
const GOAL_AREA_DEPTH_M: f32 = 5.5;
const GOAL_AREA_WIDTH_M: f32 = 18.32;
const STRIPES: u32 = 10;

/// Pre-rendered pitch, cloned as the starting image of every frame.
#[derive(Debug, Clone)]
pub struct PitchCanvas {
    background: RgbImage,
}

impl PitchCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut image = RgbImage::from_pixel(width, height, GRASS);

        let stripe = (width / STRIPES).max(1);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            if (x / stripe) % 2 == 1 {
                *pixel = GRASS_STRIPE;
            }
        }

        draw_markings(&mut image);
        Self { background: image }
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    /// Fresh copy of the background.
    pub fn blank(&self) -> RgbImage {
        self.background.clone()
    }
}

fn draw_markings(image: &mut RgbImage) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let sx = w / PITCH_LENGTH_M;
    let sy = h / PITCH_WIDTH_M;
    let mid_y = h / 2.0;

    // Touchlines and goal lines
    if let Some(outline) = rect(0.0, 0.0, w, h) {
        draw_hollow_rect_mut(image, outline, MARKING);
    }

    // Halfway line, centre circle and spot
    draw_line_segment_mut(image, (w / 2.0, 0.0), (w / 2.0, h - 1.0), MARKING);
    let centre = ((w / 2.0) as i32, mid_y as i32);
    draw_hollow_circle_mut(image, centre, (CENTRE_CIRCLE_M * sx) as i32, MARKING);
    draw_filled_circle_mut(image, centre, 2, MARKING);

    // Penalty and goal areas at both ends
    for (depth, width) in [(PENALTY_DEPTH_M, PENALTY_WIDTH_M), (GOAL_AREA_DEPTH_M, GOAL_AREA_WIDTH_M)] {
        let box_w = depth * sx;
        let box_h = width * sy;
        let top = mid_y - box_h / 2.0;
        if let Some(left) = rect(0.0, top, box_w, box_h) {
            draw_hollow_rect_mut(image, left, MARKING);
        }
        if let Some(right) = rect(w - box_w, top, box_w, box_h) {
            draw_hollow_rect_mut(image, right, MARKING);
        }
    }
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> Option<Rect> {
    let (w, h) = (w.round() as u32, h.round() as u32);
    (w > 0 && h > 0).then(|| Rect::at(x.round() as i32, y.round() as i32).of_size(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_has_requested_size_and_markings() {
        let canvas = PitchCanvas::new(1050, 680);
        assert_eq!((canvas.width(), canvas.height()), (1050, 680));

        let image = canvas.blank();
        assert_eq!(*image.get_pixel(0, 300), MARKING);
        assert_eq!(*image.get_pixel(525, 100), MARKING);
        assert_ne!(*image.get_pixel(300, 100), MARKING);
    }

    #[test]
    fn test_tiny_canvas_does_not_panic() {
        let canvas = PitchCanvas::new(3, 2);
        assert_eq!(canvas.blank().dimensions(), (3, 2));
    }
}
