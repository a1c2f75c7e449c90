//! Annotated original frames.

use image::RgbImage;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use pitch_models::ViewKind;

use super::font::{draw_label, text_size};
use super::{marker_color, RenderContext, ViewRenderer, OUTLINE_COLOR};

/// Draws each tracked detection's box and `#id` label on the frame.
pub struct MainRenderer {
    thickness: u32,
    label_scale: u32,
}

impl MainRenderer {
    pub fn new(thickness: u32, label_scale: u32) -> Self {
        Self {
            thickness: thickness.max(1),
            label_scale: label_scale.max(1),
        }
    }
}

impl ViewRenderer for MainRenderer {
    fn view(&self) -> ViewKind {
        ViewKind::Main
    }

    fn render(&self, ctx: &RenderContext<'_>) -> RgbImage {
        let mut image = ctx.frame.image().clone();

        for tracked in ctx.tracked {
            let bbox = &tracked.detection.bbox;
            let color = marker_color(tracked.track_id, tracked.detection.class_id);
            let x = bbox.x.round() as i32;
            let y = bbox.y.round() as i32;
            let w = bbox.width.round().max(1.0) as u32;
            let h = bbox.height.round().max(1.0) as u32;

            // Thickness grows inwards
            for inset in 0..self.thickness {
                if w <= 2 * inset || h <= 2 * inset {
                    break;
                }
                let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w - 2 * inset, h - 2 * inset);
                draw_hollow_rect_mut(&mut image, rect, color);
            }

            let label = format!("#{}", tracked.track_id);
            let (_, label_h) = text_size(&label, self.label_scale);
            let label_box = (label_h + 2 * self.label_scale) as i32;
            // Above the box, or inside it at the top edge of the frame
            let label_y = if y - label_box >= 0 { y - label_box } else { y };
            draw_label(&mut image, &label, x, label_y, self.label_scale, OUTLINE_COLOR, color);
        }

        image
    }
}
