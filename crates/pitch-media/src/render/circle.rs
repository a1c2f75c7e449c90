//! Object markers on the abstract pitch.

use image::RgbImage;
use imageproc::drawing::draw_hollow_circle_mut;

use pitch_models::ViewKind;

use super::{fill_disc, marker_color, PitchCanvas, RenderContext, ViewRenderer, OUTLINE_COLOR};
use crate::detection::CLASS_SPORTS_BALL;

pub struct CircleRenderer {
    canvas: PitchCanvas,
    marker_radius: i32,
    ball_radius: i32,
}

impl CircleRenderer {
    pub fn new(canvas: PitchCanvas, marker_radius: i32, ball_radius: i32) -> Self {
        Self {
            canvas,
            marker_radius: marker_radius.max(1),
            ball_radius: ball_radius.max(1),
        }
    }
}

impl ViewRenderer for CircleRenderer {
    fn view(&self) -> ViewKind {
        ViewKind::Circle
    }

    fn render(&self, ctx: &RenderContext<'_>) -> RgbImage {
        let mut image = self.canvas.blank();

        // Players first so the ball stays on top
        let (balls, players): (Vec<_>, Vec<_>) = ctx
            .tracked
            .iter()
            .partition(|t| t.detection.class_id == CLASS_SPORTS_BALL);

        for tracked in players.into_iter().chain(balls) {
            let class_id = tracked.detection.class_id;
            let center = ctx.projection.project(tracked.detection.position());
            let radius = if class_id == CLASS_SPORTS_BALL {
                self.ball_radius
            } else {
                self.marker_radius
            };

            fill_disc(&mut image, center, radius, marker_color(tracked.track_id, class_id));
            draw_hollow_circle_mut(
                &mut image,
                (center.0.round() as i32, center.1.round() as i32),
                radius,
                OUTLINE_COLOR,
            );
        }

        image
    }
}
