//! Trajectory polylines on the abstract pitch.

use image::RgbImage;
use imageproc::drawing::draw_line_segment_mut;

use pitch_models::{Position, ViewKind};

use super::{fill_disc, marker_color, PitchCanvas, RenderContext, ViewRenderer};
use crate::tracking::Track;

/// One straight piece of a trajectory between consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Position,
    pub to: Position,
}

/// Segments joining a track's observations up to and including `upto`.
///
/// `n` observations give `n - 1` segments.
pub fn trajectory_segments(track: &Track, upto: u64) -> Vec<Segment> {
    track
        .observations_upto(upto)
        .windows(2)
        .map(|pair| Segment {
            from: pair[0].position,
            to: pair[1].position,
        })
        .collect()
}

pub struct LineRenderer {
    canvas: PitchCanvas,
    thickness: u32,
}

impl LineRenderer {
    pub fn new(canvas: PitchCanvas, thickness: u32) -> Self {
        Self {
            canvas,
            thickness: thickness.max(1),
        }
    }

    fn draw_thick(&self, image: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: image::Rgb<u8>) {
        let spread = self.thickness as i32 / 2;
        // Offset across the dominant axis
        let horizontal = (to.0 - from.0).abs() >= (to.1 - from.1).abs();
        for offset in -spread..=spread - ((self.thickness as i32 + 1) % 2) {
            let d = offset as f32;
            let (a, b) = if horizontal {
                ((from.0, from.1 + d), (to.0, to.1 + d))
            } else {
                ((from.0 + d, from.1), (to.0 + d, to.1))
            };
            draw_line_segment_mut(image, a, b, color);
        }
    }
}

impl ViewRenderer for LineRenderer {
    fn view(&self) -> ViewKind {
        ViewKind::Line
    }

    fn render(&self, ctx: &RenderContext<'_>) -> RgbImage {
        let mut image = self.canvas.blank();
        let frame_index = ctx.frame_index();

        for track in ctx.tracks.iter() {
            let color = marker_color(track.id(), track.class_id());
            for segment in trajectory_segments(track, frame_index) {
                let from = ctx.projection.project(segment.from);
                let to = ctx.projection.project(segment.to);
                self.draw_thick(&mut image, from, to, color);
            }
        }

        // Current heads
        for (track, observation) in ctx.tracks.active_at(frame_index) {
            let center = ctx.projection.project(observation.position);
            fill_disc(&mut image, center, self.thickness as i32 + 2, marker_color(track.id(), track.class_id()));
        }

        image
    }
}
