//! The four rendered views.
//!
//! Renderers are pure functions of a [`RenderContext`]: they read the
//! current frame, its tracked detections and the track table, and return
//! a new image. The orchestrator runs all of them in parallel on the rayon
//! pool and joins before the next frame.

mod circle;
pub mod font;
mod line;
mod main_view;
mod pitch;
mod voronoi;

pub use circle::CircleRenderer;
pub use line::{trajectory_segments, LineRenderer, Segment};
pub use main_view::MainRenderer;
pub use pitch::PitchCanvas;
pub use voronoi::{VoronoiPartition, VoronoiRenderer, VoronoiSite};

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use pitch_models::{Position, ViewKind};

use crate::config::PitchConfig;
use crate::detection::{TrackedDetection, CLASS_SPORTS_BALL};
use crate::frame::Frame;
use crate::tracking::TrackTable;

/// Everything a renderer may read for one frame.
pub struct RenderContext<'a> {
    pub frame: &'a Frame,
    /// Detections associated in this frame
    pub tracked: &'a [TrackedDetection],
    /// Table state after this frame's update
    pub tracks: &'a TrackTable,
    pub projection: &'a PitchProjection,
}

impl RenderContext<'_> {
    pub fn frame_index(&self) -> u64 {
        self.frame.index()
    }
}

/// Produces one view's image for a frame.
pub trait ViewRenderer: Send + Sync {
    fn view(&self) -> ViewKind;

    fn render(&self, ctx: &RenderContext<'_>) -> RgbImage;
}

/// Linear map from source-frame pixels onto the pitch canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchProjection {
    scale_x: f64,
    scale_y: f64,
    canvas_width: u32,
    canvas_height: u32,
}

impl PitchProjection {
    pub fn new(frame_width: u32, frame_height: u32, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            scale_x: canvas_width as f64 / frame_width.max(1) as f64,
            scale_y: canvas_height as f64 / frame_height.max(1) as f64,
            canvas_width,
            canvas_height,
        }
    }

    /// Canvas coordinates, clamped onto the canvas.
    pub fn project(&self, position: Position) -> (f32, f32) {
        let max_x = self.canvas_width.saturating_sub(1) as f64;
        let max_y = self.canvas_height.saturating_sub(1) as f64;
        let x = (position.x * self.scale_x).clamp(0.0, max_x);
        let y = (position.y * self.scale_y).clamp(0.0, max_y);
        (x as f32, y as f32)
    }
}

const PALETTE: [Rgb<u8>; 12] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([255, 225, 25]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
    Rgb([210, 245, 60]),
    Rgb([250, 190, 212]),
    Rgb([0, 128, 128]),
    Rgb([170, 110, 40]),
];

pub const BALL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([20, 20, 20]);

/// Stable colour for a track id.
pub fn track_color(track_id: u32) -> Rgb<u8> {
    PALETTE[(track_id.saturating_sub(1) as usize) % PALETTE.len()]
}

/// Marker colour: the ball is always white.
pub fn marker_color(track_id: u32, class_id: usize) -> Rgb<u8> {
    if class_id == CLASS_SPORTS_BALL {
        BALL_COLOR
    } else {
        track_color(track_id)
    }
}

/// The renderers for all four views, in [`ViewKind::ALL`] order.
pub fn standard_renderers(pitch: &PitchConfig) -> Vec<Box<dyn ViewRenderer>> {
    let canvas = PitchCanvas::new(pitch.width, pitch.height);
    vec![
        Box::new(MainRenderer::new(pitch.line_thickness, pitch.label_scale)),
        Box::new(CircleRenderer::new(canvas.clone(), pitch.marker_radius, pitch.ball_radius)),
        Box::new(VoronoiRenderer::new(canvas.clone(), pitch.marker_radius / 2)),
        Box::new(LineRenderer::new(canvas, pitch.line_thickness)),
    ]
}

/// Render every view for one frame in parallel.
///
/// Output order matches `renderers`.
pub fn render_views(renderers: &[&dyn ViewRenderer], ctx: &RenderContext<'_>) -> Vec<(ViewKind, RgbImage)> {
    renderers
        .par_iter()
        .map(|renderer| (renderer.view(), renderer.render(ctx)))
        .collect()
}

/// Filled disc clipped to the image.
pub(crate) fn fill_disc(image: &mut RgbImage, center: (f32, f32), radius: i32, color: Rgb<u8>) {
    let center = (center.0.round() as i32, center.1.round() as i32);
    imageproc::drawing::draw_filled_circle_mut(image, center, radius.max(1), color);
}
