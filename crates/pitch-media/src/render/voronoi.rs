//! Nearest-object cell diagram on the abstract pitch.
//!
//! The partition is computed per pixel: every canvas pixel belongs to the
//! site with the smallest squared Euclidean distance, ties going to the
//! lowest track id. Rows are assigned in parallel.

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use pitch_models::ViewKind;

use super::{fill_disc, track_color, PitchCanvas, RenderContext, ViewRenderer, BALL_COLOR, OUTLINE_COLOR};
use crate::detection::CLASS_SPORTS_BALL;

const BOUNDARY_COLOR: Rgb<u8> = Rgb([15, 15, 15]);
const NO_OWNER: u32 = u32::MAX;

/// One generator point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoronoiSite {
    pub track_id: u32,
    pub x: f32,
    pub y: f32,
}

/// Pixel-exact Voronoi partition of a canvas.
#[derive(Debug, Clone)]
pub struct VoronoiPartition {
    width: u32,
    height: u32,
    /// Sorted by track id
    sites: Vec<VoronoiSite>,
    /// Index into `sites` per pixel, row-major
    owners: Vec<u32>,
}

impl VoronoiPartition {
    pub fn compute(width: u32, height: u32, mut sites: Vec<VoronoiSite>) -> Self {
        sites.sort_by_key(|s| s.track_id);
        sites.dedup_by_key(|s| s.track_id);

        let mut owners = vec![NO_OWNER; width as usize * height as usize];
        if !sites.is_empty() && width > 0 {
            owners
                .par_chunks_mut(width as usize)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, owner) in row.iter_mut().enumerate() {
                        *owner = nearest(&sites, x as f64, y as f64);
                    }
                });
        }

        Self {
            width,
            height,
            sites,
            owners,
        }
    }

    pub fn sites(&self) -> &[VoronoiSite] {
        &self.sites
    }

    /// Site owning pixel (x, y).
    pub fn owner(&self, x: u32, y: u32) -> Option<&VoronoiSite> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = self.owners[(y * self.width + x) as usize];
        self.sites.get(index as usize)
    }

    fn owner_index(&self, x: u32, y: u32) -> u32 {
        self.owners[(y * self.width + x) as usize]
    }

    /// Pixel whose right or bottom neighbour lies in a different cell.
    pub fn is_boundary(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let here = self.owner_index(x, y);
        (x + 1 < self.width && self.owner_index(x + 1, y) != here)
            || (y + 1 < self.height && self.owner_index(x, y + 1) != here)
    }
}

/// Index of the closest site; strict `<` keeps the lowest track id on ties.
fn nearest(sites: &[VoronoiSite], x: f64, y: f64) -> u32 {
    let mut best = 0u32;
    let mut best_distance = f64::INFINITY;
    for (i, site) in sites.iter().enumerate() {
        let dx = x - site.x as f64;
        let dy = y - site.y as f64;
        let distance = dx * dx + dy * dy;
        if distance < best_distance {
            best_distance = distance;
            best = i as u32;
        }
    }
    best
}

fn tint(color: Rgb<u8>, base: Rgb<u8>) -> Rgb<u8> {
    Rgb([
        ((color[0] as u16 + base[0] as u16) / 2) as u8,
        ((color[1] as u16 + base[1] as u16) / 2) as u8,
        ((color[2] as u16 + base[2] as u16) / 2) as u8,
    ])
}

pub struct VoronoiRenderer {
    canvas: PitchCanvas,
    site_radius: i32,
}

impl VoronoiRenderer {
    pub fn new(canvas: PitchCanvas, site_radius: i32) -> Self {
        Self {
            canvas,
            site_radius: site_radius.max(2),
        }
    }
}

impl ViewRenderer for VoronoiRenderer {
    fn view(&self) -> ViewKind {
        ViewKind::Voronoi
    }

    fn render(&self, ctx: &RenderContext<'_>) -> RgbImage {
        let mut image = self.canvas.blank();

        // One cell per object observed in this frame, ball included
        let mut ball_ids = Vec::new();
        let sites: Vec<VoronoiSite> = ctx
            .tracks
            .active_at(ctx.frame_index())
            .map(|(track, observation)| {
                if track.class_id() == CLASS_SPORTS_BALL {
                    ball_ids.push(track.id());
                }
                let (x, y) = ctx.projection.project(observation.position);
                VoronoiSite {
                    track_id: track.id(),
                    x,
                    y,
                }
            })
            .collect();

        if sites.is_empty() {
            return image;
        }

        let partition = VoronoiPartition::compute(image.width(), image.height(), sites);

        for (x, y, pixel) in image.enumerate_pixels_mut() {
            if partition.is_boundary(x, y) {
                *pixel = BOUNDARY_COLOR;
            } else if let Some(site) = partition.owner(x, y) {
                *pixel = tint(track_color(site.track_id), *pixel);
            }
        }

        for site in partition.sites() {
            let color = if ball_ids.contains(&site.track_id) {
                BALL_COLOR
            } else {
                track_color(site.track_id)
            };
            fill_disc(&mut image, (site.x, site.y), self.site_radius + 1, OUTLINE_COLOR);
            fill_disc(&mut image, (site.x, site.y), self.site_radius, color);
        }

        image
    }
}
