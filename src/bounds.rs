//! Wave-aligned simulation rectangle. Everything downstream of the bounds
//! solver works in the (proj, perp) frame: proj grows along the wave
//! direction, perp along its left-hand perpendicular.

use crate::config::{Params, MIN_MARGIN};
use crate::terrain::TerrainData;

/// Half-extent of the fallback square when the terrain has no contours.
const FALLBACK_HALF_EXTENT: f32 = 500.0;

/// Wave-aligned bounding rectangle for one build.
#[derive(Clone, Copy, Debug)]
pub struct WaveFrame {
    pub dir_x: f32,
    pub dir_y: f32,
    pub min_proj: f32,
    pub max_proj: f32,
    pub min_perp: f32,
    pub max_perp: f32,
}

impl WaveFrame {
    /// World point -> (proj, perp).
    #[inline]
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.dir_x + y * self.dir_y,
            -x * self.dir_y + y * self.dir_x,
        )
    }

    /// (proj, perp) -> world point.
    #[inline]
    pub fn unproject(&self, proj: f32, perp: f32) -> (f32, f32) {
        (
            proj * self.dir_x - perp * self.dir_y,
            proj * self.dir_y + perp * self.dir_x,
        )
    }

    /// Whether a world point lies inside the rectangle.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (proj, perp) = self.project(x, y);
        proj >= self.min_proj
            && proj <= self.max_proj
            && perp >= self.min_perp
            && perp <= self.max_perp
    }

    /// Distance the march has to cover along the wave direction.
    #[inline]
    pub fn march_length(&self) -> f32 {
        self.max_proj - self.min_proj
    }

    /// World-space corners of the coverage quad, CCW in wave-aligned space
    /// starting at (min_proj, min_perp).
    pub fn corners(&self) -> [[f32; 2]; 4] {
        let c0 = self.unproject(self.min_proj, self.min_perp);
        let c1 = self.unproject(self.max_proj, self.min_perp);
        let c2 = self.unproject(self.max_proj, self.max_perp);
        let c3 = self.unproject(self.min_proj, self.max_perp);
        [
            [c0.0, c0.1],
            [c1.0, c1.1],
            [c2.0, c2.1],
            [c3.0, c3.1],
        ]
    }
}

/// Derive the simulation rectangle: project every root contour's AABB
/// corner onto the wave axes, then pad with asymmetric margins. Downwave
/// gets the largest margin because refraction and shadow tails keep
/// developing long after the terrain ends.
pub fn solve(terrain: &TerrainData, wavelength: f32, direction: f32, params: &Params) -> WaveFrame {
    let dir_x = direction.cos();
    let dir_y = direction.sin();

    let mut min_proj = f32::INFINITY;
    let mut max_proj = f32::NEG_INFINITY;
    let mut min_perp = f32::INFINITY;
    let mut max_perp = f32::NEG_INFINITY;

    let mut frame = WaveFrame {
        dir_x,
        dir_y,
        min_proj: 0.0,
        max_proj: 0.0,
        min_perp: 0.0,
        max_perp: 0.0,
    };

    let mut any = false;
    for root in terrain.roots() {
        any = true;
        let corners = [
            (root.bbox_min_x, root.bbox_min_y),
            (root.bbox_max_x, root.bbox_min_y),
            (root.bbox_max_x, root.bbox_max_y),
            (root.bbox_min_x, root.bbox_max_y),
        ];
        for (x, y) in corners {
            let (proj, perp) = frame.project(x, y);
            min_proj = min_proj.min(proj);
            max_proj = max_proj.max(proj);
            min_perp = min_perp.min(perp);
            max_perp = max_perp.max(perp);
        }
    }

    if !any {
        min_proj = -FALLBACK_HALF_EXTENT;
        max_proj = FALLBACK_HALF_EXTENT;
        min_perp = -FALLBACK_HALF_EXTENT;
        max_perp = FALLBACK_HALF_EXTENT;
    }

    frame.min_proj = min_proj - MIN_MARGIN.max(params.upwave_margin * wavelength);
    frame.max_proj = max_proj + MIN_MARGIN.max(params.downwave_margin * wavelength);
    frame.min_perp = min_perp - MIN_MARGIN.max(params.crosswave_margin * wavelength);
    frame.max_perp = max_perp + MIN_MARGIN.max(params.crosswave_margin * wavelength);
    frame
}
