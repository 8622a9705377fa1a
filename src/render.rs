//! Diagnostic rasterization of built wave meshes. Debug layers only — the
//! real water surface is rendered elsewhere; these exist so a build can be
//! eyeballed as PNGs from the demo binary and the preview server.

use rayon::prelude::*;

use crate::mesh::{MeshData, VERTEX_FLOATS};
use crate::terrain::TerrainData;

// Water palette (shared tones with the depth layer)
const SHADOW_DARK: [u8; 4] = [10, 18, 34, 255];
const SWELL_LOW: [u8; 4] = [24, 48, 92, 255];
const SWELL_MID: [u8; 4] = [60, 110, 170, 255];
const SWELL_HIGH: [u8; 4] = [150, 200, 235, 255];
const SWELL_PEAK: [u8; 4] = [245, 250, 255, 255];
const FOAM: [u8; 4] = [255, 255, 255, 255];
const UNCOVERED: [u8; 4] = [8, 10, 14, 255];

const DEPTH_DEEP: [u8; 4] = [18, 36, 70, 255];
const DEPTH_SHALLOW: [u8; 4] = [52, 100, 145, 255];
const LAND_LOW: [u8; 4] = [120, 150, 90, 255];
const LAND_HIGH: [u8; 4] = [200, 190, 150, 255];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// One mesh attribute interpolated over the coverage quad: a value per
/// pixel plus the coverage mask. Pixels outside every triangle (shadow
/// gaps, the quad margin) stay uncovered and colormap to the void color.
struct AttributeRaster {
    values: Vec<f32>,
    covered: Vec<bool>,
    w: usize,
    h: usize,
}

impl AttributeRaster {
    fn new(w: usize, h: usize) -> Self {
        Self {
            values: vec![0.0; w * h],
            covered: vec![false; w * h],
            w,
            h,
        }
    }

    #[inline]
    fn splat(&mut self, x: usize, y: usize, value: f32) {
        debug_assert!(x < self.w && y < self.h);
        let i = y * self.w + x;
        self.values[i] = value;
        self.covered[i] = true;
    }

    /// Interpolated value at a flat pixel index; None outside the mesh.
    #[inline]
    fn sample(&self, i: usize) -> Option<f32> {
        self.covered[i].then_some(self.values[i])
    }
}

/// Axis-aligned world rectangle covering the mesh quad.
fn quad_aabb(mesh: &MeshData) -> (f32, f32, f32, f32) {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for c in &mesh.quad {
        min_x = min_x.min(c[0]);
        min_y = min_y.min(c[1]);
        max_x = max_x.max(c[0]);
        max_y = max_y.max(c[1]);
    }
    (min_x, min_y, max_x.max(min_x + 1.0), max_y.max(min_y + 1.0))
}

#[inline]
fn cross(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

/// Rasterize one vertex attribute over the coverage quad by barycentric
/// triangle fill.
fn rasterize_attribute(mesh: &MeshData, attr: usize, w: usize, h: usize) -> AttributeRaster {
    let mut raster = AttributeRaster::new(w, h);
    let (min_x, min_y, max_x, max_y) = quad_aabb(mesh);
    let scale_x = w as f32 / (max_x - min_x);
    let scale_y = h as f32 / (max_y - min_y);

    let to_px = |x: f32| (x - min_x) * scale_x;
    let to_py = |y: f32| (y - min_y) * scale_y;

    for tri in mesh.indices.chunks(3) {
        let v = |i: usize| {
            let base = tri[i] as usize * VERTEX_FLOATS;
            (
                to_px(mesh.vertices[base]),
                to_py(mesh.vertices[base + 1]),
                mesh.vertices[base + attr],
            )
        };
        let (ax, ay, av) = v(0);
        let (bx, by, bv) = v(1);
        let (cx, cy, cv) = v(2);

        let area = cross(ax, ay, bx, by, cx, cy);
        if area.abs() < 1e-6 {
            continue;
        }

        let px_lo = ax.min(bx).min(cx).floor().max(0.0) as usize;
        let px_hi = (ax.max(bx).max(cx).ceil() as usize).min(w.saturating_sub(1));
        let py_lo = ay.min(by).min(cy).floor().max(0.0) as usize;
        let py_hi = (ay.max(by).max(cy).ceil() as usize).min(h.saturating_sub(1));

        for py in py_lo..=py_hi {
            for px in px_lo..=px_hi {
                let sx = px as f32 + 0.5;
                let sy = py as f32 + 0.5;
                let w0 = cross(bx, by, cx, cy, sx, sy) / area;
                let w1 = cross(cx, cy, ax, ay, sx, sy) / area;
                let w2 = cross(ax, ay, bx, by, sx, sy) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                raster.splat(px, py, w0 * av + w1 * bv + w2 * cv);
            }
        }
    }

    raster
}

/// Amplitude layer: dark in shadows, white at the amplification clamp.
pub fn render_amplitude(mesh: &MeshData, w: usize, h: usize) -> Vec<u8> {
    let raster = rasterize_attribute(mesh, 2, w, h);
    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let color = match raster.sample(y * w + x) {
                None => UNCOVERED,
                Some(a) => {
                    if a < 0.5 {
                        lerp_color(SHADOW_DARK, SWELL_LOW, a / 0.5)
                    } else if a < 1.0 {
                        lerp_color(SWELL_LOW, SWELL_MID, (a - 0.5) / 0.5)
                    } else if a < 1.5 {
                        lerp_color(SWELL_MID, SWELL_HIGH, (a - 1.0) / 0.5)
                    } else {
                        lerp_color(SWELL_HIGH, SWELL_PEAK, (a - 1.5) / 0.5)
                    }
                }
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });
    rgba
}

/// Breaking-intensity layer: foam whitens toward intensity 1.
pub fn render_breaking(mesh: &MeshData, w: usize, h: usize) -> Vec<u8> {
    let raster = rasterize_attribute(mesh, 3, w, h);
    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let color = match raster.sample(y * w + x) {
                None => UNCOVERED,
                Some(b) => lerp_color(SWELL_LOW, FOAM, b),
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });
    rgba
}

/// Blend-weight layer: grayscale, shows where the mesh fades out.
pub fn render_blend(mesh: &MeshData, w: usize, h: usize) -> Vec<u8> {
    let raster = rasterize_attribute(mesh, 5, w, h);
    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let color = match raster.sample(y * w + x) {
                None => UNCOVERED,
                Some(b) => {
                    let v = (b.clamp(0.0, 1.0) * 255.0) as u8;
                    [v, v, v, 255]
                }
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });
    rgba
}

/// Terrain layer over the same coverage rectangle, sampled straight from
/// the contour-tree query.
pub fn render_depth(terrain: &TerrainData, mesh: &MeshData, w: usize, h: usize) -> Vec<u8> {
    let (min_x, min_y, max_x, max_y) = quad_aabb(mesh);
    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        let wy = min_y + (y as f32 + 0.5) / h as f32 * (max_y - min_y);
        for x in 0..w {
            let wx = min_x + (x as f32 + 0.5) / w as f32 * (max_x - min_x);
            let elev = terrain.height(wx, wy);
            let color = if elev < 0.0 {
                let depth = (-elev).min(60.0) / 60.0;
                lerp_color(DEPTH_SHALLOW, DEPTH_DEEP, depth)
            } else {
                lerp_color(LAND_LOW, LAND_HIGH, (elev / 30.0).min(1.0))
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });
    rgba
}
