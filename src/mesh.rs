//! Packed output mesh: six floats per vertex
//! `(x, y, amplitude, breakingIntensity, phaseOffset, blendWeight)` plus a
//! u32 triangle list and the world-space coverage quad. Buffers are
//! allocated once at the exact final size computed by a topology pre-pass,
//! then handed to the caller by move.

use crate::triangulate;
use crate::wavefront::WavefrontStep;
use crate::BuildContext;

/// Floats per packed vertex.
pub const VERTEX_FLOATS: usize = 6;

/// The CPU mesh a build hands back. The caller becomes sole owner.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub vertex_count: usize,
    pub index_count: usize,
    /// Wave-aligned coverage quad, CCW from (min_proj, min_perp).
    pub quad: [[f32; 2]; 4],
}

/// Phase carried by a vertex: steps of accumulated phase minus the planar
/// carrier at the vertex position, so the sampler reconstructs the local
/// deviation from a plane wave. Original step indices keep decimated rows
/// interpolating on the same axis.
#[inline]
pub(crate) fn phase_offset(ctx: &BuildContext, original_index: u32, x: f32, y: f32) -> f32 {
    original_index as f32 * ctx.phase_per_step
        - ctx.k * (x * ctx.frame.dir_x + y * ctx.frame.dir_y)
        + ctx.source_phase
}

/// Exact output size: every surviving ray becomes a vertex; triangle count
/// follows from the same overlap windows the triangulator sweeps.
pub(crate) fn count_topology(steps: &[WavefrontStep]) -> (usize, usize) {
    let vertices = steps.iter().map(|s| s.len()).sum();
    let mut triangles = 0;
    for pair in steps.windows(2) {
        for w in triangulate::overlap_windows(&pair[0], &pair[1]) {
            triangles += (w.prev.hi - w.prev.lo) + (w.next.hi - w.next.lo);
        }
    }
    (vertices, triangles)
}

/// Emit the packed mesh from the decimated wavefronts.
pub(crate) fn emit(ctx: &BuildContext, steps: &[WavefrontStep]) -> MeshData {
    let (vertex_count, triangle_count) = count_topology(steps);
    let mut vertices = Vec::with_capacity(vertex_count * VERTEX_FLOATS);

    // Each (step, segment) gets a contiguous vertex range; the triangulator
    // addresses rays as base + offset within the segment.
    let mut bases: Vec<Vec<u32>> = Vec::with_capacity(steps.len());
    let last_step = steps.len() - 1;
    for (si, step) in steps.iter().enumerate() {
        let boundary_row = si == 0 || si == last_step;
        let mut step_bases = Vec::with_capacity(step.segments.len());
        for seg in &step.segments {
            step_bases.push((vertices.len() / VERTEX_FLOATS) as u32);
            for i in seg.range() {
                let blend = if boundary_row || i == seg.start || i == seg.last() {
                    0.0
                } else {
                    1.0
                };
                vertices.push(step.x[i]);
                vertices.push(step.y[i]);
                vertices.push(step.amplitude[i] * ctx.source_amplitude);
                vertices.push(step.breaking[i]);
                vertices.push(phase_offset(ctx, step.original_index, step.x[i], step.y[i]));
                vertices.push(blend);
            }
        }
        bases.push(step_bases);
    }

    let mut indices = Vec::with_capacity(triangle_count * 3);
    for si in 0..last_step {
        triangulate::triangulate_rows(
            &steps[si],
            &steps[si + 1],
            &bases[si],
            &bases[si + 1],
            &mut indices,
        );
    }
    debug_assert_eq!(indices.len(), triangle_count * 3);

    let vertex_count = vertices.len() / VERTEX_FLOATS;
    let index_count = indices.len();
    MeshData {
        vertices,
        indices,
        vertex_count,
        index_count,
        quad: ctx.frame.corners(),
    }
}

impl MeshData {
    /// Attribute slice of one vertex.
    #[inline]
    pub fn vertex(&self, i: usize) -> &[f32] {
        &self.vertices[i * VERTEX_FLOATS..(i + 1) * VERTEX_FLOATS]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;
    use crate::diag::NullSink;
    use crate::scenarios;
    use crate::wavefront::Ray;
    use crate::WaveSource;

    fn test_ctx<'a>(
        terrain: &'a crate::terrain::TerrainData,
        params: &'a Params,
    ) -> BuildContext<'a> {
        static SINK: NullSink = NullSink;
        let source = WaveSource {
            amplitude: 1.0,
            wavelength: 100.0,
            direction: 0.0,
            phase_offset: 0.0,
        };
        BuildContext::new(&source, terrain, 0.0, params, &SINK)
    }

    fn row(original: u32, x: f32, ts: &[f32]) -> WavefrontStep {
        let mut step = WavefrontStep::with_capacity(ts.len(), original);
        for &t in ts {
            step.push(Ray {
                x,
                y: t * 100.0,
                dir_x: 1.0,
                dir_y: 0.0,
                t,
                energy: 1.0,
                breaking: 0.0,
                depth: 50.0,
                amplitude: 1.0,
            });
        }
        step.close_segment(0);
        step
    }

    #[test]
    fn counts_match_emission() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params);
        let ts: Vec<f32> = (0..5).map(|i| i as f32 / 4.0).collect();
        let steps = vec![row(0, 0.0, &ts), row(1, 10.0, &ts), row(2, 20.0, &ts)];
        let (vc, tc) = count_topology(&steps);
        let mesh = emit(&ctx, &steps);
        assert_eq!(mesh.vertex_count, vc);
        assert_eq!(mesh.index_count, tc * 3);
        assert_eq!(mesh.vertices.len(), vc * VERTEX_FLOATS);
        // Two full rows of 5 rays: 4 + 4 = 8 triangles per row pair.
        assert_eq!(tc, 16);
    }

    #[test]
    fn triangles_reference_distinct_valid_vertices() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params);
        let ts: Vec<f32> = (0..7).map(|i| i as f32 / 6.0).collect();
        let steps = vec![row(0, 0.0, &ts), row(1, 10.0, &ts), row(2, 20.0, &ts)];
        let mesh = emit(&ctx, &steps);
        assert_eq!(mesh.index_count % 3, 0);
        for tri in mesh.indices.chunks(3) {
            assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
            for &v in tri {
                assert!((v as usize) < mesh.vertex_count);
            }
        }
    }

    #[test]
    fn blend_weight_fades_at_boundaries() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params);
        let ts: Vec<f32> = (0..5).map(|i| i as f32 / 4.0).collect();
        let steps = vec![
            row(0, 0.0, &ts),
            row(1, 10.0, &ts),
            row(2, 20.0, &ts),
            row(3, 30.0, &ts),
        ];
        let mesh = emit(&ctx, &steps);
        // Rows 0 and 3 are boundary rows: all zero. Rows 1-2: zero only at
        // segment ends.
        for (i, chunk) in mesh.vertices.chunks(VERTEX_FLOATS).enumerate() {
            let step = i / 5;
            let lane = i % 5;
            let expected = if step == 0 || step == 3 || lane == 0 || lane == 4 {
                0.0
            } else {
                1.0
            };
            assert_eq!(chunk[5], expected, "vertex {i}");
        }
    }

    #[test]
    fn phase_matches_march_minus_carrier() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params);
        // A ray that advanced exactly one full step per row has phase 0:
        // the accumulated march phase equals the planar carrier.
        let steps = vec![
            row(0, 0.0, &[0.0, 0.5, 1.0]),
            row(1, params.step_size, &[0.0, 0.5, 1.0]),
        ];
        let mesh = emit(&ctx, &steps);
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            assert!(v[4].abs() < 1e-3, "vertex {i} phase {}", v[4]);
        }
    }

    #[test]
    fn source_amplitude_scales_vertices() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        static SINK: NullSink = NullSink;
        let source = WaveSource {
            amplitude: 2.5,
            wavelength: 100.0,
            direction: 0.0,
            phase_offset: 0.0,
        };
        let ctx = BuildContext::new(&source, &terrain, 0.0, &params, &SINK);
        let ts = [0.0, 0.5, 1.0];
        let steps = vec![row(0, 0.0, &ts), row(1, 10.0, &ts)];
        let mesh = emit(&ctx, &steps);
        for i in 0..mesh.vertex_count {
            assert!((mesh.vertex(i)[2] - 2.5).abs() < 1e-5);
        }
    }
}
