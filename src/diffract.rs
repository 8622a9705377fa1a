//! Amplitude assignment and lateral diffusion (diffraction).
//!
//! Amplitude is assigned per ray from surviving energy, the shoaling
//! coefficient, and ray divergence. Diffusion then smears amplitude along
//! the front — the explicit 1-D stencil of the parabolic wave
//! approximation — letting energy bleed into shadows. It runs strictly
//! after amplitude assignment so terrain-absorbed energy never leaks
//! sideways into obstacles during the march.

use crate::config::MAX_AMPLIFICATION;
use crate::physics::shoaling;
use crate::wavefront::WavefrontStep;
use crate::BuildContext;

/// Assign each ray's amplitude: energy * shoaling * divergence, where the
/// divergence factor compares actual lateral spacing to what the ray's
/// t-span would occupy on the undisturbed initial front.
pub(crate) fn assign_amplitude(ctx: &BuildContext, step: &mut WavefrontStep) {
    for si in 0..step.segments.len() {
        let seg = step.segments[si];
        for i in seg.range() {
            let divergence = if seg.len == 1 {
                1.0
            } else {
                let (dt_local, spacing) = if i == seg.start {
                    (step.t[i + 1] - step.t[i], step.distance(i, i + 1))
                } else if i == seg.last() {
                    (step.t[i] - step.t[i - 1], step.distance(i - 1, i))
                } else {
                    (
                        0.5 * (step.t[i + 1] - step.t[i - 1]),
                        0.5 * (step.distance(i - 1, i) + step.distance(i, i + 1)),
                    )
                };
                let expected = dt_local * ctx.params.vertex_spacing / ctx.initial_dt;
                if spacing > 1e-6 {
                    (expected / spacing).sqrt().min(MAX_AMPLIFICATION)
                } else {
                    MAX_AMPLIFICATION
                }
            };
            step.amplitude[i] =
                step.energy[i] * shoaling(ctx.k, step.depth[i]) * divergence;
        }
    }
}

/// Run the lateral diffusion iterations over every segment of a step.
///
/// Boundary conditions: a segment end sitting at the lateral domain edge
/// (within half an initial t-spacing of t = 0 or 1) sees an open-ocean
/// ghost of 1.0; any other segment end is a shadow edge and sees 0.
pub(crate) fn diffuse(ctx: &BuildContext, step: &mut WavefrontStep, scratch: &mut Vec<f32>) {
    let spacing = ctx.params.vertex_spacing;
    let coeff = (ctx.params.step_size / (2.0 * ctx.k * spacing * spacing)).min(0.5);
    let edge_band = 0.5 * ctx.initial_dt;

    for _ in 0..ctx.params.diffraction_iterations {
        for si in 0..step.segments.len() {
            let seg = step.segments[si];
            let left_ghost = if step.t[seg.start] <= edge_band { 1.0 } else { 0.0 };
            let right_ghost = if step.t[seg.last()] >= 1.0 - edge_band {
                1.0
            } else {
                0.0
            };

            scratch.clear();
            scratch.extend_from_slice(&step.amplitude[seg.range()]);
            for off in 0..seg.len {
                let center = scratch[off];
                let left = if off == 0 { left_ghost } else { scratch[off - 1] };
                let right = if off == seg.len - 1 {
                    right_ghost
                } else {
                    scratch[off + 1]
                };
                step.amplitude[seg.start + off] =
                    (center + coeff * (left - 2.0 * center + right)).max(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;
    use crate::diag::NullSink;
    use crate::scenarios;
    use crate::wavefront::{Ray, Segment};
    use crate::WaveSource;

    fn test_ctx<'a>(
        terrain: &'a crate::terrain::TerrainData,
        params: &'a Params,
        wavelength: f32,
    ) -> BuildContext<'a> {
        static SINK: NullSink = NullSink;
        let source = WaveSource {
            amplitude: 1.0,
            wavelength,
            direction: 0.0,
            phase_offset: 0.0,
        };
        BuildContext::new(&source, terrain, 0.0, params, &SINK)
    }

    /// Evenly spaced open-ocean front with the given t range and amplitudes.
    fn front(ts: &[f32], amps: &[f32], spacing: f32) -> WavefrontStep {
        let mut step = WavefrontStep::with_capacity(ts.len(), 1);
        for (i, (&t, &a)) in ts.iter().zip(amps).enumerate() {
            step.push(Ray {
                x: 0.0,
                y: i as f32 * spacing,
                dir_x: 1.0,
                dir_y: 0.0,
                t,
                energy: 1.0,
                breaking: 0.0,
                depth: 1000.0,
                amplitude: a,
            });
        }
        step.segments.push(Segment {
            start: 0,
            len: ts.len(),
        });
        step
    }

    #[test]
    fn uniform_open_ocean_front_is_a_fixed_point() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params, 200.0);
        let n: usize = 11;
        let ts: Vec<f32> = (0..n).map(|i| i as f32 / (n - 1) as f32).collect();
        // Spacing consistent with the t coverage: divergence comes out 1.
        let spacing = params.vertex_spacing * (ts[1] - ts[0]) / ctx.initial_dt;
        let mut step = front(&ts, &vec![0.0; n], spacing);
        assign_amplitude(&ctx, &mut step);
        for i in 0..step.len() {
            assert!((step.amplitude[i] - 1.0).abs() < 1e-4, "assigned {}", step.amplitude[i]);
        }
        let mut scratch = Vec::new();
        diffuse(&ctx, &mut step, &mut scratch);
        // Ghosts are 1.0 at the domain edges and every value is 1.0, so the
        // stencil changes nothing.
        for i in 0..step.len() {
            assert!((step.amplitude[i] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn amplitude_stays_non_negative() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params, 30.0);
        let ts: Vec<f32> = (0..9).map(|i| 0.3 + i as f32 * 0.01).collect();
        let amps = [0.0, 1.0, 0.0, 2.0, 0.0, 1.5, 0.0, 0.5, 0.0];
        let mut step = front(&ts, &amps, 20.0);
        let mut scratch = Vec::new();
        diffuse(&ctx, &mut step, &mut scratch);
        for i in 0..step.len() {
            assert!(step.amplitude[i] >= 0.0);
        }
    }

    #[test]
    fn shadow_edges_bleed_amplitude_outward() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params, 100.0);
        // Interior segment (away from the domain edge): shadow ghosts.
        let ts: Vec<f32> = (0..15).map(|i| 0.3 + i as f32 * 0.01).collect();
        let mut step = front(&ts, &vec![1.0; 15], 20.0);
        let mut scratch = Vec::new();
        diffuse(&ctx, &mut step, &mut scratch);
        // Ends fade toward the shadow, center barely moves, and the decay
        // away from the edge is monotone.
        assert!(step.amplitude[0] < 1.0);
        assert!(step.amplitude[14] < 1.0);
        assert!(step.amplitude[7] > 0.9);
        for i in 0..7 {
            assert!(step.amplitude[i] <= step.amplitude[i + 1] + 1e-6);
        }
    }

    #[test]
    fn convergence_amplifies_but_clamps() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let ctx = test_ctx(&terrain, &params, 200.0);
        let ts: Vec<f32> = (0..5).map(|i| 0.4 + i as f32 * ctx.initial_dt).collect();
        // Rays squeezed to a tenth of their expected spacing.
        let mut step = front(&ts, &[0.0; 5], params.vertex_spacing * 0.1);
        assign_amplitude(&ctx, &mut step);
        for i in 0..step.len() {
            assert!((step.amplitude[i] - MAX_AMPLIFICATION).abs() < 1e-4);
        }
    }

    #[test]
    fn diffusion_coefficient_is_clamped_for_short_waves() {
        // stepSize/(2 k spacing^2) with a tiny wavelength exceeds 0.5; the
        // stencil must stay stable. A spike must not overshoot below zero
        // or above its neighbours' max.
        let terrain = scenarios::open_ocean();
        let params = Params {
            vertex_spacing: 1.0,
            ..Params::default()
        };
        let ctx = test_ctx(&terrain, &params, 2.0);
        let ts: Vec<f32> = (0..7).map(|i| 0.4 + i as f32 * 0.001).collect();
        let amps = [0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0];
        let mut step = front(&ts, &amps, 1.0);
        let mut scratch = Vec::new();
        diffuse(&ctx, &mut step, &mut scratch);
        for i in 0..step.len() {
            assert!(step.amplitude[i] >= 0.0);
            assert!(step.amplitude[i] <= 4.0);
        }
    }
}
