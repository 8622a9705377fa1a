pub mod bounds;
pub mod config;
mod decimate;
pub mod diag;
mod diffract;
pub mod error;
mod march;
pub mod mesh;
pub mod physics;
pub mod pool;
mod refine;
pub mod render;
pub mod scenarios;
pub mod terrain;
mod triangulate;
pub mod wavefront;

use std::time::Instant;

use bounds::WaveFrame;
use config::{Params, MIN_SPEED_FACTOR};
use diag::{DiagnosticEvent, DiagnosticSink, NullSink};
use error::BuildError;
use mesh::MeshData;
use terrain::TerrainData;

/// A planar ocean wave source: the wave arrives from infinitely far upwave.
#[derive(Clone, Copy, Debug)]
pub struct WaveSource {
    pub amplitude: f32,
    /// Wavelength in feet.
    pub wavelength: f32,
    /// Propagation direction in radians.
    pub direction: f32,
    pub phase_offset: f32,
}

/// One profiled pipeline stage.
#[derive(Clone, Debug)]
pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Profiling record returned with every successful build.
#[derive(Clone, Debug)]
pub struct BuildStats {
    pub timings: Vec<Timing>,
    /// Wavefront rows marched (before decimation).
    pub steps: usize,
    pub merges: usize,
    pub splits: usize,
    pub rows_removed: usize,
    pub vertices_removed: usize,
    pub vertices_before: usize,
    pub triangles_before: usize,
    pub vertices_after: usize,
    pub triangles_after: usize,
}

/// Read-only state shared by every stage of one build.
pub(crate) struct BuildContext<'a> {
    pub terrain: &'a TerrainData,
    pub frame: WaveFrame,
    pub params: &'a Params,
    pub sink: &'a dyn DiagnosticSink,
    pub wavelength: f32,
    pub k: f32,
    pub tide: f32,
    /// t spacing of the initial wavefront (1 / (rayCount - 1)).
    pub initial_dt: f32,
    pub phase_per_step: f32,
    pub source_phase: f32,
    pub source_amplitude: f32,
    pub breaking_depth: f32,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        source: &WaveSource,
        terrain: &'a TerrainData,
        tide_height: f32,
        params: &'a Params,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        let frame = bounds::solve(terrain, source.wavelength, source.direction, params);
        let rays = march::ray_count(frame.max_perp - frame.min_perp, params.vertex_spacing);
        let k = physics::wavenumber(source.wavelength);
        Self {
            terrain,
            frame,
            params,
            sink,
            wavelength: source.wavelength,
            k,
            tide: tide_height,
            initial_dt: 1.0 / (rays - 1) as f32,
            phase_per_step: k * params.step_size,
            source_phase: source.phase_offset,
            source_amplitude: source.amplitude,
            breaking_depth: physics::breaking_depth(source.wavelength),
        }
    }

    /// Water depth at a world point under the build's tide level.
    #[inline]
    pub(crate) fn depth_at(&self, x: f32, y: f32) -> f32 {
        (self.tide - self.terrain.height(x, y)).max(0.0)
    }
}

fn validate(source: &WaveSource, params: &Params) -> Result<(), BuildError> {
    if !source.wavelength.is_finite() || source.wavelength <= 0.0 {
        return Err(BuildError::NumericDegenerate(format!(
            "wavelength {} is not a positive finite length",
            source.wavelength
        )));
    }
    if !source.direction.is_finite() || !source.phase_offset.is_finite() {
        return Err(BuildError::NumericDegenerate(
            "wave direction or phase is not finite".into(),
        ));
    }
    if !source.amplitude.is_finite() || source.amplitude < 0.0 {
        return Err(BuildError::NumericDegenerate(format!(
            "amplitude {} is not a non-negative finite value",
            source.amplitude
        )));
    }
    if params.vertex_spacing <= 0.0 || params.step_size <= 0.0 {
        return Err(BuildError::NumericDegenerate(
            "vertex spacing and step size must be positive".into(),
        ));
    }
    if params.decimation_tolerance <= 0.0 {
        return Err(BuildError::NumericDegenerate(
            "decimation tolerance must be positive".into(),
        ));
    }
    Ok(())
}

/// Build a wave mesh with diagnostics disabled.
pub fn build_wave_mesh(
    source: &WaveSource,
    terrain: &TerrainData,
    tide_height: f32,
    params: &Params,
) -> Result<(MeshData, BuildStats), BuildError> {
    static SINK: NullSink = NullSink;
    build_wave_mesh_with_sink(source, terrain, tide_height, params, &SINK)
}

/// Build a wave mesh for one source over one terrain snapshot.
///
/// Fixed pipeline: bounds -> initial wavefront -> (march -> refine ->
/// amplitude -> diffraction) per step -> decimate -> triangulate.
pub fn build_wave_mesh_with_sink(
    source: &WaveSource,
    terrain: &TerrainData,
    tide_height: f32,
    params: &Params,
    sink: &dyn DiagnosticSink,
) -> Result<(MeshData, BuildStats), BuildError> {
    validate(source, params)?;

    let t = Instant::now();
    let ctx = BuildContext::new(source, terrain, tide_height, params, sink);
    let bounds_ms = t.elapsed().as_secs_f64() * 1000.0;

    let mut march_ms = 0.0;
    let mut amplitude_ms = 0.0;
    let mut diffraction_ms = 0.0;
    let mut refine_counts = refine::RefineCounts::default();
    let mut scratch = Vec::new();

    let t = Instant::now();
    let mut first = march::initial_wavefront(&ctx);
    march_ms += t.elapsed().as_secs_f64() * 1000.0;

    let t = Instant::now();
    diffract::assign_amplitude(&ctx, &mut first);
    amplitude_ms += t.elapsed().as_secs_f64() * 1000.0;
    let t = Instant::now();
    diffract::diffuse(&ctx, &mut first, &mut scratch);
    diffraction_ms += t.elapsed().as_secs_f64() * 1000.0;

    let mut steps = vec![first];
    let domain = ctx.frame.march_length();
    // Rays never advance slower than the speed floor, so past this many
    // steps only a pathological loop keeps the march alive.
    let step_cap = (domain / (params.step_size * MIN_SPEED_FACTOR)).ceil() as usize + 8;

    let mut marched = 0.0f32;
    let mut index = 1u32;
    loop {
        if marched >= domain {
            break;
        }
        if steps.len() > step_cap {
            log::warn!(
                "march: step cap {} hit before the domain was covered",
                step_cap
            );
            sink.event(&DiagnosticEvent {
                stage: "march",
                name: "step_cap",
                count: steps.len(),
                threshold_hit: true,
            });
            break;
        }

        let t = Instant::now();
        let raw = march::advance(&ctx, steps.last().unwrap(), index);
        if raw.is_empty() {
            march_ms += t.elapsed().as_secs_f64() * 1000.0;
            if steps.len() == 1 {
                return Err(BuildError::NumericDegenerate(
                    "every ray died on the first step".into(),
                ));
            }
            break;
        }
        let (mut refined, counts) = refine::refine_step(&ctx, &raw);
        refine_counts.add(counts);
        march_ms += t.elapsed().as_secs_f64() * 1000.0;

        let t = Instant::now();
        diffract::assign_amplitude(&ctx, &mut refined);
        amplitude_ms += t.elapsed().as_secs_f64() * 1000.0;
        let t = Instant::now();
        diffract::diffuse(&ctx, &mut refined, &mut scratch);
        diffraction_ms += t.elapsed().as_secs_f64() * 1000.0;

        // Coverage is measured by the slowest surviving ray: shallow water
        // runs at a quarter of the nominal step, so the nominal count says
        // nothing about how far the front has actually travelled.
        let mut min_proj = f32::INFINITY;
        for i in 0..refined.len() {
            let (proj, _) = ctx.frame.project(refined.x[i], refined.y[i]);
            min_proj = min_proj.min(proj);
        }
        marched = min_proj - ctx.frame.min_proj;

        steps.push(refined);
        index += 1;
    }

    let steps_marched = steps.len();
    let (vertices_before, triangles_before) = mesh::count_topology(&steps);

    let t = Instant::now();
    let outcome = decimate::decimate(&ctx, steps);
    let decimate_ms = t.elapsed().as_secs_f64() * 1000.0;
    let (vertices_after, triangles_after) = mesh::count_topology(&outcome.steps);

    let t = Instant::now();
    let mesh_data = mesh::emit(&ctx, &outcome.steps);
    let mesh_ms = t.elapsed().as_secs_f64() * 1000.0;

    let stats = BuildStats {
        timings: vec![
            Timing {
                name: "bounds",
                ms: bounds_ms,
            },
            Timing {
                name: "march",
                ms: march_ms,
            },
            Timing {
                name: "amplitude",
                ms: amplitude_ms,
            },
            Timing {
                name: "diffraction",
                ms: diffraction_ms,
            },
            Timing {
                name: "decimate",
                ms: decimate_ms,
            },
            Timing {
                name: "mesh",
                ms: mesh_ms,
            },
        ],
        steps: steps_marched,
        merges: refine_counts.merges,
        splits: refine_counts.splits,
        rows_removed: outcome.rows_removed,
        vertices_removed: outcome.vertices_removed,
        vertices_before,
        triangles_before,
        vertices_after,
        triangles_after,
    };

    Ok((mesh_data, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VERTEX_FLOATS;

    fn source(wavelength: f32) -> WaveSource {
        WaveSource {
            amplitude: 1.0,
            wavelength,
            direction: 0.0,
            phase_offset: 0.0,
        }
    }

    #[test]
    fn open_ocean_build_is_flat_and_well_formed() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let (mesh, stats) = build_wave_mesh(&source(60.0), &terrain, 0.0, &params).unwrap();

        assert!(mesh.vertex_count > 0);
        assert_eq!(mesh.index_count % 3, 0);
        assert_eq!(mesh.vertices.len(), mesh.vertex_count * VERTEX_FLOATS);
        for tri in mesh.indices.chunks(3) {
            assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
            for &v in tri {
                assert!((v as usize) < mesh.vertex_count);
            }
        }
        // Deep water at this wavelength: no refraction, no breaking, and
        // amplitude stays at the source value everywhere.
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            assert!((v[2] - 1.0).abs() < 0.05, "amplitude {}", v[2]);
            assert_eq!(v[3], 0.0, "breaking at vertex {i}");
            assert!(v[5] == 0.0 || v[5] == 1.0);
        }
        assert_eq!(stats.merges, 0);
        assert_eq!(stats.splits, 0);
        // A uniform plane wave decimates down to almost nothing.
        assert!(stats.rows_removed > stats.steps / 2);
        assert!(stats.vertices_after < stats.vertices_before / 4);
    }

    #[test]
    fn vertices_stay_inside_the_solved_bounds() {
        let terrain = scenarios::circular_island();
        let params = Params::default();
        let src = source(30.0);
        let (mesh, _) = build_wave_mesh(&src, &terrain, 0.0, &params).unwrap();
        let frame = bounds::solve(&terrain, src.wavelength, src.direction, &params);
        let mut max_proj = f32::NEG_INFINITY;
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            let (proj, perp) = frame.project(v[0], v[1]);
            assert!(proj >= frame.min_proj - 1.0 && proj <= frame.max_proj + 1.0);
            assert!(perp >= frame.min_perp - 1.0 && perp <= frame.max_perp + 1.0);
            max_proj = max_proj.max(proj);
        }
        // The march runs until the surviving front leaves the rectangle,
        // so the mesh reaches the downwave edge.
        assert!(
            max_proj >= frame.max_proj - 2.0 * params.step_size,
            "front stopped at {max_proj} of {}",
            frame.max_proj
        );
    }

    #[test]
    fn slow_shallow_march_still_covers_the_domain() {
        use crate::terrain::{rect_polygon, ContourSpec, TerrainData};
        // A broad shelf just above the breaking depth: rays crawl at about
        // two thirds of the deep-water step but never break and never die,
        // so coverage has to come from actual ray progress, not from the
        // nominal step count.
        let terrain = TerrainData::assemble(
            &[ContourSpec {
                polygon: rect_polygon(-1000.0, -1000.0, 1000.0, 1000.0),
                height: -4.0,
                parent: None,
            }],
            -4.0,
        )
        .unwrap();
        let params = Params::default();
        let src = source(50.0);
        let (mesh, stats) = build_wave_mesh(&src, &terrain, 0.0, &params).unwrap();
        let frame = bounds::solve(&terrain, src.wavelength, src.direction, &params);

        let mut max_proj = f32::NEG_INFINITY;
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            assert_eq!(v[3], 0.0, "shelf is above the breaking depth");
            max_proj = max_proj.max(frame.project(v[0], v[1]).0);
        }
        assert!(
            max_proj >= frame.max_proj - 2.0 * params.step_size,
            "front stopped at {max_proj} of {}",
            frame.max_proj
        );
        // Covering the rectangle at reduced speed takes well over the
        // deep-water step estimate.
        let nominal = frame.march_length() / params.step_size;
        assert!(
            stats.steps as f32 > 1.2 * nominal,
            "only {} steps for a nominal estimate of {nominal}",
            stats.steps
        );
    }

    #[test]
    fn island_shadow_gets_diffracted_amplitude() {
        let terrain = scenarios::circular_island();
        let params = Params::default();
        let (mesh, _) = build_wave_mesh(&source(30.0), &terrain, 0.0, &params).unwrap();

        // Behind the island the front is split and its edges fade into the
        // shadow: vertices bordering the gap carry reduced but non-zero
        // amplitude, recovering with lateral distance from the shadow.
        let mut edge = Vec::new(); // flanking the shadow gap
        let mut open = Vec::new(); // well clear of it
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            if v[0] > 200.0 && v[0] < 2600.0 {
                let ay = v[1].abs();
                if (80.0..120.0).contains(&ay) {
                    edge.push(v[2]);
                } else if ay > 150.0 {
                    open.push(v[2]);
                }
            }
        }
        assert!(!edge.is_empty(), "no vertices flanking the shadow");
        assert!(!open.is_empty(), "no open-water vertices in the band");
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        let edge_mean = mean(&edge);
        let open_max = open.iter().cloned().fold(0.0f32, f32::max);
        assert!(edge.iter().all(|&a| a >= 0.0));
        assert!(
            edge_mean > 0.0 && edge_mean < open_max,
            "edge {edge_mean} vs open max {open_max}"
        );
        // Far from the island the front is still the undisturbed plane wave.
        assert!((open_max - 1.0).abs() < 0.15, "open water max {open_max}");
    }

    #[test]
    fn beach_build_shoals_then_breaks() {
        let terrain = scenarios::breaking_beach();
        let params = Params::default();
        let (mesh, _) = build_wave_mesh(&source(100.0), &terrain, 0.0, &params).unwrap();
        let mut max_breaking = 0.0f32;
        let mut max_amplitude = 0.0f32;
        for i in 0..mesh.vertex_count {
            let v = mesh.vertex(i);
            max_breaking = max_breaking.max(v[3]);
            if v[0] < 0.0 {
                max_amplitude = max_amplitude.max(v[2]);
            }
        }
        assert!(max_breaking > 0.9, "max breaking {max_breaking}");
        // Shoaling amplifies above the deep-water amplitude before the
        // breaking decay takes it back down.
        assert!(max_amplitude > 1.05, "max amplitude {max_amplitude}");
    }

    #[test]
    fn decimation_reconstructs_removed_rows() {
        let terrain = scenarios::nested_shelves();
        let params = Params::default();
        let src = source(50.0);
        static SINK: diag::NullSink = diag::NullSink;
        let ctx = BuildContext::new(&src, &terrain, 0.0, &params, &SINK);

        let mut step = march::initial_wavefront(&ctx);
        diffract::assign_amplitude(&ctx, &mut step);
        let mut steps = vec![step];
        let mut scratch = Vec::new();
        for index in 1..280u32 {
            let raw = march::advance(&ctx, steps.last().unwrap(), index);
            if raw.is_empty() {
                break;
            }
            let (mut refined, _) = refine::refine_step(&ctx, &raw);
            diffract::assign_amplitude(&ctx, &mut refined);
            diffract::diffuse(&ctx, &mut refined, &mut scratch);
            steps.push(refined);
        }
        let originals = steps.clone();
        let outcome = decimate::decimate(&ctx, steps);
        assert!(outcome.rows_removed > 0, "nothing was decimated");

        let tol = params.decimation_tolerance;
        let kept = &outcome.steps;
        for row in &originals {
            if kept
                .iter()
                .any(|s| s.original_index == row.original_index)
            {
                continue;
            }
            let before = kept
                .iter()
                .filter(|s| s.original_index < row.original_index)
                .next_back()
                .unwrap();
            let after = kept
                .iter()
                .find(|s| s.original_index > row.original_index)
                .unwrap();
            let u = (row.original_index - before.original_index) as f32
                / (after.original_index - before.original_index) as f32;
            for i in 0..row.len() {
                let t = row.t[i];
                let (Some(a), Some(b)) = (before.sample_at(t), after.sample_at(t)) else {
                    continue;
                };
                let lx = a.x + (b.x - a.x) * u;
                let ly = a.y + (b.y - a.y) * u;
                let dx = row.x[i] - lx;
                let dy = row.y[i] - ly;
                let pos_err = (dx * dx + dy * dy).sqrt();
                assert!(
                    pos_err <= 2.0 * tol * src.wavelength,
                    "row {} ray {i} position error {pos_err}",
                    row.original_index
                );
                let lamp = a.amplitude + (b.amplitude - a.amplitude) * u;
                assert!(
                    (row.amplitude[i] - lamp).abs() <= 2.0 * tol,
                    "row {} ray {i} amplitude error",
                    row.original_index
                );
            }
        }
    }

    #[test]
    fn invalid_sources_are_rejected() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let bad = WaveSource {
            amplitude: 1.0,
            wavelength: 0.0,
            direction: 0.0,
            phase_offset: 0.0,
        };
        assert!(matches!(
            build_wave_mesh(&bad, &terrain, 0.0, &params),
            Err(BuildError::NumericDegenerate(_))
        ));
        let bad = WaveSource {
            amplitude: f32::NAN,
            wavelength: 100.0,
            direction: 0.0,
            phase_offset: 0.0,
        };
        assert!(matches!(
            build_wave_mesh(&bad, &terrain, 0.0, &params),
            Err(BuildError::NumericDegenerate(_))
        ));
    }

    #[test]
    fn stats_carry_every_stage_timing() {
        let terrain = scenarios::open_ocean();
        let params = Params::default();
        let (_, stats) = build_wave_mesh(&source(60.0), &terrain, 0.0, &params).unwrap();
        let names: Vec<_> = stats.timings.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            ["bounds", "march", "amplitude", "diffraction", "decimate", "mesh"]
        );
        assert!(stats.steps > 2);
        assert!(stats.vertices_after <= stats.vertices_before);
        assert!(stats.triangles_after <= stats.triangles_before);
    }
}
