/// All tunable build parameters — every build receives its own copy, there
/// is no process-wide configuration state.
#[derive(Clone, Debug)]
pub struct Params {
    // Wavefront resolution
    pub vertex_spacing: f32,
    pub step_size: f32,

    // Simulation rectangle margins, as multipliers over wavelength
    pub upwave_margin: f32,
    pub downwave_margin: f32,
    pub crosswave_margin: f32,

    // Mesh reduction
    pub decimation_tolerance: f32,

    // Diffraction
    pub diffraction_iterations: usize,

    // Safety caps
    pub max_segment_points: usize,
    pub min_energy: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            vertex_spacing: 20.0,
            step_size: 10.0,
            upwave_margin: 10.0,
            downwave_margin: 80.0,
            crosswave_margin: 40.0,
            decimation_tolerance: 0.02,
            diffraction_iterations: 10,
            max_segment_points: 5000,
            min_energy: 0.005,
        }
    }
}

/// Margin floor in feet: even short waves get this much slack around the
/// terrain so shadows and refraction tails fit in the rectangle.
pub const MIN_MARGIN: f32 = 2000.0;

/// Shoaling and divergence amplification cap.
pub const MAX_AMPLIFICATION: f32 = 2.0;

/// Waves start breaking when depth < ratio * wavelength.
pub const BREAKING_DEPTH_RATIO: f32 = 0.07;

/// Per-step Snell rotation clamp (radians).
pub const MAX_TURN_PER_STEP: f32 = std::f32::consts::FRAC_PI_4;

/// Rays never advance slower than this fraction of the deep-water step.
pub const MIN_SPEED_FACTOR: f32 = 0.25;

/// Energy decay exponent scale while a ray runs over dry land.
pub const TERRAIN_DECAY_RATE: f32 = 2.0;

/// Energy decay exponent scale while a ray is breaking.
pub const BREAKING_DECAY_RATE: f32 = 0.5;

/// Adjacent rays closer than this fraction of vertex_spacing are merged.
pub const MERGE_RATIO: f32 = 0.3;

/// Base gap-to-spacing ratio that triggers a split between original rays.
pub const BASE_SPLIT_RATIO: f32 = 1.75;

/// Each halving of a pair's t-gap raises its split threshold by this factor.
pub const SPLIT_ESCALATION: f32 = 1.6;

/// Split threshold ratio never grows beyond this.
pub const MAX_SPLIT_RATIO: f32 = 16.0;

/// Rays below this energy are too unreliable to interpolate a midpoint from.
pub const MIN_SPLIT_ENERGY: f32 = 0.1;

/// At most this many midpoints are inserted into one segment per step.
pub const MAX_SPLITS_PER_SEGMENT: usize = 100;
