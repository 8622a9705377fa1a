//! The marcher: advances every ray of a wavefront one step through the
//! depth field. Refraction first (Snell in continuous form against the
//! depth gradient), then the move, then energy bookkeeping against land
//! and breaking. Rays that fall below the energy floor or leave the
//! simulation rectangle split the front into segments; the gaps are the
//! shadows.

use crate::config::{BREAKING_DECAY_RATE, MIN_SPEED_FACTOR, TERRAIN_DECAY_RATE};
use crate::physics::{breaking_intensity, phase_speed, phase_speed_depth_derivative, snell_turn};
use crate::wavefront::{Ray, WavefrontStep};
use crate::BuildContext;

/// Number of rays across the upwave edge: one per vertex_spacing, never
/// fewer than three.
pub(crate) fn ray_count(perp_extent: f32, vertex_spacing: f32) -> usize {
    ((perp_extent / vertex_spacing).ceil() as usize + 1).max(3)
}

/// Seed the step-0 wavefront: evenly spaced rays along the upwave edge,
/// all moving with the wave, full energy.
pub(crate) fn initial_wavefront(ctx: &BuildContext) -> WavefrontStep {
    let frame = &ctx.frame;
    let n = ray_count(frame.max_perp - frame.min_perp, ctx.params.vertex_spacing);
    let mut step = WavefrontStep::with_capacity(n, 0);
    for i in 0..n {
        let t = i as f32 / (n - 1) as f32;
        let perp = frame.min_perp + t * (frame.max_perp - frame.min_perp);
        let (x, y) = frame.unproject(frame.min_proj, perp);
        let depth = ctx.depth_at(x, y);
        step.push(Ray {
            x,
            y,
            dir_x: frame.dir_x,
            dir_y: frame.dir_y,
            t,
            energy: 1.0,
            breaking: 0.0,
            depth,
            amplitude: 0.0,
        });
    }
    step.close_segment(0);
    step
}

/// Advance every ray of `prev` one step. Dying rays close the running
/// sub-segment; the survivors after a gap start a new one.
pub(crate) fn advance(ctx: &BuildContext, prev: &WavefrontStep, original_index: u32) -> WavefrontStep {
    let mut next = WavefrontStep::with_capacity(prev.len(), original_index);
    let mut run_start = 0;
    for seg in &prev.segments {
        for i in seg.range() {
            let mut ray = prev.ray(i);
            if step_ray(ctx, &mut ray) {
                next.push(ray);
            } else {
                next.close_segment(run_start);
                run_start = next.len();
            }
        }
        next.close_segment(run_start);
        run_start = next.len();
    }
    next
}

/// One ray, one step. Returns false when the ray dies (energy floor or
/// out of bounds).
fn step_ray(ctx: &BuildContext, ray: &mut Ray) -> bool {
    if ray.energy < ctx.params.min_energy {
        return false;
    }

    let (h, grad_x, grad_y) = ctx.terrain.height_and_gradient(ray.x, ray.y);
    let depth = (ctx.tide - h).max(0.0);
    let speed = phase_speed(ctx.k, depth);
    let speed_factor = speed.max(MIN_SPEED_FACTOR);
    let step_len = ctx.params.step_size * speed_factor;

    if depth > 0.0 {
        // Speed gradient = dc/dd * grad(depth); depth deepens where the
        // terrain drops, so grad(depth) = -grad(height).
        let dc_dd = phase_speed_depth_derivative(ctx.k, depth);
        let cg_x = -dc_dd * grad_x;
        let cg_y = -dc_dd * grad_y;
        // Component along the wavefront normal (left of the ray).
        let dc_dn = -cg_x * ray.dir_y + cg_y * ray.dir_x;
        let dtheta = snell_turn(speed, dc_dn, step_len);
        if dtheta != 0.0 {
            let (sin, cos) = dtheta.sin_cos();
            let dx = ray.dir_x * cos - ray.dir_y * sin;
            let dy = ray.dir_x * sin + ray.dir_y * cos;
            ray.dir_x = dx;
            ray.dir_y = dy;
        }
    }

    ray.x += step_len * ray.dir_x;
    ray.y += step_len * ray.dir_y;
    if !ctx.frame.contains(ray.x, ray.y) {
        return false;
    }

    let h_new = ctx.terrain.height(ray.x, ray.y);
    let depth_new = (ctx.tide - h_new).max(0.0);
    let norm_step = speed_factor;

    // Over dry land the wave sheds energy against the exposed terrain.
    let land_height = h_new - ctx.tide;
    if land_height > 0.0 {
        ray.energy *= (-land_height * ctx.k * TERRAIN_DECAY_RATE * norm_step).exp();
    }
    if depth_new < ctx.breaking_depth {
        ray.breaking = ray
            .breaking
            .max(breaking_intensity(depth_new, ctx.breaking_depth));
    }
    if ray.breaking > 0.0 {
        ray.energy *= (-BREAKING_DECAY_RATE * norm_step).exp();
    }

    ray.depth = depth_new;
    true
}
