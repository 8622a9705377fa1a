//! Adaptive wavefront refinement, run once per segment per step after the
//! march: merge rays that bunched up (convergence zones), split ray pairs
//! that drifted apart (divergence zones, caustic flanks). The split
//! threshold scales with a pair's t-gap so original rays split eagerly
//! while deep split-offspring need ever larger gaps — that bounds the
//! cascade.

use crate::config::{
    BASE_SPLIT_RATIO, MAX_SPLITS_PER_SEGMENT, MAX_SPLIT_RATIO, MERGE_RATIO, MIN_SPLIT_ENERGY,
    SPLIT_ESCALATION,
};
use crate::diag::DiagnosticEvent;
use crate::wavefront::{Ray, WavefrontStep};
use crate::BuildContext;

/// Merge/split totals for one build, reported in the build stats.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefineCounts {
    pub merges: usize,
    pub splits: usize,
}

impl RefineCounts {
    pub fn add(&mut self, other: RefineCounts) {
        self.merges += other.merges;
        self.splits += other.splits;
    }
}

/// Refine every segment of a freshly marched step.
pub(crate) fn refine_step(ctx: &BuildContext, step: &WavefrontStep) -> (WavefrontStep, RefineCounts) {
    let mut out = WavefrontStep::with_capacity(step.len(), step.original_index);
    let mut counts = RefineCounts::default();
    let escalation_exp = SPLIT_ESCALATION.log2();
    let merge_dist = MERGE_RATIO * ctx.params.vertex_spacing;

    for seg in &step.segments {
        let out_start = out.len();

        // Merge pass: drop the later ray of any pair bunched tighter than
        // the merge distance.
        let mut rays: Vec<Ray> = Vec::with_capacity(seg.len);
        rays.push(step.ray(seg.start));
        for i in seg.range().skip(1) {
            let ray = step.ray(i);
            let last = rays.last().unwrap();
            let dx = ray.x - last.x;
            let dy = ray.y - last.y;
            if (dx * dx + dy * dy).sqrt() < merge_dist {
                counts.merges += 1;
            } else {
                rays.push(ray);
            }
        }

        // Split pass: midpoints are pushed depth-first so a fresh midpoint
        // is immediately re-checked against its left neighbour.
        let mut splits_here = 0usize;
        let mut capped = false;
        out.push(rays[0]);
        let mut stack: Vec<Ray> = Vec::new();
        for &b in &rays[1..] {
            stack.push(b);
            while let Some(top) = stack.pop() {
                let a = out.ray(out.len() - 1);
                let seg_len = out.len() - out_start + stack.len();
                let may_split = splits_here < MAX_SPLITS_PER_SEGMENT
                    && seg_len < ctx.params.max_segment_points;
                if may_split && should_split(ctx, &a, &top, escalation_exp) {
                    let mid = midpoint(ctx, &a, &top);
                    stack.push(top);
                    stack.push(mid);
                    splits_here += 1;
                } else {
                    if !may_split && should_split(ctx, &a, &top, escalation_exp) {
                        capped = true;
                    }
                    out.push(top);
                }
            }
        }
        counts.splits += splits_here;
        if capped {
            let name = if splits_here >= MAX_SPLITS_PER_SEGMENT {
                "split_cap"
            } else {
                "segment_cap"
            };
            log::warn!("refine: {} hit on segment of {} rays", name, seg.len);
            ctx.sink.event(&DiagnosticEvent {
                stage: "refine",
                name,
                count: splits_here,
                threshold_hit: true,
            });
        }
        out.close_segment(out_start);
    }

    (out, counts)
}

/// A pair splits when its physical gap exceeds the t-scaled threshold.
fn should_split(ctx: &BuildContext, a: &Ray, b: &Ray, escalation_exp: f32) -> bool {
    if a.energy < MIN_SPLIT_ENERGY || b.energy < MIN_SPLIT_ENERGY {
        return false;
    }
    let dt = b.t - a.t;
    if dt <= 0.0 {
        return false;
    }
    let ratio = (BASE_SPLIT_RATIO * (ctx.initial_dt / dt).powf(escalation_exp)).min(MAX_SPLIT_RATIO);
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let gap_sq = dx * dx + dy * dy;
    let threshold = ratio * ctx.params.vertex_spacing;
    gap_sq > threshold * threshold
}

/// Interpolated ray between two parents. Attributes are means, breaking is
/// the pessimistic max, depth is sampled fresh at the midpoint.
fn midpoint(ctx: &BuildContext, a: &Ray, b: &Ray) -> Ray {
    let x = 0.5 * (a.x + b.x);
    let y = 0.5 * (a.y + b.y);
    let mut dir_x = a.dir_x + b.dir_x;
    let mut dir_y = a.dir_y + b.dir_y;
    let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
    if len > 1e-6 {
        dir_x /= len;
        dir_y /= len;
    } else {
        // Parents are antiparallel; inherit the earlier one.
        dir_x = a.dir_x;
        dir_y = a.dir_y;
    }
    Ray {
        x,
        y,
        dir_x,
        dir_y,
        t: 0.5 * (a.t + b.t),
        energy: 0.5 * (a.energy + b.energy),
        breaking: a.breaking.max(b.breaking),
        depth: ctx.depth_at(x, y),
        amplitude: 0.0,
    }
}
