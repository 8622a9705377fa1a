//! Mesh decimation over the marched wavefronts, two phases:
//!
//! 1. Row decimation: repeatedly remove the single cheapest interior row
//!    whose rays are reproducible by linear interpolation between the
//!    currently-kept neighbour rows, lowest error first. A min-heap keyed
//!    on (score, row) drives the order; per-row version counters invalidate
//!    stale entries lazily instead of deleting from the heap.
//! 2. Vertex decimation: within each surviving row, a greedy forward scan
//!    drops runs of rays that interpolate within tolerance between the two
//!    kept anchors around them.
//!
//! Original step indices ride along so phases are recomputed correctly at
//! emission time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::diag::DiagnosticEvent;
use crate::mesh::phase_offset;
use crate::wavefront::{Segment, WavefrontStep};
use crate::BuildContext;

/// Decimated wavefronts plus removal counts for the build stats.
pub(crate) struct DecimateOutcome {
    pub steps: Vec<WavefrontStep>,
    pub rows_removed: usize,
    pub vertices_removed: usize,
}

/// Heap entry; min-heap by (score, row) with lazy invalidation.
#[derive(Clone, Copy)]
struct RowEntry {
    score: f32,
    row: usize,
    version: u32,
}

impl PartialEq for RowEntry {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row && self.version == other.version
    }
}
impl Eq for RowEntry {}

impl PartialOrd for RowEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RowEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse ordering so the lowest score pops first; ties
        // resolve by row index for stable order.
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.row.cmp(&self.row))
    }
}

/// Run both decimation phases.
pub(crate) fn decimate(ctx: &BuildContext, steps: Vec<WavefrontStep>) -> DecimateOutcome {
    let m = steps.len();
    let mut alive = vec![true; m];
    let mut rows_removed = 0usize;
    let mut sample_misses = 0usize;

    if m > 2 {
        let mut prev: Vec<usize> = (0..m).map(|i| i.wrapping_sub(1)).collect();
        let mut next: Vec<usize> = (0..m).map(|i| i + 1).collect();
        let mut versions = vec![0u32; m];
        let mut heap = BinaryHeap::new();

        for r in 1..m - 1 {
            if let Some(score) = row_score(ctx, &steps, r, r - 1, r + 1, &mut sample_misses) {
                heap.push(RowEntry {
                    score,
                    row: r,
                    version: 0,
                });
            }
        }

        while let Some(entry) = heap.pop() {
            if !alive[entry.row] || entry.version != versions[entry.row] {
                continue;
            }
            if entry.score >= 1.0 {
                break;
            }
            alive[entry.row] = false;
            rows_removed += 1;
            let p = prev[entry.row];
            let n = next[entry.row];
            next[p] = n;
            prev[n] = p;
            // Only the two neighbours' removal errors changed.
            for nb in [p, n] {
                if nb == 0 || nb == m - 1 {
                    continue;
                }
                versions[nb] += 1;
                if let Some(score) =
                    row_score(ctx, &steps, nb, prev[nb], next[nb], &mut sample_misses)
                {
                    heap.push(RowEntry {
                        score,
                        row: nb,
                        version: versions[nb],
                    });
                }
            }
        }
    }

    if sample_misses > 0 {
        ctx.sink.event(&DiagnosticEvent {
            stage: "decimate",
            name: "sample_miss",
            count: sample_misses,
            threshold_hit: false,
        });
    }

    let mut vertices_removed = 0usize;
    let mut out = Vec::with_capacity(m - rows_removed);
    for (r, step) in steps.into_iter().enumerate() {
        if !alive[r] {
            continue;
        }
        out.push(decimate_row_vertices(ctx, step, &mut vertices_removed));
    }

    DecimateOutcome {
        steps: out,
        rows_removed,
        vertices_removed,
    }
}

/// Max normalised reconstruction error over a row's rays, or None when a
/// ray's t falls into a shadow gap of either neighbour (removal refused).
/// Scores below 1.0 mean every error fits its tolerance.
fn row_score(
    ctx: &BuildContext,
    steps: &[WavefrontStep],
    r: usize,
    p: usize,
    n: usize,
    sample_misses: &mut usize,
) -> Option<f32> {
    let tol = ctx.params.decimation_tolerance;
    let pos_tol = tol * ctx.wavelength;
    let phase_tol = tol * std::f32::consts::PI;

    let row = &steps[r];
    let row_p = &steps[p];
    let row_n = &steps[n];
    let span = (row_n.original_index - row_p.original_index) as f32;
    let u = (row.original_index - row_p.original_index) as f32 / span;

    let mut score = 0.0f32;
    for i in 0..row.len() {
        let t = row.t[i];
        let Some(a) = row_p.sample_at(t) else {
            *sample_misses += 1;
            return None;
        };
        let Some(b) = row_n.sample_at(t) else {
            *sample_misses += 1;
            return None;
        };

        let lx = a.x + (b.x - a.x) * u;
        let ly = a.y + (b.y - a.y) * u;
        let lamp = a.amplitude + (b.amplitude - a.amplitude) * u;
        let phase_a = phase_offset(ctx, row_p.original_index, a.x, a.y);
        let phase_b = phase_offset(ctx, row_n.original_index, b.x, b.y);
        let lphase = phase_a + (phase_b - phase_a) * u;

        let dx = row.x[i] - lx;
        let dy = row.y[i] - ly;
        let pos_err = (dx * dx + dy * dy).sqrt() / pos_tol;
        let amp_err = (row.amplitude[i] - lamp).abs() / tol;
        let phase_actual = phase_offset(ctx, row.original_index, row.x[i], row.y[i]);
        let phase_err = (phase_actual - lphase).abs() / phase_tol;

        score = score.max(pos_err).max(amp_err).max(phase_err);
        if score >= 1.0 {
            return Some(score);
        }
    }
    Some(score)
}

/// Phase 2: greedy collinearity scan within each segment of a row. The
/// anchor extends as far as every skipped ray still interpolates within
/// tolerance; segment endpoints are pinned.
fn decimate_row_vertices(
    ctx: &BuildContext,
    step: WavefrontStep,
    vertices_removed: &mut usize,
) -> WavefrontStep {
    let tol = ctx.params.decimation_tolerance;
    let pos_tol_sq = (tol * ctx.wavelength) * (tol * ctx.wavelength);

    let mut keep = vec![false; step.len()];
    for seg in &step.segments {
        keep[seg.start] = true;
        keep[seg.last()] = true;
        let mut anchor = seg.start;
        while anchor < seg.last() {
            let mut best = anchor + 1;
            let mut j = anchor + 1;
            while j <= seg.last() {
                if span_fits(&step, anchor, j, pos_tol_sq, tol) {
                    best = j;
                    j += 1;
                } else {
                    break;
                }
            }
            keep[best] = true;
            anchor = best;
        }
    }

    let kept = keep.iter().filter(|&&k| k).count();
    *vertices_removed += step.len() - kept;

    let mut out = WavefrontStep::with_capacity(kept, step.original_index);
    for seg in &step.segments {
        let out_start = out.len();
        for i in seg.range() {
            if keep[i] {
                out.push(step.ray(i));
            }
        }
        out.segments.push(Segment {
            start: out_start,
            len: out.len() - out_start,
        });
    }
    out
}

/// Every ray strictly between `i` and `j` must interpolate within
/// tolerance along the (i, j) chord, parameterised by t.
fn span_fits(step: &WavefrontStep, i: usize, j: usize, pos_tol_sq: f32, amp_tol: f32) -> bool {
    let t_span = step.t[j] - step.t[i];
    if t_span <= 0.0 {
        return false;
    }
    for m in i + 1..j {
        let frac = (step.t[m] - step.t[i]) / t_span;
        let lx = step.x[i] + (step.x[j] - step.x[i]) * frac;
        let ly = step.y[i] + (step.y[j] - step.y[i]) * frac;
        let lamp = step.amplitude[i] + (step.amplitude[j] - step.amplitude[i]) * frac;
        let dx = step.x[m] - lx;
        let dy = step.y[m] - ly;
        if dx * dx + dy * dy >= pos_tol_sq {
            return false;
        }
        if (step.amplitude[m] - lamp).abs() >= amp_tol {
            return false;
        }
    }
    true
}
