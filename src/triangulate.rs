//! Sweep-line triangulation between adjacent wavefront rows. Each pair of
//! t-overlapping segments is clipped to the overlap (extended by one
//! neighbour so fringe triangles cover the transition), then two cursors
//! walk the pair emitting whichever triangle is more compact — lower sum of
//! squared edge lengths. When one side runs out, the remaining rays fan
//! from its terminal vertex.

use crate::wavefront::{Segment, WavefrontStep};

/// Inclusive vertex index range within a step's arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub lo: usize,
    pub hi: usize,
}

/// A clipped segment pair ready to sweep.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PairWindows {
    pub prev_seg: usize,
    pub next_seg: usize,
    pub prev: Window,
    pub next: Window,
}

/// All t-overlapping segment pairs between two rows, clipped.
pub(crate) fn overlap_windows(prev: &WavefrontStep, next: &WavefrontStep) -> Vec<PairWindows> {
    let mut out = Vec::new();
    for (pi, pseg) in prev.segments.iter().enumerate() {
        let p_lo = prev.t[pseg.start];
        let p_hi = prev.t[pseg.last()];
        for (ni, nseg) in next.segments.iter().enumerate() {
            let n_lo = next.t[nseg.start];
            let n_hi = next.t[nseg.last()];
            let lo_t = p_lo.max(n_lo);
            let hi_t = p_hi.min(n_hi);
            if lo_t > hi_t {
                continue;
            }
            out.push(PairWindows {
                prev_seg: pi,
                next_seg: ni,
                prev: clip(prev, pseg, lo_t, hi_t),
                next: clip(next, nseg, lo_t, hi_t),
            });
        }
    }
    out
}

/// Clip a segment to [lo_t, hi_t], extended by one vertex on each side.
fn clip(step: &WavefrontStep, seg: &Segment, lo_t: f32, hi_t: f32) -> Window {
    let ts = &step.t[seg.range()];
    let below = ts.partition_point(|&v| v < lo_t);
    let covered = ts.partition_point(|&v| v <= hi_t);
    let lo = below.saturating_sub(1);
    let hi = covered.min(seg.len - 1);
    Window {
        lo: seg.start + lo,
        hi: seg.start + hi,
    }
}

#[inline]
fn tri_cost(
    ax: f32,
    ay: f32,
    bx: f32,
    by: f32,
    cx: f32,
    cy: f32,
) -> f32 {
    let ab = (bx - ax) * (bx - ax) + (by - ay) * (by - ay);
    let bc = (cx - bx) * (cx - bx) + (cy - by) * (cy - by);
    let ca = (ax - cx) * (ax - cx) + (ay - cy) * (ay - cy);
    ab + bc + ca
}

/// Triangulate every overlapping segment pair between two adjacent rows.
/// `prev_bases`/`next_bases` give the packed-mesh vertex index of each
/// segment's first ray.
pub(crate) fn triangulate_rows(
    prev: &WavefrontStep,
    next: &WavefrontStep,
    prev_bases: &[u32],
    next_bases: &[u32],
    indices: &mut Vec<u32>,
) {
    for w in overlap_windows(prev, next) {
        let pseg = prev.segments[w.prev_seg];
        let nseg = next.segments[w.next_seg];
        let p_index = |i: usize| prev_bases[w.prev_seg] + (i - pseg.start) as u32;
        let n_index = |j: usize| next_bases[w.next_seg] + (j - nseg.start) as u32;

        let mut i = w.prev.lo;
        let mut j = w.next.lo;
        while i < w.prev.hi || j < w.next.hi {
            let can_advance_prev = i < w.prev.hi;
            let can_advance_next = j < w.next.hi;
            let advance_prev = if can_advance_prev && can_advance_next {
                let cost_a = tri_cost(
                    prev.x[i],
                    prev.y[i],
                    prev.x[i + 1],
                    prev.y[i + 1],
                    next.x[j],
                    next.y[j],
                );
                let cost_b = tri_cost(
                    prev.x[i],
                    prev.y[i],
                    next.x[j],
                    next.y[j],
                    next.x[j + 1],
                    next.y[j + 1],
                );
                cost_a <= cost_b
            } else {
                can_advance_prev
            };

            if advance_prev {
                indices.push(p_index(i));
                indices.push(p_index(i + 1));
                indices.push(n_index(j));
                i += 1;
            } else {
                indices.push(p_index(i));
                indices.push(n_index(j));
                indices.push(n_index(j + 1));
                j += 1;
            }
        }
    }
}
