//! Contour-tree terrain: parsing of the packed level buffers and the
//! height / gradient query the marcher runs against.
//!
//! Terrain is a forest of closed pre-sampled polygons laid out in DFS
//! pre-order. A contour's whole subtree sits in the records right after it,
//! so containment descent is a single forward scan that jumps over
//! `skip_count + 1` records whenever the point is outside — no recursion,
//! no auxiliary stack.

use crate::error::BuildError;

/// Words per packed contour record (13 x 4 bytes, little-endian).
pub const CONTOUR_RECORD_WORDS: usize = 13;

/// Central-difference delta for the height gradient (feet).
const GRADIENT_DELTA: f32 = 2.0;

/// Points within this distance of a polygon edge count as inside.
const EDGE_EPS: f32 = 1e-4;

/// One terrain contour. Heights are feet; negative = below sea level.
#[derive(Clone, Debug)]
pub struct Contour {
    pub point_start: u32,
    pub point_count: u32,
    pub height: f32,
    pub parent: i32,
    pub depth: u32,
    pub child_start: u32,
    pub child_count: u32,
    pub is_coastline: bool,
    pub bbox_min_x: f32,
    pub bbox_min_y: f32,
    pub bbox_max_x: f32,
    pub bbox_max_y: f32,
    pub skip_count: u32,
}

impl Contour {
    #[inline]
    fn bbox_contains(&self, x: f32, y: f32) -> bool {
        x >= self.bbox_min_x && x <= self.bbox_max_x && y >= self.bbox_min_y && y <= self.bbox_max_y
    }
}

/// Read-only terrain snapshot consumed by one build.
#[derive(Clone, Debug)]
pub struct TerrainData {
    pub contours: Vec<Contour>,
    /// Polygon vertices, x/y interleaved, contours concatenated in DFS order.
    pub points: Vec<f32>,
    /// Flat child-index list, sliced by each contour's child range.
    pub children: Vec<u32>,
    /// Height reported outside all root contours (open ocean).
    pub default_depth: f32,
}

/// Input to [`TerrainData::assemble`]: one contour with a parent link into
/// the spec slice. Parents must be declared before their children.
#[derive(Clone, Debug)]
pub struct ContourSpec {
    pub polygon: Vec<[f32; 2]>,
    pub height: f32,
    pub parent: Option<usize>,
}

impl TerrainData {
    /// Parse the packed level-file buffers (layout per the level contract:
    /// 13 little-endian words per contour record).
    pub fn from_packed(
        vertex_data: &[f32],
        contour_data: &[u8],
        children_data: &[u32],
        contour_count: usize,
        default_depth: f32,
    ) -> Result<Self, BuildError> {
        let record_bytes = CONTOUR_RECORD_WORDS * 4;
        if contour_data.len() != contour_count * record_bytes {
            return Err(BuildError::TerrainInvalid(format!(
                "contour buffer is {} bytes, expected {} for {} contours",
                contour_data.len(),
                contour_count * record_bytes,
                contour_count
            )));
        }
        if vertex_data.len() % 2 != 0 {
            return Err(BuildError::TerrainInvalid(format!(
                "vertex buffer holds {} floats (odd)",
                vertex_data.len()
            )));
        }
        let n_points = vertex_data.len() / 2;

        let word_u32 = |rec: &[u8], w: usize| {
            u32::from_le_bytes(rec[w * 4..w * 4 + 4].try_into().unwrap())
        };
        let word_f32 = |rec: &[u8], w: usize| {
            f32::from_le_bytes(rec[w * 4..w * 4 + 4].try_into().unwrap())
        };

        let mut contours = Vec::with_capacity(contour_count);
        for i in 0..contour_count {
            let rec = &contour_data[i * record_bytes..(i + 1) * record_bytes];
            let c = Contour {
                point_start: word_u32(rec, 0),
                point_count: word_u32(rec, 1),
                height: word_f32(rec, 2),
                parent: word_u32(rec, 3) as i32,
                depth: word_u32(rec, 4),
                child_start: word_u32(rec, 5),
                child_count: word_u32(rec, 6),
                is_coastline: word_u32(rec, 7) != 0,
                bbox_min_x: word_f32(rec, 8),
                bbox_min_y: word_f32(rec, 9),
                bbox_max_x: word_f32(rec, 10),
                bbox_max_y: word_f32(rec, 11),
                skip_count: word_u32(rec, 12),
            };

            if c.point_count < 3 {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour {} has {} points, need at least 3",
                    i, c.point_count
                )));
            }
            let point_end = c.point_start as usize + c.point_count as usize;
            if point_end > n_points {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour {} points [{}, {}) exceed vertex buffer ({} points)",
                    i, c.point_start, point_end, n_points
                )));
            }
            let child_end = c.child_start as usize + c.child_count as usize;
            if child_end > children_data.len() {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour {} children [{}, {}) exceed child buffer ({})",
                    i,
                    c.child_start,
                    child_end,
                    children_data.len()
                )));
            }
            if c.parent >= 0 && c.parent as usize >= contour_count {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour {} parent {} out of range",
                    i, c.parent
                )));
            }
            if i + c.skip_count as usize >= contour_count {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour {} skip count {} runs past the forest",
                    i, c.skip_count
                )));
            }
            contours.push(c);
        }
        for (i, &child) in children_data.iter().enumerate() {
            if child as usize >= contour_count {
                return Err(BuildError::TerrainInvalid(format!(
                    "child entry {} references contour {} of {}",
                    i, child, contour_count
                )));
            }
        }

        Ok(Self {
            contours,
            points: vertex_data.to_vec(),
            children: children_data.to_vec(),
            default_depth,
        })
    }

    /// Build terrain from per-contour specs, deriving the DFS layout, child
    /// ranges, bounding boxes and skip counts. Used by the demo scenarios
    /// and the test suite; level files arrive through [`Self::from_packed`].
    pub fn assemble(specs: &[ContourSpec], default_depth: f32) -> Result<Self, BuildError> {
        for (i, spec) in specs.iter().enumerate() {
            if spec.polygon.len() < 3 {
                return Err(BuildError::TerrainInvalid(format!(
                    "contour spec {} has {} points, need at least 3",
                    i,
                    spec.polygon.len()
                )));
            }
            if let Some(p) = spec.parent {
                if p >= i {
                    return Err(BuildError::TerrainInvalid(format!(
                        "contour spec {} declares parent {} at or after itself",
                        i, p
                    )));
                }
            }
        }

        // Child adjacency in spec order, then DFS pre-order over the forest.
        let mut spec_children: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        let mut roots = Vec::new();
        for (i, spec) in specs.iter().enumerate() {
            match spec.parent {
                Some(p) => spec_children[p].push(i),
                None => roots.push(i),
            }
        }
        let mut order = Vec::with_capacity(specs.len());
        let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            order.push(i);
            for &c in spec_children[i].iter().rev() {
                stack.push(c);
            }
        }
        let mut new_index = vec![0usize; specs.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let mut points = Vec::new();
        let mut children = Vec::new();
        let mut contours = Vec::with_capacity(specs.len());
        for &old in &order {
            let spec = &specs[old];
            let point_start = (points.len() / 2) as u32;
            let mut min_x = f32::INFINITY;
            let mut min_y = f32::INFINITY;
            let mut max_x = f32::NEG_INFINITY;
            let mut max_y = f32::NEG_INFINITY;
            for p in &spec.polygon {
                points.push(p[0]);
                points.push(p[1]);
                min_x = min_x.min(p[0]);
                min_y = min_y.min(p[1]);
                max_x = max_x.max(p[0]);
                max_y = max_y.max(p[1]);
            }
            let child_start = children.len() as u32;
            for &c in &spec_children[old] {
                children.push(new_index[c] as u32);
            }
            let parent = match spec.parent {
                Some(p) => new_index[p] as i32,
                None => -1,
            };
            let mut depth = 0;
            let mut walk = spec.parent;
            while let Some(p) = walk {
                depth += 1;
                walk = specs[p].parent;
            }
            contours.push(Contour {
                point_start,
                point_count: spec.polygon.len() as u32,
                height: spec.height,
                parent,
                depth,
                child_start,
                child_count: spec_children[old].len() as u32,
                is_coastline: spec.height == 0.0,
                bbox_min_x: min_x,
                bbox_min_y: min_y,
                bbox_max_x: max_x,
                bbox_max_y: max_y,
                skip_count: 0,
            });
        }

        // Descendant counts: accumulate subtree sizes bottom-up over the
        // pre-order (children always follow their parent).
        for i in (0..contours.len()).rev() {
            let p = contours[i].parent;
            if p >= 0 {
                let add = contours[i].skip_count + 1;
                contours[p as usize].skip_count += add;
            }
        }

        Ok(Self {
            contours,
            points,
            children,
            default_depth,
        })
    }

    #[inline]
    fn polygon(&self, ci: usize) -> &[f32] {
        let c = &self.contours[ci];
        let start = c.point_start as usize * 2;
        &self.points[start..start + c.point_count as usize * 2]
    }

    /// Deepest contour containing the point, if any. Forward scan with
    /// subtree skipping; siblings are disjoint so at most one branch is
    /// entered per level.
    fn deepest_containing(&self, x: f32, y: f32) -> Option<usize> {
        let mut best = None;
        let mut i = 0;
        while i < self.contours.len() {
            let c = &self.contours[i];
            if c.bbox_contains(x, y) && polygon_contains(self.polygon(i), x, y) {
                best = Some(i);
                i += 1;
            } else {
                i += c.skip_count as usize + 1;
            }
        }
        best
    }

    /// Terrain height at a point. Total; outside all root contours this is
    /// the default open-ocean depth.
    pub fn height(&self, x: f32, y: f32) -> f32 {
        match self.deepest_containing(x, y) {
            None => self.default_depth,
            Some(ci) => self.blended_height(ci, x, y),
        }
    }

    /// Height plus central-difference gradient. The gradient drives Snell
    /// refraction; it is not meaningful over dry land.
    pub fn height_and_gradient(&self, x: f32, y: f32) -> (f32, f32, f32) {
        let h = self.height(x, y);
        let d = GRADIENT_DELTA;
        let gx = (self.height(x + d, y) - self.height(x - d, y)) / (2.0 * d);
        let gy = (self.height(x, y + d) - self.height(x, y - d)) / (2.0 * d);
        (h, gx, gy)
    }

    /// Height inside contour `ci`, inverse-distance blended with its
    /// children so the field stays continuous across child boundaries.
    ///
    /// Weights are 1/d^2 over distances to the polygon boundaries. The
    /// containing contour's own weight carries a floor of sum(1/r_i^2)
    /// (r_i = half the child bbox diagonal): a child's pull fades once the
    /// point is more than the child's own size away, so small far-off
    /// children cannot override deep parent interior.
    fn blended_height(&self, ci: usize, x: f32, y: f32) -> f32 {
        let c = &self.contours[ci];
        if c.child_count == 0 {
            return c.height;
        }

        let d_own = polygon_distance(self.polygon(ci), x, y);
        if d_own <= EDGE_EPS {
            return c.height;
        }
        let mut parent_weight = 1.0 / (d_own * d_own);
        let mut weight_sum = 0.0;
        let mut height_sum = 0.0;

        let child_start = c.child_start as usize;
        for k in 0..c.child_count as usize {
            let child = self.children[child_start + k] as usize;
            let d = polygon_distance(self.polygon(child), x, y);
            if d <= EDGE_EPS {
                return self.contours[child].height;
            }
            let cc = &self.contours[child];
            let ex = cc.bbox_max_x - cc.bbox_min_x;
            let ey = cc.bbox_max_y - cc.bbox_min_y;
            let reach_sq = (0.25 * (ex * ex + ey * ey)).max(EDGE_EPS);
            parent_weight += 1.0 / reach_sq;

            let w = 1.0 / (d * d);
            weight_sum += w;
            height_sum += w * cc.height;
        }

        (height_sum + parent_weight * c.height) / (weight_sum + parent_weight)
    }

    /// Root contours (no parent), used by the bounds solver.
    pub fn roots(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter().filter(|c| c.parent < 0)
    }
}

/// Even-odd containment test over an interleaved x/y polygon. Points on an
/// edge are treated as inside (conservative).
fn polygon_contains(poly: &[f32], x: f32, y: f32) -> bool {
    let n = poly.len() / 2;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (poly[i * 2], poly[i * 2 + 1]);
        let (xj, yj) = (poly[j * 2], poly[j * 2 + 1]);
        if (yi > y) != (yj > y) {
            let cross_x = xi + (y - yi) / (yj - yi) * (xj - xi);
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    if inside {
        return true;
    }
    // Crossing parity calls edge points either way; settle them as inside.
    polygon_distance_sq(poly, x, y) <= EDGE_EPS * EDGE_EPS
}

#[inline]
fn segment_distance_sq(ax: f32, ay: f32, bx: f32, by: f32, x: f32, y: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((x - ax) * dx + (y - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let px = ax + t * dx;
    let py = ay + t * dy;
    (x - px) * (x - px) + (y - py) * (y - py)
}

fn polygon_distance_sq(poly: &[f32], x: f32, y: f32) -> f32 {
    let n = poly.len() / 2;
    let mut best = f32::INFINITY;
    let mut j = n - 1;
    for i in 0..n {
        let d = segment_distance_sq(
            poly[j * 2],
            poly[j * 2 + 1],
            poly[i * 2],
            poly[i * 2 + 1],
            x,
            y,
        );
        if d < best {
            best = d;
        }
        j = i;
    }
    best
}

/// Distance from a point to a polygon boundary.
fn polygon_distance(poly: &[f32], x: f32, y: f32) -> f32 {
    polygon_distance_sq(poly, x, y).sqrt()
}

/// CCW circle polygon, the pre-sampled form the demo scenarios use.
pub fn circle_polygon(cx: f32, cy: f32, radius: f32, samples: usize) -> Vec<[f32; 2]> {
    (0..samples)
        .map(|i| {
            let a = i as f32 / samples as f32 * std::f32::consts::TAU;
            [cx + radius * a.cos(), cy + radius * a.sin()]
        })
        .collect()
}

/// CCW axis-aligned rectangle polygon.
pub fn rect_polygon(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<[f32; 2]> {
    vec![
        [min_x, min_y],
        [max_x, min_y],
        [max_x, max_y],
        [min_x, max_y],
    ]
}
