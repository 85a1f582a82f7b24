//! Normalisation and healing of mask polygons.
//!
//! Healing runs before anything is burned:
//!
//! 1. rings with NaN or infinite coordinates are rejected;
//! 2. consecutive duplicate vertices (and the closing vertex) are removed;
//! 3. rings with fewer than three vertices or zero area are dropped;
//! 4. self-intersecting rings are split at their crossings into simple
//!    lobes, which unions the lobes instead of cancelling them;
//! 5. each lobe is classified by the winding number of the unsplit ring at
//!    a point inside it: lobes the ring covers keep the role of the ring,
//!    lobes it does not cover (the inner lobe of a keyhole) take the
//!    opposite role;
//! 6. exterior lobes are oriented counter-clockwise, hole lobes clockwise.
//!
//! With that orientation the nonzero winding number of a layer is positive
//! exactly inside the union of its polygons minus their holes.

use tracing::warn;

use super::{Polygon, Ring};
use crate::error::GeometryError;

/// Split budget per ring, as a multiple of its vertex count.
const SPLIT_BUDGET_FACTOR: usize = 4;

/// A healed ring: simple, open (no closing vertex) and oriented.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedRing {
    pub points: Vec<[f64; 2]>,
    /// +1 for exterior lobes (counter-clockwise), -1 for holes (clockwise).
    pub winding: i32,
}

/// Heal one polygon into oriented rings.
///
/// `index` only labels errors.
pub fn heal_polygon(polygon: &Polygon, index: usize) -> Result<Vec<OrientedRing>, GeometryError> {
    let mut out = Vec::new();

    let exterior = heal_ring(&polygon.exterior, index, 0)?;
    if exterior.is_empty() {
        return Err(GeometryError::Unhealable {
            polygon: index,
            reason: "exterior ring collapses to zero area".to_string(),
        });
    }
    if !exterior.iter().any(|lobe| lobe.covered) {
        return Err(GeometryError::Unhealable {
            polygon: index,
            reason: "exterior ring covers no area".to_string(),
        });
    }
    out.extend(
        exterior
            .into_iter()
            .map(|lobe| orient(lobe.points, if lobe.covered { 1 } else { -1 })),
    );

    for (h, hole) in polygon.holes.iter().enumerate() {
        for lobe in heal_ring(hole, index, h + 1)? {
            out.push(orient(lobe.points, if lobe.covered { -1 } else { 1 }));
        }
    }
    Ok(out)
}

/// A simple lobe of a split ring.
struct Lobe {
    points: Vec<[f64; 2]>,
    /// The unsplit ring has a nonzero winding number inside this lobe.
    covered: bool,
}

/// Clean and split one ring into simple lobes with non-zero area.
fn heal_ring(ring: &Ring, polygon: usize, ring_index: usize) -> Result<Vec<Lobe>, GeometryError> {
    if ring.0.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(GeometryError::NonFinite {
            polygon,
            ring: ring_index,
        });
    }

    let cleaned = dedup(&ring.0);
    let budget = SPLIT_BUDGET_FACTOR * cleaned.len().max(4);
    let mut pending = vec![cleaned.clone()];
    let mut lobes = Vec::new();
    let mut splits = 0usize;

    while let Some(points) = pending.pop() {
        if points.len() < 3 || is_degenerate(&points) {
            continue;
        }
        match first_crossing(&points) {
            None => lobes.push(points),
            Some((i, j, p)) => {
                splits += 1;
                if splits > budget {
                    return Err(GeometryError::Unhealable {
                        polygon,
                        reason: format!("ring {} needs more than {} splits", ring_index, budget),
                    });
                }
                let (a, b) = split_at(&points, i, j, p);
                pending.push(dedup(&a));
                pending.push(dedup(&b));
            }
        }
    }

    if splits == 0 {
        return Ok(lobes
            .into_iter()
            .map(|points| Lobe {
                points,
                covered: true,
            })
            .collect());
    }

    let classified: Vec<Lobe> = lobes
        .iter()
        .enumerate()
        .map(|(k, points)| {
            let inside = sample_point(points, &lobes, k);
            Lobe {
                points: points.clone(),
                covered: inside.is_some_and(|p| winding_number(&cleaned, p) != 0),
            }
        })
        .collect();

    warn!(
        polygon = polygon,
        ring = ring_index,
        splits = splits,
        lobes = classified.len(),
        uncovered = classified.iter().filter(|l| !l.covered).count(),
        "Healed self-intersecting mask ring"
    );
    Ok(classified)
}

/// A point strictly inside `lobes[index]`, preferring one outside every
/// other lobe so nested lobes do not decide for their parent.
fn sample_point(points: &[[f64; 2]], lobes: &[Vec<[f64; 2]>], index: usize) -> Option<[f64; 2]> {
    let candidates = interior_candidates(points);
    candidates
        .iter()
        .copied()
        .find(|&p| {
            lobes
                .iter()
                .enumerate()
                .all(|(k, other)| k == index || winding_number(other, p) == 0)
        })
        .or_else(|| candidates.first().copied())
}

/// Midpoints of inside spans on scanlines halfway between distinct vertex
/// heights of a simple ring.
fn interior_candidates(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut ys: Vec<f64> = points.iter().map(|p| p[1]).collect();
    ys.sort_by(f64::total_cmp);
    ys.dedup();

    let n = points.len();
    let mut out = Vec::new();
    for pair in ys.windows(2) {
        let y = 0.5 * (pair[0] + pair[1]);
        let mut xs: Vec<f64> = (0..n)
            .filter_map(|k| {
                let [x0, y0] = points[k];
                let [x1, y1] = points[(k + 1) % n];
                ((y0 > y) != (y1 > y)).then(|| x0 + (y - y0) * (x1 - x0) / (y1 - y0))
            })
            .collect();
        xs.sort_by(f64::total_cmp);
        out.extend(
            xs.chunks_exact(2)
                .filter(|span| span[1] > span[0])
                .map(|span| [0.5 * (span[0] + span[1]), y]),
        );
    }
    out
}

/// Winding number of a closed ring (no closing vertex) around `p`.
pub fn winding_number(points: &[[f64; 2]], p: [f64; 2]) -> i32 {
    let n = points.len();
    let mut winding = 0;
    for k in 0..n {
        let a = points[k];
        let b = points[(k + 1) % n];
        let side = (b[0] - a[0]) * (p[1] - a[1]) - (p[0] - a[0]) * (b[1] - a[1]);
        if a[1] <= p[1] {
            if b[1] > p[1] && side > 0.0 {
                winding += 1;
            }
        } else if b[1] <= p[1] && side < 0.0 {
            winding -= 1;
        }
    }
    winding
}

/// Remove consecutive duplicates, including a closing vertex equal to the first.
fn dedup(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Shoelace area; positive for counter-clockwise rings (y up).
pub fn signed_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    // Relative to the first vertex to limit cancellation with large
    // projected coordinates.
    let [ox, oy] = points[0];
    let mut sum = 0.0;
    for k in 0..n {
        let [x0, y0] = points[k];
        let [x1, y1] = points[(k + 1) % n];
        sum += (x0 - ox) * (y1 - oy) - (x1 - ox) * (y0 - oy);
    }
    0.5 * sum
}

fn is_degenerate(points: &[[f64; 2]]) -> bool {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &[x, y] in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let scale = (max_x - min_x) * (max_y - min_y);
    signed_area(points).abs() <= 1e-12 * scale
}

fn orient(mut points: Vec<[f64; 2]>, winding: i32) -> OrientedRing {
    let ccw = signed_area(&points) > 0.0;
    if ccw != (winding > 0) {
        points.reverse();
    }
    OrientedRing { points, winding }
}

/// First pair of non-adjacent edges `(i, j)`, `i < j`, that meet, with the
/// meeting point. Edge `k` runs from vertex `k` to vertex `k + 1`.
fn first_crossing(points: &[[f64; 2]]) -> Option<(usize, usize, [f64; 2])> {
    let n = points.len();
    if n < 4 {
        return None;
    }
    for i in 0..n {
        let a0 = points[i];
        let a1 = points[(i + 1) % n];
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let b0 = points[j];
            let b1 = points[(j + 1) % n];
            if let Some(p) = segment_intersection(a0, a1, b0, b1) {
                return Some((i, j, p));
            }
        }
    }
    None
}

/// Intersection point of two segments, endpoints included.
///
/// Parallel (including collinear overlapping) segments return `None`.
fn segment_intersection(
    a0: [f64; 2],
    a1: [f64; 2],
    b0: [f64; 2],
    b1: [f64; 2],
) -> Option<[f64; 2]> {
    let r = [a1[0] - a0[0], a1[1] - a0[1]];
    let s = [b1[0] - b0[0], b1[1] - b0[1]];
    let denom = r[0] * s[1] - r[1] * s[0];
    if denom == 0.0 {
        return None;
    }
    let qp = [b0[0] - a0[0], b0[1] - a0[1]];
    let t = (qp[0] * s[1] - qp[1] * s[0]) / denom;
    let u = (qp[0] * r[1] - qp[1] * r[0]) / denom;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return None;
    }
    // Exact endpoints keep vertex touches from drifting.
    let p = if t == 0.0 {
        a0
    } else if t == 1.0 {
        a1
    } else if u == 0.0 {
        b0
    } else if u == 1.0 {
        b1
    } else {
        [a0[0] + t * r[0], a0[1] + t * r[1]]
    };
    Some(p)
}

/// Split a ring at the crossing of edges `i` and `j` into
/// `[p, v(i+1) .. v(j)]` and `[p, v(j+1) .. v(i)]`.
fn split_at(points: &[[f64; 2]], i: usize, j: usize, p: [f64; 2]) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
    let n = points.len();
    let mut a = vec![p];
    a.extend_from_slice(&points[i + 1..=j]);
    let mut b = vec![p];
    b.extend((j + 1..n).chain(0..=i).map(|k| points[k]));
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[[f64; 2]]) -> Ring {
        Ring(points.to_vec())
    }

    fn square(x: f64, y: f64, size: f64) -> Vec<[f64; 2]> {
        vec![[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]]
    }

    #[test]
    fn test_simple_square_is_oriented() {
        let mut cw = square(0.0, 0.0, 2.0);
        cw.reverse();
        let healed = heal_polygon(&Polygon::new(ring(&cw), vec![]), 0).unwrap();
        assert_eq!(healed.len(), 1);
        assert_eq!(healed[0].points.len(), 4);
        assert!(signed_area(&healed[0].points) > 0.0);
        assert_eq!(healed[0].winding, 1);
    }

    #[test]
    fn test_hole_is_clockwise() {
        let poly = Polygon::new(ring(&square(0.0, 0.0, 10.0)), vec![ring(&square(2.0, 2.0, 2.0))]);
        let healed = heal_polygon(&poly, 0).unwrap();
        assert_eq!(healed.len(), 2);
        assert_eq!(healed[1].winding, -1);
        assert!(signed_area(&healed[1].points) < 0.0);
    }

    #[test]
    fn test_bow_tie_splits_into_two_lobes() {
        let bow = ring(&[[0.0, 0.0], [2.0, 2.0], [2.0, 0.0], [0.0, 2.0], [0.0, 0.0]]);
        let healed = heal_polygon(&Polygon::new(bow, vec![]), 0).unwrap();
        assert_eq!(healed.len(), 2);
        for lobe in &healed {
            assert_eq!(lobe.points.len(), 3);
            assert!((signed_area(&lobe.points) - 1.0).abs() < 1e-12);
            assert!(lobe.points.contains(&[1.0, 1.0]));
        }
    }

    #[test]
    fn test_figure_eight_touching_vertex() {
        // Two squares sharing the vertex (2, 2), traversed as one ring
        let eight = ring(&[
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 2.0],
            [4.0, 2.0],
            [4.0, 4.0],
            [2.0, 4.0],
            [2.0, 2.0],
            [0.0, 2.0],
        ]);
        let healed = heal_polygon(&Polygon::new(eight, vec![]), 0).unwrap();
        let total: f64 = healed.iter().map(|r| signed_area(&r.points)).sum();
        assert_eq!(healed.len(), 2);
        assert!((total - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_keyhole_inner_lobe_becomes_hole() {
        // Outer square with a bridge at y = 5 into a clockwise inner square.
        let keyhole = ring(&[
            [0.0, 0.0],
            [10.0, 0.0],
            [10.0, 10.0],
            [0.0, 10.0],
            [0.0, 5.0],
            [4.0, 5.0],
            [4.0, 6.0],
            [6.0, 6.0],
            [6.0, 4.0],
            [4.0, 4.0],
            [4.0, 5.0],
            [0.0, 5.0],
            [0.0, 0.0],
        ]);
        let healed = heal_polygon(&Polygon::new(keyhole, vec![]), 0).unwrap();
        assert_eq!(healed.len(), 2);
        let outer = healed.iter().find(|r| r.winding == 1).unwrap();
        let inner = healed.iter().find(|r| r.winding == -1).unwrap();
        assert!((signed_area(&outer.points) - 100.0).abs() < 1e-9);
        assert!((signed_area(&inner.points) + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_winding_number() {
        let ccw = vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        assert_eq!(winding_number(&ccw, [1.0, 1.0]), 1);
        assert_eq!(winding_number(&ccw, [3.0, 1.0]), 0);
        let cw: Vec<[f64; 2]> = ccw.iter().rev().copied().collect();
        assert_eq!(winding_number(&cw, [1.0, 1.0]), -1);
    }

    #[test]
    fn test_duplicates_removed() {
        let r = ring(&[[0.0, 0.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [0.0, 0.0]]);
        let healed = heal_polygon(&Polygon::new(r, vec![]), 0).unwrap();
        assert_eq!(healed[0].points.len(), 3);
    }

    #[test]
    fn test_collapsed_exterior_is_unhealable() {
        let line = ring(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [0.0, 0.0]]);
        let err = heal_polygon(&Polygon::new(line, vec![]), 3).unwrap_err();
        assert!(matches!(err, GeometryError::Unhealable { polygon: 3, .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        let bad = ring(&[[0.0, 0.0], [f64::NAN, 0.0], [1.0, 1.0]]);
        let poly = Polygon::new(ring(&square(0.0, 0.0, 1.0)), vec![bad]);
        let err = heal_polygon(&poly, 0).unwrap_err();
        assert_eq!(err, GeometryError::NonFinite { polygon: 0, ring: 1 });
    }

    #[test]
    fn test_degenerate_hole_dropped() {
        let poly = Polygon::new(
            ring(&square(0.0, 0.0, 4.0)),
            vec![ring(&[[1.0, 1.0], [2.0, 1.0], [3.0, 1.0]])],
        );
        assert_eq!(heal_polygon(&poly, 0).unwrap().len(), 1);
    }
}
