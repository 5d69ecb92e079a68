// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry engine: quadrilateral validation and the page homography.
//
// A detected page boundary is mapped onto an axis-aligned rectangle whose
// size follows the longer of each pair of opposing edges. The 8-DOF
// homography is solved directly from the four correspondences on
// Hartley-normalised coordinates.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use scanwerk_core::config::GeometryLimits;
use scanwerk_core::error::GeometryError;
use scanwerk_core::{Point, Quadrilateral};
use tracing::{debug, instrument};

/// Smallest accepted `|sin|` of the turn angle at any corner.
///
/// Corners flatter than roughly a tenth of a degree are treated as
/// collinear.
const MIN_CORNER_SINE: f64 = 2e-3;

const CORNER_NAMES: [&str; 4] = ["top-left", "top-right", "bottom-right", "bottom-left"];
const EDGE_NAMES: [&str; 4] = ["top", "right", "bottom", "left"];

/// A projective mapping from source-image pixels onto the rectified page.
///
/// Immutable once computed. The inverse is kept alongside the forward
/// matrix because the rectifier samples by inverse mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveTransform {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    width: u32,
    height: u32,
    condition: f64,
}

impl PerspectiveTransform {
    /// Output page width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output page height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Condition number of the solved linear system.
    pub fn condition_number(&self) -> f64 {
        self.condition
    }

    /// Row-major copy of the forward matrix (source → page).
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        to_rows(&self.matrix)
    }

    /// Row-major copy of the inverse matrix (page → source).
    pub fn inverse_matrix(&self) -> [[f64; 3]; 3] {
        to_rows(&self.inverse)
    }

    /// Map a source-image point onto the page.
    pub fn apply(&self, point: Point) -> Point {
        project(&self.matrix, point.x, point.y)
    }

    /// Map a page point back into the source image.
    pub fn apply_inverse(&self, point: Point) -> Point {
        project(&self.inverse, point.x, point.y)
    }
}

/// Validates quadrilaterals and computes page transforms under fixed limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryEngine {
    limits: GeometryLimits,
}

impl GeometryEngine {
    pub fn new(limits: GeometryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &GeometryLimits {
        &self.limits
    }

    /// Validate `quad` and solve the homography onto its target rectangle.
    pub fn compute_transform(&self, quad: &Quadrilateral) -> Result<PerspectiveTransform, GeometryError> {
        compute_transform(quad, &self.limits)
    }
}

/// Validate `quad` and solve the homography onto its target rectangle.
///
/// Fails with [`GeometryError::Degenerate`] for non-finite, too-short,
/// collinear, non-convex, self-intersecting or counter-clockwise corner
/// sets, and with [`GeometryError::Singular`] when the linear system is
/// ill-conditioned.
#[instrument(skip_all)]
pub fn compute_transform(
    quad: &Quadrilateral,
    limits: &GeometryLimits,
) -> Result<PerspectiveTransform, GeometryError> {
    validate_quadrilateral(quad, limits)?;

    let (width, height) = target_size(quad);
    let (w, h) = (width as f64, height as f64);

    let src = quad.corners.map(|p| [p.x, p.y]);
    let dst = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];

    let (matrix, condition) = solve_homography(&src, &dst, limits.max_condition_number)?;

    let inverse = matrix
        .try_inverse()
        .ok_or(GeometryError::Singular { condition: f64::INFINITY })?;

    debug!(width, height, condition, "Perspective transform computed");

    Ok(PerspectiveTransform {
        matrix,
        inverse,
        width,
        height,
        condition,
    })
}

/// Output rectangle size: the longer of each pair of opposing edges,
/// rounded to the nearest pixel and at least one pixel.
pub fn target_size(quad: &Quadrilateral) -> (u32, u32) {
    let [top, right, bottom, left] = quad.edge_lengths();
    let width = top.max(bottom).round().max(1.0);
    let height = left.max(right).round().max(1.0);
    (width as u32, height as u32)
}

/// Check the corner set is a usable, clockwise, convex quadrilateral.
pub fn validate_quadrilateral(
    quad: &Quadrilateral,
    limits: &GeometryLimits,
) -> Result<(), GeometryError> {
    let c = &quad.corners;

    if let Some(i) = c.iter().position(|p| !p.is_finite()) {
        return Err(degenerate(format!(
            "{} corner has a non-finite coordinate",
            CORNER_NAMES[i]
        )));
    }

    let edges = quad.edge_lengths();
    for (i, len) in edges.iter().enumerate() {
        if *len <= limits.min_edge_px {
            return Err(degenerate(format!(
                "{} edge is {:.1}px, must be longer than {:.1}px",
                EDGE_NAMES[i], len, limits.min_edge_px
            )));
        }
    }

    // Turn direction at each corner. In image coordinates (y down) a
    // clockwise outline turns with a positive cross product everywhere.
    let mut positive = 0;
    let mut negative = 0;
    for i in 0..4 {
        let prev = c[(i + 3) % 4];
        let here = c[i];
        let next = c[(i + 1) % 4];
        let cross = (here.x - prev.x) * (next.y - here.y) - (here.y - prev.y) * (next.x - here.x);
        let scale = edges[(i + 3) % 4] * edges[i];
        if cross.abs() <= MIN_CORNER_SINE * scale {
            return Err(degenerate(format!(
                "{} corner is collinear with its neighbours",
                CORNER_NAMES[i]
            )));
        }
        if cross > 0.0 {
            positive += 1;
        } else {
            negative += 1;
        }
    }

    match (positive, negative) {
        (4, 0) => Ok(()),
        (0, 4) => Err(degenerate(
            "corners are ordered counter-clockwise".to_string(),
        )),
        _ => Err(degenerate(
            "outline is not convex or crosses itself".to_string(),
        )),
    }
}

fn degenerate(reason: String) -> GeometryError {
    GeometryError::Degenerate { reason }
}

// -- Homography solve ---------------------------------------------------------

/// Solve `dst ≈ H · src` for exactly four correspondences with `h33 = 1`.
///
/// Returns the matrix and the condition number of the normalised 8×8
/// system.
fn solve_homography(
    src: &[[f64; 2]; 4],
    dst: &[[f64; 2]; 4],
    max_condition: f64,
) -> Result<(Matrix3<f64>, f64), GeometryError> {
    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let [x, y] = src_n[i];
        let [u, v] = dst_n[i];

        // u = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)
        a[(2 * i, 0)] = x;
        a[(2 * i, 1)] = y;
        a[(2 * i, 2)] = 1.0;
        a[(2 * i, 6)] = -u * x;
        a[(2 * i, 7)] = -u * y;
        b[2 * i] = u;

        // v = (h3 x + h4 y + h5) / (h6 x + h7 y + 1)
        a[(2 * i + 1, 3)] = x;
        a[(2 * i + 1, 4)] = y;
        a[(2 * i + 1, 5)] = 1.0;
        a[(2 * i + 1, 6)] = -v * x;
        a[(2 * i + 1, 7)] = -v * y;
        b[2 * i + 1] = v;
    }

    let singular_values = a.svd(false, false).singular_values;
    let max_sv = singular_values.max();
    let min_sv = singular_values.min();
    let condition = if min_sv > 0.0 { max_sv / min_sv } else { f64::INFINITY };

    if !condition.is_finite() || condition > max_condition {
        return Err(GeometryError::Singular { condition });
    }

    let h = a.lu().solve(&b).ok_or(GeometryError::Singular { condition })?;

    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

    // Denormalize: H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(GeometryError::Singular { condition })?;
    let matrix = t_dst_inv * h_norm * t_src;

    let scale = matrix[(2, 2)];
    if scale.abs() < 1e-15 || !matrix.iter().all(|v| v.is_finite()) {
        return Err(GeometryError::Singular { condition });
    }

    Ok((matrix / scale, condition))
}

/// Translate the centroid to the origin and scale so the mean distance from
/// it is √2.
fn normalize_points(pts: &[[f64; 2]; 4]) -> (Matrix3<f64>, [[f64; 2]; 4]) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.map(|p| [s * (p[0] - cx), s * (p[1] - cy)]);

    (t, normalized)
}

fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Point {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return Point::new(f64::NAN, f64::NAN);
    }
    Point::new(p[0] / p[2], p[1] / p[2])
}

fn to_rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> GeometryLimits {
        GeometryLimits::default()
    }

    fn assert_close(a: Point, b: Point, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected {b:?}, got {a:?}"
        );
    }

    #[test]
    fn axis_aligned_rectangle_is_identity() {
        let quad = Quadrilateral::from_rect(0.0, 0.0, 100.0, 140.0);
        let t = compute_transform(&quad, &limits()).unwrap();
        assert_eq!((t.width(), t.height()), (100, 140));

        let m = t.matrix();
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        for r in 0..3 {
            for c in 0..3 {
                assert!((m[r][c] - identity[r][c]).abs() < 1e-9, "m = {m:?}");
            }
        }
    }

    #[test]
    fn target_size_uses_longer_edges() {
        let quad = Quadrilateral::from_tuples([
            (10.0, 10.0),
            (210.0, 20.0),
            (200.0, 310.0),
            (20.0, 300.0),
        ]);
        let [top, right, bottom, left] = quad.edge_lengths();
        let (w, h) = target_size(&quad);
        assert_eq!(w, top.max(bottom).round() as u32);
        assert_eq!(h, left.max(right).round() as u32);
    }

    #[test]
    fn skewed_quad_maps_corners_to_rectangle() {
        let quad = Quadrilateral::from_tuples([
            (52.0, 31.0),
            (410.5, 60.0),
            (380.0, 520.0),
            (20.0, 470.0),
        ]);
        let t = compute_transform(&quad, &limits()).unwrap();
        let (w, h) = (t.width() as f64, t.height() as f64);
        let expected = [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ];
        for (corner, target) in quad.corners.iter().zip(expected) {
            assert_close(t.apply(*corner), target, 1e-6);
            assert_close(t.apply_inverse(target), *corner, 1e-6);
        }
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (50.0, 0.0), (100.0, 0.0), (0.0, 100.0)]);
        let err = compute_transform(&quad, &limits()).unwrap_err();
        assert!(matches!(err, GeometryError::Degenerate { .. }), "{err:?}");
    }

    #[test]
    fn bowtie_is_degenerate() {
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (100.0, 0.0), (0.0, 140.0), (100.0, 140.0)]);
        let err = compute_transform(&quad, &limits()).unwrap_err();
        match err {
            GeometryError::Degenerate { reason } => assert!(reason.contains("convex")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn concave_quad_is_degenerate() {
        // Bottom-right corner pushed inwards past the diagonal.
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (100.0, 0.0), (30.0, 30.0), (0.0, 100.0)]);
        assert!(matches!(
            compute_transform(&quad, &limits()),
            Err(GeometryError::Degenerate { .. })
        ));
    }

    #[test]
    fn counter_clockwise_is_degenerate() {
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (0.0, 140.0), (100.0, 140.0), (100.0, 0.0)]);
        match compute_transform(&quad, &limits()).unwrap_err() {
            GeometryError::Degenerate { reason } => assert!(reason.contains("counter-clockwise")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_edge_is_degenerate() {
        let quad = Quadrilateral::from_rect(0.0, 0.0, 8.0, 100.0);
        match compute_transform(&quad, &limits()).unwrap_err() {
            GeometryError::Degenerate { reason } => assert!(reason.contains("top edge")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_finite_is_degenerate() {
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (f64::NAN, 0.0), (100.0, 100.0), (0.0, 100.0)]);
        assert!(matches!(
            compute_transform(&quad, &limits()),
            Err(GeometryError::Degenerate { .. })
        ));
    }

    #[test]
    fn tight_condition_limit_reports_singular() {
        let quad = Quadrilateral::from_tuples([
            (0.0, 0.0),
            (1000.0, 5.0),
            (990.0, 700.0),
            (3.0, 690.0),
        ]);
        let strict = GeometryLimits {
            max_condition_number: 1.0,
            ..GeometryLimits::default()
        };
        match compute_transform(&quad, &strict).unwrap_err() {
            GeometryError::Singular { condition } => assert!(condition > 1.0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn engine_uses_configured_limits() {
        let engine = GeometryEngine::new(GeometryLimits {
            min_edge_px: 200.0,
            ..GeometryLimits::default()
        });
        let quad = Quadrilateral::from_rect(0.0, 0.0, 100.0, 140.0);
        assert!(engine.compute_transform(&quad).is_err());
        assert!(GeometryEngine::default().compute_transform(&quad).is_ok());
    }
}
