use cgmath::{vec3, InnerSpace, Point3, Vector3};

/// Geometry that won't produce a useful projection or traversal; callers fall
/// back to the start point instead of failing.
const DEGENERATE_EPSILON: f32 = 1e-6;

/// Returns the closest point on segment AB to point P.
///
/// The scalar projection of (P - A) onto (B - A), normalized by the squared
/// segment length, is clamped to [0, 1]. A zero-length segment returns A.
pub fn closest_point_on_segment(
    a: Point3<f32>,
    b: Point3<f32>,
    p: Point3<f32>,
) -> Point3<f32> {
    let ab = b - a;
    let ab2 = ab.dot(ab);
    if ab2 <= DEGENERATE_EPSILON {
        return a;
    }

    let t = ((p - a).dot(ab) / ab2).clamp(0.0, 1.0);
    a + ab * t
}

/// A sample of a curve at some normalized parameter: where the curve is and
/// which way it faces there.
#[derive(Clone, Copy, Debug)]
pub struct CurveSample {
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
}

/// An ordered, immutable sequence of control points evaluated by a normalized
/// parameter t in [0, 1]. Interpolation is piecewise linear by arc length, so
/// equal parameter steps cover equal distances regardless of how control
/// points are spaced.
#[derive(Clone, Debug)]
pub struct PathCurve {
    points: Vec<Point3<f32>>,
    cumulative: Vec<f32>,
    length: f32,
}

impl PathCurve {
    pub fn new(points: Vec<Point3<f32>>) -> PathCurve {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut length = 0.0;

        for (i, point) in points.iter().enumerate() {
            if i > 0 {
                length += (point - points[i - 1]).magnitude();
            }
            cumulative.push(length);
        }

        PathCurve {
            points,
            cumulative,
            length,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    /// True if the curve cannot be traversed (fewer than two distinct points).
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2 || self.length <= DEGENERATE_EPSILON
    }

    /// Evaluate position, forward, and up at t in [0, 1] (clamped).
    ///
    /// A degenerate curve evaluates to its first point with default axes.
    pub fn evaluate(&self, t: f32) -> CurveSample {
        if self.is_degenerate() {
            return CurveSample {
                position: self.points.first().copied().unwrap_or(Point3::new(0.0, 0.0, 0.0)),
                forward: vec3(0.0, 0.0, 1.0),
                up: vec3(0.0, 1.0, 0.0),
            };
        }

        let target = t.clamp(0.0, 1.0) * self.length;

        // Find the segment containing the target arc length.
        let mut segment = self.points.len() - 2;
        for i in 0..self.points.len() - 1 {
            if target <= self.cumulative[i + 1] {
                segment = i;
                break;
            }
        }

        let seg_start = self.cumulative[segment];
        let seg_len = self.cumulative[segment + 1] - seg_start;
        let a = self.points[segment];
        let b = self.points[segment + 1];

        let local = if seg_len <= DEGENERATE_EPSILON {
            0.0
        } else {
            (target - seg_start) / seg_len
        };

        let forward = self.segment_forward(segment);

        CurveSample {
            position: a + (b - a) * local,
            forward,
            up: up_for_forward(forward),
        }
    }

    /// Direction of the given segment; skips ahead over zero-length segments.
    fn segment_forward(&self, segment: usize) -> Vector3<f32> {
        for i in segment..self.points.len() - 1 {
            let dir = self.points[i + 1] - self.points[i];
            if dir.magnitude2() > DEGENERATE_EPSILON {
                return dir.normalize();
            }
        }
        vec3(0.0, 0.0, 1.0)
    }
}

/// World up re-orthogonalized against the forward direction. Falls back to +Z
/// when the curve runs vertically.
fn up_for_forward(forward: Vector3<f32>) -> Vector3<f32> {
    let world_up = vec3(0.0, 1.0, 0.0);
    let up = world_up - forward * world_up.dot(forward);
    if up.magnitude2() > DEGENERATE_EPSILON {
        up.normalize()
    } else {
        vec3(0.0, 0.0, 1.0)
    }
}
