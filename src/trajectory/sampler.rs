use cgmath::{Point3, Vector3};

/// Sample a parabolic trajectory with the kinematic equation
/// `p(t) = p0 + v0*t + 0.5*g*t^2`.
///
/// Produces `count` points at `time_step` intervals starting at t=0, so the
/// first point is always `start`. Deterministic and pure; no air resistance,
/// no collision testing.
pub fn sample_trajectory(
    start: Point3<f32>,
    velocity: Vector3<f32>,
    gravity: Vector3<f32>,
    count: usize,
    time_step: f32,
) -> Vec<Point3<f32>> {
    let mut points = Vec::with_capacity(count);

    for i in 0..count {
        let t = i as f32 * time_step;
        points.push(start + velocity * t + gravity * (0.5 * t * t));
    }

    points
}
