use cgmath::{vec3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::sampler::sample_trajectory;

/// External rendering surface for the aim preview. The renderer draws an
/// ordered point sequence as a poly-line; this crate only feeds it points.
pub trait PolylineSink {
    fn set_points(&mut self, points: &[Point3<f32>]);
    fn clear(&mut self);
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PreviewConfig {
    pub sample_count: usize,
    pub time_step: f32,
    pub gravity: Vector3<f32>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            sample_count: 30,
            time_step: 0.05,
            gravity: vec3(0.0, -9.81, 0.0),
        }
    }
}

/// Samples the launch arc for the current tick's aim. Must be fed the same
/// aim direction that is rendered this tick; sampling a stale aim produces
/// visible jitter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrajectoryPreview {
    config: PreviewConfig,
}

impl TrajectoryPreview {
    pub fn new(config: PreviewConfig) -> TrajectoryPreview {
        TrajectoryPreview { config }
    }

    pub fn sample(&self, start: Point3<f32>, velocity: Vector3<f32>) -> Vec<Point3<f32>> {
        sample_trajectory(
            start,
            velocity,
            self.config.gravity,
            self.config.sample_count,
            self.config.time_step,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::point3;

    #[derive(Default)]
    struct RecordingSink {
        points: Vec<Point3<f32>>,
        cleared: usize,
    }

    impl PolylineSink for RecordingSink {
        fn set_points(&mut self, points: &[Point3<f32>]) {
            self.points = points.to_vec();
        }

        fn clear(&mut self) {
            self.points.clear();
            self.cleared += 1;
        }
    }

    #[test]
    fn test_preview_samples_configured_count() {
        let preview = TrajectoryPreview::new(PreviewConfig {
            sample_count: 12,
            ..PreviewConfig::default()
        });

        let points = preview.sample(point3(0.0, 1.0, 0.0), vec3(0.0, 0.0, 15.0));
        assert_eq!(points.len(), 12);
        assert_eq!(points[0], point3(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_sink_receives_points_and_clears() {
        let preview = TrajectoryPreview::default();
        let mut sink = RecordingSink::default();

        let points = preview.sample(point3(0.0, 0.0, 0.0), vec3(0.0, 5.0, 5.0));
        sink.set_points(&points);
        assert_eq!(sink.points.len(), points.len());

        sink.clear();
        assert!(sink.points.is_empty());
        assert_eq!(sink.cleared, 1);
    }
}
