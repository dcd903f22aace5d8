use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use vistrack_lie::SE3;
use vistrack_tracking::{
    Camera, CameraIntrinsics, Distortion, PinholeCamera, PoseEstimator, Resolution,
    ScriptedTracker, TrackedPoint, TrackerConfig,
};

fn camera() -> PinholeCamera {
    PinholeCamera::new(
        CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0).unwrap(),
        Distortion::none(),
        Resolution::new(640, 480).unwrap(),
    )
}

fn observe(cam: &PinholeCamera, pose: &SE3, scene: &[DVec3]) -> Vec<TrackedPoint> {
    scene
        .iter()
        .enumerate()
        .map(|(id, p)| {
            let px = cam.project(*p, pose).unwrap();
            TrackedPoint::new(id, px.x, px.y)
        })
        .collect()
}

fn bench_track_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_frame");

    for num_features in [16, 64, 256] {
        let side = (num_features as f64).sqrt() as usize;
        let scene: Vec<DVec3> = (0..num_features)
            .map(|i| {
                let x = (i % side) as f64 / side as f64 - 0.5;
                let y = (i / side) as f64 / side as f64 - 0.5;
                DVec3::new(3.0 * x, 2.0 * y, 5.0 + x * y)
            })
            .collect();

        let cam = camera();
        let mut estimator =
            PoseEstimator::new(camera(), ScriptedTracker::default(), TrackerConfig::default())
                .unwrap();
        estimator.reset();
        let start = observe(&cam, &SE3::IDENTITY, &scene);
        estimator.track_observations(&start).unwrap();
        for (id, p) in scene.iter().enumerate() {
            estimator.propose_point(id, *p).unwrap();
        }
        for _ in 0..estimator.config().validation_frames {
            estimator.track_observations(&start).unwrap();
        }

        let moved = SE3::from_rotation_vector(
            DVec3::new(0.01, -0.02, 0.005),
            DVec3::new(0.05, 0.02, -0.03),
        );
        let frames = [observe(&cam, &moved, &scene), start];

        group.bench_with_input(
            BenchmarkId::new("full_solve", num_features),
            &frames,
            |b, frames| {
                let mut i = 0;
                b.iter(|| {
                    i ^= 1;
                    black_box(estimator.track_observations(&frames[i]).unwrap())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_track_frame);
criterion_main!(benches);
