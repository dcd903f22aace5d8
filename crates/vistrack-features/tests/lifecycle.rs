use std::collections::HashSet;

use glam::{DVec2, DVec3};
use vistrack_features::{
    CorrespondenceConfig, CorrespondenceError, CorrespondenceStore, FeatureId, ResidualVerdict,
    Status2D, Status3DKind,
};

fn session() -> CorrespondenceStore {
    CorrespondenceStore::new(
        CorrespondenceConfig::default()
            .with_residual_threshold(3.0)
            .with_outlier_limit(20)
            .with_purge_grace_frames(5),
    )
}

fn frame(store: &mut CorrespondenceStore, ids: &[FeatureId]) -> Vec<FeatureId> {
    let active: HashSet<FeatureId> = ids.iter().copied().collect();
    for &id in ids {
        store.observe(id, DVec2::new(id as f64, 0.0)).unwrap();
    }
    let known: Vec<FeatureId> = store.iter().map(|f| f.id()).collect();
    for id in known {
        if !active.contains(&id) {
            store.lose(id).unwrap();
        }
    }
    store.purge(&active)
}

#[test]
fn outlier_after_twenty_bad_frames() {
    let mut store = session();
    for id in 0..5 {
        store.observe(id, DVec2::ZERO).unwrap();
        store.propose_3d(id, DVec3::new(id as f64, 0.0, 4.0)).unwrap();
        store.validate(id).unwrap();
    }

    for frame in 0..20 {
        for id in 0..5 {
            let residual = if id == 2 { 10.0 } else { 0.5 };
            let verdict = store.penalize_residual(id, residual).unwrap();
            if id == 2 && frame < 19 {
                assert_eq!(verdict, ResidualVerdict::Penalized { count: frame + 1 });
            }
        }
    }

    assert_eq!(store.get(2).unwrap().status_3d().kind(), Status3DKind::Outlier);
    let ids: Vec<_> = store
        .correspondences(Status3DKind::UseForPose)
        .into_iter()
        .map(|(id, _, _)| id)
        .collect();
    assert_eq!(ids, vec![0, 1, 3, 4]);
}

#[test]
fn pose_status_requires_initial() {
    let mut store = session();
    store.observe(9, DVec2::ZERO).unwrap();

    let err = store.validate(9).unwrap_err();
    assert!(matches!(
        err,
        CorrespondenceError::InvalidTransition {
            from: Status3DKind::None,
            ..
        }
    ));
    assert_eq!(store.count_use_for_pose(), 0);
}

#[test]
fn lost_feature_revalidates_after_reappearing() {
    let mut store = session();
    frame(&mut store, &[1, 2]);
    store.propose_3d(1, DVec3::Z).unwrap();
    store.validate(1).unwrap();

    frame(&mut store, &[2]);
    let feature = store.get(1).unwrap();
    assert_eq!(feature.status_2d(), Status2D::NotTracked);
    assert_eq!(feature.status_3d().kind(), Status3DKind::Initial);
    assert!(store.validate(1).is_err());

    frame(&mut store, &[1, 2]);
    store.validate(1).unwrap();
    assert_eq!(store.count_use_for_pose(), 1);
}

#[test]
fn missing_features_are_purged_after_grace() {
    let mut store = session();
    frame(&mut store, &[1, 2, 3]);

    for _ in 0..5 {
        assert!(frame(&mut store, &[1]).is_empty());
    }
    assert_eq!(frame(&mut store, &[1]), vec![2, 3]);
    assert_eq!(store.len(), 1);

    // purged ids come back as fresh features
    frame(&mut store, &[2]);
    assert_eq!(store.get(2).unwrap().status_3d().kind(), Status3DKind::None);
}

#[test]
fn outlier_recovers_after_new_proposal() {
    let mut store = CorrespondenceStore::new(CorrespondenceConfig::default().with_outlier_limit(2));
    store.observe(1, DVec2::ZERO).unwrap();
    store.propose_3d(1, DVec3::Z).unwrap();
    store.penalize_residual(1, 100.0).unwrap();
    assert_eq!(
        store.penalize_residual(1, 100.0).unwrap(),
        ResidualVerdict::BecameOutlier
    );
    assert_eq!(store.count_usable(), 0);

    assert_eq!(
        store.propose_3d(1, DVec3::new(0.0, 0.0, 2.0)).unwrap(),
        Status3DKind::Initial
    );
    let feature = store.get(1).unwrap();
    assert_eq!(feature.bad_residual_count(), 0);
    assert_eq!(feature.point_3d(), Some(DVec3::new(0.0, 0.0, 2.0)));
    assert_eq!(store.count_usable(), 1);
}

#[test]
fn reset_returns_to_empty_session() {
    let mut store = session();
    frame(&mut store, &[1, 2, 3]);
    store.propose_3d(1, DVec3::Z).unwrap();
    store.reset();
    assert!(store.is_empty());
    assert_eq!(store.count_usable(), 0);
    assert!(store.get(1).is_none());
}
