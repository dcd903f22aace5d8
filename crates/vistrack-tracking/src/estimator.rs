use std::collections::HashSet;

use glam::{DVec2, DVec3};
use vistrack_features::{CorrespondenceStore, FeatureId, ResidualVerdict, Status3DKind};
use vistrack_lie::{SE3, SO3};
use vistrack_optim::{OptimizationReport, OptimizationStatus, Optimizer, OptimizerError};

use crate::camera::Camera;
use crate::config::TrackerConfig;
use crate::detector::{FeatureTracker, TrackedPoint};
use crate::error::TrackingError;
use crate::pose::Pose;

/// Correspondences needed for a rotation-only solve, 4 measurements for 3 parameters.
const MIN_ROTATION_ONLY: usize = 2;

/// State of the tracking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// [`PoseEstimator::reset`] was never called.
    Uninitialized,
    /// Enough validated correspondences for a full 6-DOF solve.
    Tracking,
    /// Too few validated correspondences, only the rotation is refined.
    Degraded,
    /// No usable correspondence for longer than the grace period.
    Lost,
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrackingState::Uninitialized => "Uninitialized",
            TrackingState::Tracking => "Tracking",
            TrackingState::Degraded => "Degraded",
            TrackingState::Lost => "Lost",
        };
        f.write_str(name)
    }
}

/// Which pose parameters were refined in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Rotation and translation.
    Full,
    /// Rotation only, translation held at its last value.
    RotationOnly,
    /// No solve, the pose was held.
    Skipped,
}

/// Summary of one tracked frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    /// State after the frame.
    pub state: TrackingState,
    /// Pose parameters refined in this frame.
    pub mode: SolveMode,
    /// Solver termination, `None` when the solve was skipped.
    pub status: Option<OptimizationStatus>,
    /// Solver iterations used.
    pub iterations: usize,
    /// Set when the pose is a best effort: the solver did not converge or was skipped.
    pub low_confidence: bool,
    /// Root mean square reprojection error of the solve set in pixels.
    pub rms: Option<f64>,
    /// Features whose observations entered the solve, in ascending id order.
    pub solve_set: Vec<FeatureId>,
    /// Features promoted to `UseForPose` in this frame.
    pub validated: Vec<FeatureId>,
    /// Features turned into outliers in this frame.
    pub outliers: Vec<FeatureId>,
    /// Features removed after missing for longer than the grace period.
    pub purged: Vec<FeatureId>,
}

impl TrackOutcome {
    fn skipped(state: TrackingState) -> Self {
        Self {
            state,
            mode: SolveMode::Skipped,
            status: None,
            iterations: 0,
            low_confidence: true,
            rms: None,
            solve_set: Vec::new(),
            validated: Vec::new(),
            outliers: Vec::new(),
            purged: Vec::new(),
        }
    }
}

/// Frame-synchronous camera pose estimator.
///
/// Owns the detector, the camera model, the correspondence table and the pose of one tracking
/// session. Every call to [`PoseEstimator::track`] runs the whole per-frame pipeline:
///
/// 1. query the detector and update the correspondence table,
/// 2. refine the pose against the validated correspondences, warm started from the last pose,
/// 3. score every active correspondence against the new pose, validating consistent points and
///    rejecting persistent outliers,
/// 4. update the tracking state.
///
/// # Example
///
/// ```
/// use vistrack_tracking::{
///     PinholeCamera, PoseEstimator, Resolution, ScriptedTracker, TrackerConfig, TrackingState,
/// };
///
/// let camera = PinholeCamera::with_resolution(Resolution::new(640, 480).unwrap());
/// let mut estimator =
///     PoseEstimator::new(camera, ScriptedTracker::default(), TrackerConfig::default()).unwrap();
/// estimator.reset();
/// assert_eq!(estimator.state(), TrackingState::Tracking);
/// ```
pub struct PoseEstimator<C: Camera, T: FeatureTracker> {
    config: TrackerConfig,
    camera: C,
    tracker: T,
    store: CorrespondenceStore,
    optimizer: Optimizer,
    pose: Pose,
    state: TrackingState,
    frames_without_usable: u32,
    // scratch reused across frames
    seen: HashSet<FeatureId>,
    solve_points: Vec<DVec3>,
    measurements: Vec<f64>,
}

impl<C: Camera, T: FeatureTracker> PoseEstimator<C, T> {
    /// Create an estimator. Call [`PoseEstimator::reset`] before tracking.
    pub fn new(camera: C, tracker: T, config: TrackerConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        Ok(Self {
            store: CorrespondenceStore::new(config.correspondence.clone()),
            optimizer: Optimizer::new(config.solver.clone()),
            config,
            camera,
            tracker,
            pose: Pose::identity(),
            state: TrackingState::Uninitialized,
            frames_without_usable: 0,
            seen: HashSet::new(),
            solve_points: Vec::new(),
            measurements: Vec::new(),
        })
    }

    /// Start a new session: identity pose, empty correspondence table, detector reset.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.store.reset();
        self.pose = Pose::identity();
        self.frames_without_usable = 0;
        self.transition(TrackingState::Tracking);
    }

    /// Recover from a lost session while keeping the last pose.
    ///
    /// The detector and the correspondence table are reset, new scene points have to be proposed.
    pub fn reinitialize(&mut self) -> Result<(), TrackingError> {
        if self.state == TrackingState::Uninitialized {
            return Err(TrackingError::NotInitialized);
        }
        self.tracker.reset();
        self.store.reset();
        self.frames_without_usable = 0;
        self.transition(TrackingState::Tracking);
        Ok(())
    }

    /// Track one frame.
    pub fn track(&mut self, image: &T::Image) -> Result<TrackOutcome, TrackingError> {
        if self.state == TrackingState::Uninitialized {
            return Err(TrackingError::NotInitialized);
        }
        self.tracker.purge();
        let observations = self.tracker.track(image);
        self.track_observations(&observations)
    }

    /// Run the per-frame pipeline on detector output obtained by the caller.
    ///
    /// Malformed observations, including points that overflow once scaled by
    /// [`TrackerConfig::image_scale`], are rejected before any state is modified.
    pub fn track_observations(
        &mut self,
        observations: &[TrackedPoint],
    ) -> Result<TrackOutcome, TrackingError> {
        if self.state == TrackingState::Uninitialized {
            return Err(TrackingError::NotInitialized);
        }

        self.check_observations(observations)?;
        let purged = self.ingest(observations)?;

        if self.state == TrackingState::Lost {
            let mut outcome = TrackOutcome::skipped(TrackingState::Lost);
            outcome.purged = purged;
            return Ok(outcome);
        }

        if let Some(depth) = self.config.seed_depth {
            self.seed_points(depth)?;
        }

        let mut outcome = self.solve()?;
        outcome.purged = purged;
        self.score_correspondences(&mut outcome)?;
        self.update_state(&mut outcome);

        log::debug!(
            "frame: {:?} solve with {} features, {} validated, {} outliers, state {}",
            outcome.mode,
            outcome.solve_set.len(),
            outcome.validated.len(),
            outcome.outliers.len(),
            outcome.state
        );

        Ok(outcome)
    }

    /// Attach a candidate scene point to a tracked feature.
    pub fn propose_point(
        &mut self,
        id: FeatureId,
        point: DVec3,
    ) -> Result<Status3DKind, TrackingError> {
        Ok(self.store.propose_3d(id, point)?)
    }

    /// The current pose.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// The current tracking state.
    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// The correspondence table.
    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// The estimator configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The camera model.
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Mutable access to the camera model, e.g. to change its resolution.
    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// The feature detector.
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Mutable access to the feature detector.
    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    fn check_observations(&mut self, observations: &[TrackedPoint]) -> Result<(), TrackingError> {
        self.seen.clear();
        for obs in observations {
            if !self.seen.insert(obs.id) {
                return Err(TrackingError::DuplicateFeatureId(obs.id));
            }
            if !(obs.point * self.config.image_scale).is_finite() {
                return Err(TrackingError::NonFinitePoint(obs.id));
            }
        }
        Ok(())
    }

    fn ingest(&mut self, observations: &[TrackedPoint]) -> Result<Vec<FeatureId>, TrackingError> {
        let scale = self.config.image_scale;
        for obs in observations {
            self.store.observe(obs.id, obs.point * scale)?;
        }

        for id in self.store.tracked_ids() {
            if !self.seen.contains(&id) {
                self.store.lose(id)?;
            }
        }

        Ok(self.store.purge(&self.seen))
    }

    /// Propose points on the viewing ray of tracked features that have none.
    fn seed_points(&mut self, depth: f64) -> Result<(), TrackingError> {
        let camera_to_world = self.pose.se3().inverse();
        let pending: Vec<(FeatureId, DVec2)> = self
            .store
            .iter()
            .filter(|f| f.is_tracked() && f.status_3d().kind() == Status3DKind::None)
            .map(|f| (f.id(), f.point()))
            .collect();

        for (id, pixel) in pending {
            let point = camera_to_world.transform(self.camera.unproject(pixel) * depth);
            self.store.propose_3d(id, point)?;
            log::trace!("feature {} seeded at {:?}", id, point);
        }
        Ok(())
    }

    fn solve(&mut self) -> Result<TrackOutcome, TrackingError> {
        let seed = self.pose.se3();
        let mut outcome = TrackOutcome::skipped(self.state);

        self.solve_points.clear();
        self.measurements.clear();
        for (id, pixel, point) in self.store.correspondences(Status3DKind::UseForPose) {
            // a point behind the camera has no defined reprojection
            if self.camera.project(point, &seed).is_none() {
                continue;
            }
            outcome.solve_set.push(id);
            self.solve_points.push(point);
            self.measurements.extend_from_slice(&[pixel.x, pixel.y]);
        }

        let n = outcome.solve_set.len();
        outcome.mode = if n >= self.config.min_required {
            SolveMode::Full
        } else if n >= MIN_ROTATION_ONLY {
            SolveMode::RotationOnly
        } else {
            SolveMode::Skipped
        };

        if outcome.mode == SolveMode::Skipped {
            outcome.solve_set.clear();
            return Ok(outcome);
        }

        let (refined, report) = refine_pose(
            &mut self.optimizer,
            &self.camera,
            &self.solve_points,
            &self.measurements,
            seed,
            outcome.mode,
            self.config.step_size,
            self.config.max_iterations,
        )?;

        if report.residual_norm.is_finite() {
            self.pose.set(refined);
        }

        outcome.status = Some(report.status);
        outcome.iterations = report.iterations;
        outcome.rms = Some(report.residual_norm / (n as f64).sqrt());
        outcome.low_confidence = !report.status.is_converged();

        if outcome.low_confidence {
            log::warn!(
                "pose accepted with low confidence: {:?} after {} iterations, residual {:e}",
                report.status,
                report.iterations,
                report.residual_norm
            );
        }

        Ok(outcome)
    }

    /// Penalize every active correspondence against the current pose and validate stable ones.
    fn score_correspondences(&mut self, outcome: &mut TrackOutcome) -> Result<(), TrackingError> {
        let pose = self.pose.se3();

        let mut active: Vec<_> = self
            .store
            .correspondences(Status3DKind::UseForPose)
            .into_iter()
            .map(|c| (c, false))
            .chain(
                self.store
                    .correspondences(Status3DKind::Initial)
                    .into_iter()
                    .map(|c| (c, true)),
            )
            .collect();
        active.sort_unstable_by_key(|((id, _, _), _)| *id);

        for ((id, pixel, point), initial) in active {
            let residual = self
                .camera
                .project(point, &pose)
                .map_or(f64::INFINITY, |p| p.distance(pixel));

            match self.store.penalize_residual(id, residual)? {
                ResidualVerdict::BecameOutlier => outcome.outliers.push(id),
                ResidualVerdict::Accepted { streak }
                    if initial && streak >= self.config.validation_frames =>
                {
                    self.store.validate(id)?;
                    outcome.validated.push(id);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn update_state(&mut self, outcome: &mut TrackOutcome) {
        if self.store.count_usable() == 0 {
            self.frames_without_usable = self.frames_without_usable.saturating_add(1);
        } else {
            self.frames_without_usable = 0;
        }

        let next = if self.frames_without_usable > self.config.lost_grace_frames {
            TrackingState::Lost
        } else if self.count_in_view() >= self.config.min_required {
            TrackingState::Tracking
        } else {
            TrackingState::Degraded
        };

        self.transition(next);
        outcome.state = self.state;
    }

    /// Validated correspondences that project at the current pose.
    fn count_in_view(&self) -> usize {
        let pose = self.pose.se3();
        self.store
            .correspondences(Status3DKind::UseForPose)
            .into_iter()
            .filter(|(_, _, point)| self.camera.project(*point, &pose).is_some())
            .count()
    }

    fn transition(&mut self, next: TrackingState) {
        if self.state != next {
            log::info!("tracking state {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Refine `seed` so the projected `points` match `measurements`.
///
/// Parameters are a left rotation increment starting at zero, followed by the absolute
/// translation in full mode.
#[allow(clippy::too_many_arguments)]
fn refine_pose<C: Camera>(
    optimizer: &mut Optimizer,
    camera: &C,
    points: &[DVec3],
    measurements: &[f64],
    seed: SE3,
    mode: SolveMode,
    step_size: f64,
    max_iterations: usize,
) -> Result<(SE3, OptimizationReport), OptimizerError> {
    let r0: SO3 = seed.r;
    let t0 = seed.t;

    let candidate = move |p: &[f64]| {
        let r = SO3::exp(DVec3::new(p[0], p[1], p[2])) * r0;
        let t = if p.len() == 6 {
            DVec3::new(p[3], p[4], p[5])
        } else {
            t0
        };
        SE3::new(r, t)
    };

    let mut params = [0.0, 0.0, 0.0, t0.x, t0.y, t0.z];
    let num_params = if mode == SolveMode::Full { 6 } else { 3 };

    let mut model = |p: &[f64], predictions: &mut [f64]| {
        let pose = candidate(p);
        for (point, out) in points.iter().zip(predictions.chunks_exact_mut(2)) {
            let projected = camera
                .project(*point, &pose)
                .unwrap_or(DVec2::splat(f64::NAN));
            out[0] = projected.x;
            out[1] = projected.y;
        }
    };

    let params = &mut params[..num_params];
    let report = optimizer.optimize(params, measurements, step_size, max_iterations, &mut model)?;
    Ok((candidate(&*params), report))
}
