//! # Comet state manager
//!
//! Orchestrates the per-comet pipeline on top of the persistence collaborators:
//!
//! ```text
//!   NoOrbit ──fit──▶ OrbitFresh ──approach──▶ OrbitFreshApproachFresh
//!                        ▲   │                          │
//!                        fit └──── observation change ──┴──▶ OrbitStaleApproachNone
//! ```
//!
//! Every operation first loads the comet (soft-deleted comets read as
//! [`CometError::NotFound`]), then checks that the acting user owns it
//! ([`CometError::Unauthorized`]). State changes are applied to a local copy and
//! persisted with a single [`CometRepository::save`]; when the save fails nothing
//! changes in the store.
//!
//! Observation changes invalidate the comet **before** the observation is written, so a
//! crash between the two writes can leave results marked stale without cause. If the
//! invalidation cannot be written, the observation change is not attempted.
//!
//! There is no per-comet lock, which leaves two known races:
//!
//! - two concurrent fits of the same comet both run, and the repository keeps whichever
//!   save lands last;
//! - a fit that has already read the observations can save after a concurrent
//!   observation change invalidated the comet. The saved elements are then marked fresh
//!   although they were computed from the previous observation set; the next fit or
//!   observation change corrects the state.
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::close_approach::{CloseApproach, CloseApproachProjector, KeplerCloseApproachProjector};
use crate::comet_errors::CometError;
use crate::comet_state::comet::{Comet, CometOrbitState, NewComet};
use crate::comet_state::config::ServiceConfig;
use crate::comet_state::store::{AuthVerifier, CometRepository, ObservationStore, PhotoStorage};
use crate::constants::{CometId, ObservationId, UserId};
use crate::observations::{AngularPosition, NewObservation, Observation};
use crate::orbit_solver::{GaussOrbitSolver, OrbitSolver};
use crate::trajectory::{KeplerTrajectorySampler, Trajectory, TrajectorySampler};

/// A photo sent along with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// New values for an existing observation. The comet it is attached to cannot change.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationUpdate {
    pub position: AngularPosition,
    pub observed_at: DateTime<Utc>,
}

pub struct CometStateManager<C, O, A, P> {
    comets: C,
    observations: O,
    auth: A,
    photos: P,
    solver: Box<dyn OrbitSolver>,
    projector: Box<dyn CloseApproachProjector>,
    sampler: Box<dyn TrajectorySampler>,
    store_timeout: Duration,
}

impl<C, O, A, P> CometStateManager<C, O, A, P>
where
    C: CometRepository,
    O: ObservationStore,
    A: AuthVerifier,
    P: PhotoStorage,
{
    /// Manager with the Gauss solver and the Kepler projector and sampler configured
    /// from `config`.
    pub fn new(
        config: ServiceConfig,
        comets: C,
        observations: O,
        auth: A,
        photos: P,
    ) -> Result<Self, CometError> {
        config.validate()?;
        Ok(CometStateManager {
            comets,
            observations,
            auth,
            photos,
            solver: Box::new(GaussOrbitSolver::new(config.iod)),
            projector: Box::new(KeplerCloseApproachProjector::new(config.approach)),
            sampler: Box::new(KeplerTrajectorySampler::new(config.trajectory)),
            store_timeout: config.store_timeout,
        })
    }

    pub fn with_solver(mut self, solver: impl OrbitSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    pub fn with_projector(mut self, projector: impl CloseApproachProjector + 'static) -> Self {
        self.projector = Box::new(projector);
        self
    }

    pub fn with_sampler(mut self, sampler: impl TrajectorySampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Run one collaborator call under the configured deadline.
    async fn deadline<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, CometError>>,
    ) -> Result<T, CometError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| CometError::StorageTimeout(operation.to_string()))?
    }

    async fn owned_comet(&self, comet_id: CometId, user_id: UserId) -> Result<Comet, CometError> {
        let comet = self.deadline("load comet", self.comets.load(comet_id)).await?;
        comet.check_owner(user_id)?;
        Ok(comet)
    }

    async fn owned_observation(
        &self,
        id: ObservationId,
        user_id: UserId,
    ) -> Result<Observation, CometError> {
        let observation = self
            .deadline("load observation", self.observations.get(id))
            .await?;
        if observation.user_id != user_id {
            return Err(CometError::Unauthorized);
        }
        Ok(observation)
    }

    /// Resolve a bearer token to the acting user.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, CometError> {
        let (valid, user_id) = self
            .deadline("verify token", self.auth.verify_token(token))
            .await?;
        if valid {
            Ok(user_id)
        } else {
            Err(CometError::Unauthorized)
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Orbit pipeline
    // ---------------------------------------------------------------------------------------------

    /// Fit an orbit to the comet's observations and store it as fresh.
    ///
    /// Any stored close approach is dropped by the same write.
    #[instrument(level = "info", skip(self))]
    pub async fn request_orbit_fit(
        &self,
        user_id: UserId,
        comet_id: CometId,
    ) -> Result<Comet, CometError> {
        let mut comet = self.owned_comet(comet_id, user_id).await?;
        let observations = self
            .deadline(
                "list observations",
                self.observations.list_for_comet(comet_id, user_id),
            )
            .await?;

        let elements = self.solver.fit(&observations)?;

        comet.apply_fit(elements, Utc::now());
        self.deadline("save comet", self.comets.save(&comet)).await?;

        info!(
            observations = observations.len(),
            a = comet.elements.as_ref().map(|e| e.semi_major_axis),
            e = comet.elements.as_ref().map(|e| e.eccentricity),
            "orbit stored"
        );
        Ok(comet)
    }

    /// Project the fresh orbit to its close approach with the Earth and store it.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::OrbitNotCalculated)` unless the comet's orbit is fresh.
    #[instrument(level = "info", skip(self))]
    pub async fn request_close_approach(
        &self,
        user_id: UserId,
        comet_id: CometId,
    ) -> Result<CloseApproach, CometError> {
        let mut comet = self.owned_comet(comet_id, user_id).await?;
        let approach = self.projector.project(comet.fresh_elements()?, None)?;

        comet.apply_approach(approach.clone(), Utc::now())?;
        self.deadline("save comet", self.comets.save(&comet)).await?;

        info!(date = %approach.date, distance_au = approach.distance_au, "close approach stored");
        Ok(approach)
    }

    /// Comet and Earth positions over `[start, end]` from the fresh orbit. Nothing is stored.
    #[instrument(level = "debug", skip(self))]
    pub async fn sample_trajectory(
        &self,
        user_id: UserId,
        comet_id: CometId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        num_points: usize,
    ) -> Result<Trajectory, CometError> {
        let comet = self.owned_comet(comet_id, user_id).await?;
        self.sampler
            .sample(comet.fresh_elements()?, start, end, num_points)
    }

    /// Mark the comet's results stale after one of its observations changed.
    ///
    /// Writes only when something was fresh; returns the resulting state.
    #[instrument(level = "info", skip(self))]
    pub async fn on_observation_mutated(
        &self,
        user_id: UserId,
        comet_id: CometId,
    ) -> Result<CometOrbitState, CometError> {
        let mut comet = self.owned_comet(comet_id, user_id).await?;
        if comet.invalidate() {
            self.deadline("save comet", self.comets.save(&comet)).await?;
            info!(state = %comet.state(), "comet results invalidated");
        }
        Ok(comet.state())
    }

    /// Invalidation ahead of a change to an observation already attached to `comet_id`.
    ///
    /// A comet that no longer exists has nothing to invalidate.
    async fn invalidate_before_mutation(
        &self,
        user_id: UserId,
        comet_id: Option<CometId>,
    ) -> Result<(), CometError> {
        let Some(comet_id) = comet_id else {
            return Ok(());
        };
        match self.on_observation_mutated(user_id, comet_id).await {
            Ok(_) | Err(CometError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Comets
    // ---------------------------------------------------------------------------------------------

    #[instrument(level = "info", skip(self, photo), fields(photo = photo.is_some()))]
    pub async fn create_comet(
        &self,
        user_id: UserId,
        name: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<Comet, CometError> {
        let mut new_comet = NewComet::new(user_id, name, None)?;

        if let Some(photo) = photo.filter(|p| !p.data.is_empty()) {
            let url = self
                .deadline(
                    "upload photo",
                    self.photos.upload_photo(user_id, photo.data, &photo.file_name),
                )
                .await?;
            new_comet.photo_url = Some(url);
        }

        let comet = self
            .deadline("create comet", self.comets.create(new_comet))
            .await?;
        info!(comet_id = comet.id, "comet created");
        Ok(comet)
    }

    pub async fn get_comet(&self, user_id: UserId, comet_id: CometId) -> Result<Comet, CometError> {
        self.owned_comet(comet_id, user_id).await
    }

    pub async fn list_comets(&self, user_id: UserId) -> Result<Vec<Comet>, CometError> {
        self.deadline("list comets", self.comets.list_for_user(user_id))
            .await
    }

    /// Soft-delete the comet. A photo that cannot be removed is logged and left behind.
    #[instrument(level = "info", skip(self))]
    pub async fn delete_comet(&self, user_id: UserId, comet_id: CometId) -> Result<(), CometError> {
        let comet = self.owned_comet(comet_id, user_id).await?;

        if let Some(url) = &comet.photo_url {
            if let Err(err) = self
                .deadline("delete photo", self.photos.delete_photo(url))
                .await
            {
                warn!(comet_id, %err, "failed to delete comet photo");
            }
        }

        self.deadline("delete comet", self.comets.soft_delete(comet_id, Utc::now()))
            .await?;
        info!(comet_id, "comet deleted");
        Ok(())
    }

    /// Replace the comet's photo. The previous photo is removed on a best-effort basis.
    #[instrument(level = "info", skip(self, photo))]
    pub async fn upload_comet_photo(
        &self,
        user_id: UserId,
        comet_id: CometId,
        photo: PhotoUpload,
    ) -> Result<Comet, CometError> {
        let mut comet = self.owned_comet(comet_id, user_id).await?;
        let url = self
            .deadline(
                "upload photo",
                self.photos.upload_photo(user_id, photo.data, &photo.file_name),
            )
            .await?;

        let previous = comet.photo_url.replace(url);
        self.deadline("save comet", self.comets.save(&comet)).await?;

        if let Some(previous) = previous {
            if let Err(err) = self
                .deadline("delete photo", self.photos.delete_photo(&previous))
                .await
            {
                warn!(comet_id, %err, "failed to delete replaced comet photo");
            }
        }
        Ok(comet)
    }

    // ---------------------------------------------------------------------------------------------
    // Observations
    // ---------------------------------------------------------------------------------------------

    /// Record an observation, attached to one of the user's comets or free-standing.
    #[instrument(level = "info", skip(self, observation), fields(comet_id = ?observation.comet_id))]
    pub async fn create_observation(
        &self,
        user_id: UserId,
        observation: NewObservation,
    ) -> Result<Observation, CometError> {
        observation.validate()?;
        if let Some(comet_id) = observation.comet_id {
            self.on_observation_mutated(user_id, comet_id).await?;
        }
        self.deadline(
            "create observation",
            self.observations.create(user_id, observation),
        )
        .await
    }

    pub async fn get_observation(
        &self,
        user_id: UserId,
        id: ObservationId,
    ) -> Result<Observation, CometError> {
        self.owned_observation(id, user_id).await
    }

    /// The user's observations attached to live comets, ascending time.
    pub async fn list_observations(&self, user_id: UserId) -> Result<Vec<Observation>, CometError> {
        let live: Vec<CometId> = self
            .list_comets(user_id)
            .await?
            .iter()
            .map(|comet| comet.id)
            .collect();
        let observations = self
            .deadline(
                "list observations",
                self.observations.list_for_user(user_id),
            )
            .await?;
        Ok(observations
            .into_iter()
            .filter(|obs| obs.comet_id.is_some_and(|id| live.contains(&id)))
            .collect())
    }

    pub async fn list_comet_observations(
        &self,
        user_id: UserId,
        comet_id: CometId,
    ) -> Result<Vec<Observation>, CometError> {
        self.owned_comet(comet_id, user_id).await?;
        self.deadline(
            "list observations",
            self.observations.list_for_comet(comet_id, user_id),
        )
        .await
    }

    #[instrument(level = "info", skip(self, update))]
    pub async fn update_observation(
        &self,
        user_id: UserId,
        id: ObservationId,
        update: ObservationUpdate,
    ) -> Result<Observation, CometError> {
        let mut observation = self.owned_observation(id, user_id).await?;
        update.position.validate()?;

        self.invalidate_before_mutation(user_id, observation.comet_id)
            .await?;

        observation.position = update.position;
        observation.observed_at = update.observed_at;
        self.deadline("update observation", self.observations.update(&observation))
            .await?;
        Ok(observation)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn delete_observation(
        &self,
        user_id: UserId,
        id: ObservationId,
    ) -> Result<(), CometError> {
        let observation = self.owned_observation(id, user_id).await?;
        self.invalidate_before_mutation(user_id, observation.comet_id)
            .await?;
        self.deadline("delete observation", self.observations.delete(id))
            .await
    }
}
