//! Collaborators of the comet state manager.
//!
//! Persistence, authentication and photo storage live outside this crate; these traits
//! describe what the manager needs from them. Every method returns a `Send` future so a
//! manager can be driven from a multi-threaded runtime.
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::comet_errors::CometError;
use crate::comet_state::comet::{Comet, NewComet};
use crate::constants::{CometId, ObservationId, UserId};
use crate::observations::{NewObservation, Observation};

/// Keyed persistence of [`Comet`] records.
///
/// Soft-deleted comets are invisible to every read.
pub trait CometRepository: Send + Sync {
    fn create(&self, comet: NewComet) -> impl Future<Output = Result<Comet, CometError>> + Send;

    /// `Err(CometError::NotFound)` when absent or soft-deleted.
    fn load(&self, id: CometId) -> impl Future<Output = Result<Comet, CometError>> + Send;

    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Comet>, CometError>> + Send;

    /// Replace the stored record in one write: either every field lands or none does.
    fn save(&self, comet: &Comet) -> impl Future<Output = Result<(), CometError>> + Send;

    fn soft_delete(
        &self,
        id: CometId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), CometError>> + Send;
}

/// Keyed persistence of [`Observation`] records.
pub trait ObservationStore: Send + Sync {
    fn create(
        &self,
        user_id: UserId,
        observation: NewObservation,
    ) -> impl Future<Output = Result<Observation, CometError>> + Send;

    /// `Err(CometError::NotFound)` when absent.
    fn get(&self, id: ObservationId)
        -> impl Future<Output = Result<Observation, CometError>> + Send;

    /// Observations of `user_id` attached to `comet_id`, ascending observation time.
    fn list_for_comet(
        &self,
        comet_id: CometId,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Observation>, CometError>> + Send;

    /// Every observation recorded by `user_id`, attached or not, ascending observation time.
    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Observation>, CometError>> + Send;

    fn update(
        &self,
        observation: &Observation,
    ) -> impl Future<Output = Result<(), CometError>> + Send;

    fn delete(&self, id: ObservationId) -> impl Future<Output = Result<(), CometError>> + Send;
}

/// Token verification service.
pub trait AuthVerifier: Send + Sync {
    /// `(valid, user)`; the user id is meaningless when `valid` is false.
    fn verify_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(bool, UserId), CometError>> + Send;
}

/// Object storage for comet photos.
pub trait PhotoStorage: Send + Sync {
    /// Store the bytes and return the public URL of the photo.
    fn upload_photo(
        &self,
        user_id: UserId,
        data: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<String, CometError>> + Send;

    fn delete_photo(&self, url: &str) -> impl Future<Output = Result<(), CometError>> + Send;
}
