//! In-memory collaborators, for tests and embedding.
//!
//! [`InMemoryStore`] can simulate a failing or slow backend so that the manager's
//! no-partial-commit and deadline behaviour can be exercised.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::comet_errors::CometError;
use crate::comet_state::comet::{Comet, NewComet};
use crate::comet_state::store::{AuthVerifier, CometRepository, ObservationStore, PhotoStorage};
use crate::constants::{CometId, ObservationId, UserId};
use crate::observations::{NewObservation, Observation};

#[derive(Debug, Default)]
struct Tables {
    comets: BTreeMap<CometId, Comet>,
    observations: BTreeMap<ObservationId, Observation>,
    next_comet_id: CometId,
    next_observation_id: ObservationId,
}

#[derive(Debug, Default)]
struct Faults {
    fail_writes: AtomicBool,
    latency_ms: AtomicUsize,
    saves: AtomicUsize,
}

/// Comet and observation tables behind one async lock.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`CometError::Storage`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    /// Number of successful [`CometRepository::save`] calls so far.
    pub fn save_count(&self) -> usize {
        self.faults.saves.load(Ordering::SeqCst)
    }

    /// Stored comet including soft-deleted ones.
    pub async fn raw_comet(&self, id: CometId) -> Option<Comet> {
        self.tables.read().await.comets.get(&id).cloned()
    }

    async fn delay(&self) {
        let ms = self.faults.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
    }

    async fn check_write(&self) -> Result<(), CometError> {
        self.delay().await;
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(CometError::Storage("write rejected by backend".into()));
        }
        Ok(())
    }
}

fn sorted_by_time(mut observations: Vec<Observation>) -> Vec<Observation> {
    observations.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.id.cmp(&b.id)));
    observations
}

impl CometRepository for InMemoryStore {
    async fn create(&self, comet: NewComet) -> Result<Comet, CometError> {
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        tables.next_comet_id += 1;
        let comet = comet.into_comet(tables.next_comet_id);
        tables.comets.insert(comet.id, comet.clone());
        Ok(comet)
    }

    async fn load(&self, id: CometId) -> Result<Comet, CometError> {
        self.delay().await;
        self.tables
            .read()
            .await
            .comets
            .get(&id)
            .filter(|comet| !comet.is_deleted())
            .cloned()
            .ok_or_else(|| CometError::comet_not_found(id))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Comet>, CometError> {
        self.delay().await;
        Ok(self
            .tables
            .read()
            .await
            .comets
            .values()
            .filter(|comet| comet.user_id == user_id && !comet.is_deleted())
            .cloned()
            .collect())
    }

    async fn save(&self, comet: &Comet) -> Result<(), CometError> {
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        match tables.comets.get_mut(&comet.id) {
            Some(stored) if !stored.is_deleted() => {
                *stored = comet.clone();
                self.faults.saves.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(CometError::comet_not_found(comet.id)),
        }
    }

    async fn soft_delete(&self, id: CometId, at: DateTime<Utc>) -> Result<(), CometError> {
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        match tables.comets.get_mut(&id) {
            Some(stored) if !stored.is_deleted() => {
                stored.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(CometError::comet_not_found(id)),
        }
    }
}

impl ObservationStore for InMemoryStore {
    async fn create(
        &self,
        user_id: UserId,
        observation: NewObservation,
    ) -> Result<Observation, CometError> {
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        tables.next_observation_id += 1;
        let observation = observation.into_observation(tables.next_observation_id, user_id);
        tables
            .observations
            .insert(observation.id, observation.clone());
        Ok(observation)
    }

    async fn get(&self, id: ObservationId) -> Result<Observation, CometError> {
        self.delay().await;
        self.tables
            .read()
            .await
            .observations
            .get(&id)
            .cloned()
            .ok_or_else(|| CometError::observation_not_found(id))
    }

    async fn list_for_comet(
        &self,
        comet_id: CometId,
        user_id: UserId,
    ) -> Result<Vec<Observation>, CometError> {
        self.delay().await;
        let tables = self.tables.read().await;
        Ok(sorted_by_time(
            tables
                .observations
                .values()
                .filter(|obs| obs.comet_id == Some(comet_id) && obs.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Observation>, CometError> {
        self.delay().await;
        let tables = self.tables.read().await;
        Ok(sorted_by_time(
            tables
                .observations
                .values()
                .filter(|obs| obs.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn update(&self, observation: &Observation) -> Result<(), CometError> {
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        match tables.observations.get_mut(&observation.id) {
            Some(stored) => {
                *stored = observation.clone();
                Ok(())
            }
            None => Err(CometError::observation_not_found(observation.id)),
        }
    }

    async fn delete(&self, id: ObservationId) -> Result<(), CometError> {
        self.check_write().await?;
        self.tables
            .write()
            .await
            .observations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CometError::observation_not_found(id))
    }
}

/// Photo bucket keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPhotoStorage {
    photos: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    fail_deletes: Arc<AtomicBool>,
}

impl InMemoryPhotoStorage {
    pub const BASE_URL: &'static str = "https://storage.example.com/photos/";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.photos.read().await.contains_key(url)
    }
}

impl PhotoStorage for InMemoryPhotoStorage {
    async fn upload_photo(
        &self,
        user_id: UserId,
        data: Vec<u8>,
        file_name: &str,
    ) -> Result<String, CometError> {
        if data.is_empty() {
            return Err(CometError::InvalidInput("photo is empty".into()));
        }
        let file_name = file_name.trim();
        if file_name.is_empty() || file_name.contains('/') {
            return Err(CometError::InvalidInput(format!(
                "invalid photo file name {file_name:?}"
            )));
        }

        let mut photos = self.photos.write().await;
        let url = format!("{}{user_id}/{}_{file_name}", Self::BASE_URL, photos.len() + 1);
        photos.insert(url.clone(), data);
        Ok(url)
    }

    async fn delete_photo(&self, url: &str) -> Result<(), CometError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CometError::PhotoStorage(format!("cannot delete {url}")));
        }
        self.photos
            .write()
            .await
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| CometError::PhotoStorage(format!("no photo at {url}")))
    }
}

/// Fixed token → user table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl AuthVerifier for StaticTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<(bool, UserId), CometError> {
        Ok(match self.tokens.get(token) {
            Some(&user_id) => (true, user_id),
            None => (false, 0),
        })
    }
}
