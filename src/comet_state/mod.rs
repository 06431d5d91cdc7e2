//! # Comet state management
//!
//! The comet aggregate ([`Comet`]), the collaborator traits it is persisted through, their
//! in-memory implementations, and the [`CometStateManager`] that drives fits, close
//! approaches and trajectories while keeping the freshness flags honest.
//!
//! ```rust,no_run
//! use cometfit::comet_state::{
//!     CometStateManager, InMemoryPhotoStorage, InMemoryStore, ServiceConfig, StaticTokenVerifier,
//! };
//!
//! # async fn run() -> Result<(), cometfit::comet_errors::CometError> {
//! let store = InMemoryStore::new();
//! let manager = CometStateManager::new(
//!     ServiceConfig::default(),
//!     store.clone(),
//!     store,
//!     StaticTokenVerifier::new().with_token("token", 1),
//!     InMemoryPhotoStorage::new(),
//! )?;
//!
//! let user = manager.authenticate("token").await?;
//! let comet = manager.create_comet(user, "1P/Halley", None).await?;
//! // ... record observations, then:
//! let comet = manager.request_orbit_fit(user, comet.id).await?;
//! let approach = manager.request_close_approach(user, comet.id).await?;
//! println!("{approach}");
//! # Ok(())
//! # }
//! ```
pub mod comet;
pub mod config;
pub mod manager;
pub mod memory;
pub mod store;

pub use comet::{Comet, CometOrbitState, NewComet};
pub use config::ServiceConfig;
pub use manager::{CometStateManager, ObservationUpdate, PhotoUpload};
pub use memory::{InMemoryPhotoStorage, InMemoryStore, StaticTokenVerifier};
pub use store::{AuthVerifier, CometRepository, ObservationStore, PhotoStorage};
