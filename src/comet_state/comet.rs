//! The comet aggregate and its orbit/approach freshness state.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::close_approach::CloseApproach;
use crate::comet_errors::CometError;
use crate::constants::{CometId, UserId};
use crate::orbit_type::OrbitalElements;

/// Where a comet stands in the fit → approach pipeline.
///
/// Derived from the record's flags, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CometOrbitState {
    /// No elements were ever fitted.
    NoOrbit,
    /// Elements match the current observation set; no fresh approach.
    OrbitFresh,
    /// Elements are kept for display but the observations changed since the fit.
    OrbitStaleApproachNone,
    /// Fresh elements and a close approach computed from them.
    OrbitFreshApproachFresh,
}

impl fmt::Display for CometOrbitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CometOrbitState::NoOrbit => "no orbit",
            CometOrbitState::OrbitFresh => "orbit fresh",
            CometOrbitState::OrbitStaleApproachNone => "orbit stale",
            CometOrbitState::OrbitFreshApproachFresh => "orbit and approach fresh",
        };
        f.write_str(label)
    }
}

/// Comet record, the aggregate root persisted by a
/// [`CometRepository`](crate::comet_state::CometRepository).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comet {
    pub id: CometId,
    pub user_id: UserId,
    pub name: String,
    pub photo_url: Option<String>,
    pub elements: Option<OrbitalElements>,
    pub orbit_fresh: bool,
    pub close_approach: Option<CloseApproach>,
    pub approach_fresh: bool,
    /// Last time a fit or an approach was stored.
    pub calculated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comet {
    pub fn state(&self) -> CometOrbitState {
        match (&self.elements, self.orbit_fresh, self.approach_fresh) {
            (None, _, _) => CometOrbitState::NoOrbit,
            (Some(_), true, true) => CometOrbitState::OrbitFreshApproachFresh,
            (Some(_), true, false) => CometOrbitState::OrbitFresh,
            (Some(_), false, _) => CometOrbitState::OrbitStaleApproachNone,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn check_owner(&self, user_id: UserId) -> Result<(), CometError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(CometError::Unauthorized)
        }
    }

    /// Elements usable by the projector and the sampler.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::OrbitNotCalculated)` when there are no elements or they are stale.
    pub fn fresh_elements(&self) -> Result<&OrbitalElements, CometError> {
        match &self.elements {
            Some(elements) if self.orbit_fresh => Ok(elements),
            _ => Err(CometError::OrbitNotCalculated),
        }
    }

    /// Store a new fit; any previous approach is dropped.
    pub fn apply_fit(&mut self, elements: OrbitalElements, at: DateTime<Utc>) {
        self.elements = Some(elements);
        self.orbit_fresh = true;
        self.close_approach = None;
        self.approach_fresh = false;
        self.calculated_at = Some(at);
    }

    /// Store a close approach computed from the current fresh elements.
    pub fn apply_approach(
        &mut self,
        approach: CloseApproach,
        at: DateTime<Utc>,
    ) -> Result<(), CometError> {
        self.fresh_elements()?;
        self.close_approach = Some(approach);
        self.approach_fresh = true;
        self.calculated_at = Some(at);
        Ok(())
    }

    /// Mark results stale after an observation change. Elements are kept, the approach
    /// is dropped. Returns `false` when there was nothing to invalidate.
    pub fn invalidate(&mut self) -> bool {
        let changed = self.orbit_fresh || self.approach_fresh || self.close_approach.is_some();
        self.orbit_fresh = false;
        self.approach_fresh = false;
        self.close_approach = None;
        changed
    }
}

/// Fields of a comet at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComet {
    pub user_id: UserId,
    pub name: String,
    pub photo_url: Option<String>,
}

impl NewComet {
    /// Return
    /// ----------
    /// * `Err(CometError::InvalidInput)` when the name is blank.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        photo_url: Option<String>,
    ) -> Result<Self, CometError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(CometError::InvalidInput("comet name must not be empty".into()));
        }
        Ok(NewComet {
            user_id,
            name,
            photo_url,
        })
    }

    pub fn into_comet(self, id: CometId) -> Comet {
        Comet {
            id,
            user_id: self.user_id,
            name: self.name,
            photo_url: self.photo_url,
            elements: None,
            orbit_fresh: false,
            close_approach: None,
            approach_fresh: false,
            calculated_at: None,
            deleted_at: None,
        }
    }
}
