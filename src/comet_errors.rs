use thiserror::Error;

use crate::constants::{CometId, ObservationId};

/// Result alias used across the crate.
pub type CometResult<T> = Result<T, CometError>;

#[derive(Error, Debug, Clone)]
pub enum CometError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Acting user does not own the requested record")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not enough observations to fit an orbit: found {found}, need at least {required}")]
    NotEnoughObservations { found: usize, required: usize },

    #[error("No fresh orbit is available for this comet")]
    OrbitNotCalculated,

    #[error("Observation geometry cannot constrain an orbit: {0}")]
    DegenerateGeometry(String),

    #[error("Numerical computation failed: {0}")]
    ComputationError(String),

    #[error("Invalid configuration parameter: {0}")]
    InvalidParameter(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage deadline exceeded during {0}")]
    StorageTimeout(String),

    #[error("Photo storage error: {0}")]
    PhotoStorage(String),

    #[error(
        "Unit direction matrix is singular (cannot be inverted); observations may be coplanar"
    )]
    SingularDirectionMatrix,

    #[error("Aberth–Ehrlich method failed to find acceptable complex roots")]
    PolynomialRootFindingFailed,

    #[error("Spurious root detected (e.g., negative or near-zero geocentric distance)")]
    SpuriousRootDetected,

    #[error("Gauss method failed to find roots")]
    GaussNoRootsFound,
}

impl CometError {
    pub fn comet_not_found(id: CometId) -> Self {
        CometError::NotFound(format!("comet {id}"))
    }

    pub fn observation_not_found(id: ObservationId) -> Self {
        CometError::NotFound(format!("observation {id}"))
    }
}

impl PartialEq for CometError {
    fn eq(&self, other: &Self) -> bool {
        use CometError::*;
        match (self, other) {
            (NotFound(a), NotFound(b)) => a == b,
            (InvalidInput(a), InvalidInput(b)) => a == b,
            (
                NotEnoughObservations {
                    found: fa,
                    required: ra,
                },
                NotEnoughObservations {
                    found: fb,
                    required: rb,
                },
            ) => fa == fb && ra == rb,
            (DegenerateGeometry(a), DegenerateGeometry(b)) => a == b,
            (ComputationError(a), ComputationError(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (Storage(a), Storage(b)) => a == b,
            (PhotoStorage(a), PhotoStorage(b)) => a == b,

            // Deadline messages come from tokio; only the variant matters
            (StorageTimeout(_), StorageTimeout(_)) => true,

            (Unauthorized, Unauthorized) => true,
            (OrbitNotCalculated, OrbitNotCalculated) => true,
            (SingularDirectionMatrix, SingularDirectionMatrix) => true,
            (PolynomialRootFindingFailed, PolynomialRootFindingFailed) => true,
            (SpuriousRootDetected, SpuriousRootDetected) => true,
            (GaussNoRootsFound, GaussNoRootsFound) => true,

            _ => false,
        }
    }
}
