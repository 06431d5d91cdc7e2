use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::close_approach::ApproachParams;
use crate::comet_errors::CometError;
use crate::initial_orbit_determination::IODParams;
use crate::trajectory::TrajectoryParams;

/// Everything needed to build a [`CometStateManager`](crate::comet_state::CometStateManager)
/// with the production solver, projector and sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub iod: IODParams,
    pub approach: ApproachParams,
    pub trajectory: TrajectoryParams,
    /// Deadline applied to each collaborator round-trip.
    pub store_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            iod: IODParams::default(),
            approach: ApproachParams::default(),
            trajectory: TrajectoryParams::default(),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), CometError> {
        self.iod.validate()?;
        self.approach.validate()?;
        self.trajectory.validate()?;
        if self.store_timeout.is_zero() {
            return Err(CometError::InvalidParameter(
                "store_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Service configuration")?;
            writeln!(f, "---------------------")?;
            writeln!(f, "store_timeout = {:?}", self.store_timeout)?;
            writeln!(f, "{}", self.approach)?;
            writeln!(f, "{}", self.trajectory)?;
            write!(f, "{:#}", self.iod)
        } else {
            write!(
                f,
                "ServiceConfig(store_timeout={:?}, {}, {}, {})",
                self.store_timeout, self.iod, self.approach, self.trajectory
            )
        }
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.to_string().starts_with("ServiceConfig(store_timeout=5s"));
        assert!(format!("{config:#}").contains("[Differential correction]"));
    }

    #[test]
    fn test_invalid_sections_are_reported() {
        let zero = ServiceConfig::default().with_store_timeout(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(CometError::InvalidParameter(_))));

        let mut config = ServiceConfig::default();
        config.iod.min_observations = 2;
        assert!(matches!(config.validate(), Err(CometError::InvalidParameter(_))));

        let mut config = ServiceConfig::default();
        config.trajectory.max_points = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"iod": {"min_observations": 5}, "trajectory": {"max_span_days": 30.0}}"#)
                .unwrap();
        assert_eq!(config.iod.min_observations, 5);
        assert_eq!(config.trajectory.max_span_days, 30.0);
        assert_eq!(config.trajectory.max_points, 1000);
        assert_eq!(config.approach, ApproachParams::default());
        assert_eq!(config.store_timeout, Duration::from_secs(5));
    }
}
