//! Distributor configuration.

use std::time::Duration;
use strand_core::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a bounded lane does with a submission once it is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverflowPolicy {
    /// Refuse the new event with [`SubmitError::QueueFull`](strand_core::SubmitError::QueueFull).
    #[default]
    Reject,
    /// Discard the oldest queued event of the lane and accept the new one.
    DropOldest,
}

/// How a first-seen owner is bound once the lane cap is reached.
///
/// Below the cap a new owner always receives a fresh lane, and an existing
/// lane left without owners by eviction is reused before either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AssignmentStrategy {
    /// A rotating index over the existing lanes.
    #[default]
    RoundRobin,
    /// The lane with the fewest owners, then the shallowest queue, then the lowest id.
    LeastLoaded,
}

/// Configuration of a [`Distributor`](crate::Distributor).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use strand_std::{DistributorConfig, OverflowPolicy};
///
/// let config = DistributorConfig::new()
///     .with_max_lanes(4)
///     .with_queue_capacity(1024)
///     .with_overflow(OverflowPolicy::DropOldest)
///     .with_default_wait_timeout(Duration::from_secs(10));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DistributorConfig {
    /// Upper bound on the number of lanes. Lanes are created lazily.
    pub max_lanes: usize,
    /// Per-lane queue bound. `None` leaves lanes unbounded.
    pub queue_capacity: Option<usize>,
    /// Behavior of a full lane.
    pub overflow: OverflowPolicy,
    /// Owner binding once `max_lanes` lanes exist.
    pub assignment: AssignmentStrategy,
    /// Timeout used by [`Envelope::wait_next_default`](crate::Envelope::wait_next_default).
    pub default_wait_timeout: Duration,
    /// Grace period used by [`Distributor::close`](crate::Distributor::close).
    pub shutdown_grace: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributorConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            max_lanes: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_capacity: None,
            overflow: OverflowPolicy::Reject,
            assignment: AssignmentStrategy::RoundRobin,
            default_wait_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    /// Set the lane cap.
    pub fn with_max_lanes(mut self, max_lanes: usize) -> Self {
        self.max_lanes = max_lanes;
        self
    }

    /// Bound every lane's queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Remove the queue bound.
    pub fn unbounded(mut self) -> Self {
        self.queue_capacity = None;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the assignment strategy.
    pub fn with_assignment(mut self, assignment: AssignmentStrategy) -> Self {
        self.assignment = assignment;
        self
    }

    /// Set the default wait timeout.
    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }

    /// Set the default shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check the configuration for values the distributor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lanes == 0 {
            return Err(ConfigError::ZeroLanes);
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DistributorConfig::default();
        assert!(config.max_lanes >= 1);
        assert_eq!(config.queue_capacity, None);
        assert_eq!(config.overflow, OverflowPolicy::Reject);
        assert_eq!(config.assignment, AssignmentStrategy::RoundRobin);
        assert_eq!(config.default_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = DistributorConfig::new().with_max_lanes(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroLanes));

        let config = DistributorConfig::new().with_queue_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));

        let config = config.unbounded();
        assert!(config.validate().is_ok());
    }
}
