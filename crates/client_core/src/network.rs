//! Simulated remote round trip with latency, transient faults and timeouts.
//!
//! Every call is decided up front by a [`FaultSource`], then resolved after the
//! chosen delay:
//!
//! - **Success** after a delay drawn uniformly from `[min_delay_ms, max_delay_ms]`
//! - **Error** with one of a fixed set of HTTP-style statuses, after the same kind
//!   of delay
//! - **Timeout** after `timeout_delay_ms`
//!
//! The error roll happens first. Only calls that did not error roll for a
//! timeout, so the two probabilities apply independently.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::Resource,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkSimulationConfig {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub error_probability: f64,
    pub timeout_probability: f64,
    pub timeout_delay_ms: u64,
    /// Fixed seed for reproducible fault sequences. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for NetworkSimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 500,
            max_delay_ms: 2000,
            error_probability: 0.05,
            timeout_probability: 0.01,
            timeout_delay_ms: 10_000,
            seed: None,
        }
    }
}

impl NetworkSimulationConfig {
    /// No delay and no faults.
    pub fn instant() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            error_probability: 0.0,
            timeout_probability: 0.0,
            timeout_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// Statuses the simulated backend can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SimulatedFault {
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
    Unavailable,
    RequestTimeout,
    TooManyRequests,
}

impl SimulatedFault {
    pub const ALL: [SimulatedFault; 7] = [
        SimulatedFault::Unauthorized,
        SimulatedFault::Forbidden,
        SimulatedFault::NotFound,
        SimulatedFault::Internal,
        SimulatedFault::Unavailable,
        SimulatedFault::RequestTimeout,
        SimulatedFault::TooManyRequests,
    ];

    pub fn status(self) -> u16 {
        match self {
            SimulatedFault::Unauthorized => 401,
            SimulatedFault::Forbidden => 403,
            SimulatedFault::NotFound => 404,
            SimulatedFault::Internal => 500,
            SimulatedFault::Unavailable => 503,
            SimulatedFault::RequestTimeout => 408,
            SimulatedFault::TooManyRequests => 429,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            SimulatedFault::Unauthorized => "Unauthorized: token invalid or expired",
            SimulatedFault::Forbidden => "Access denied: insufficient permissions for this operation",
            SimulatedFault::NotFound => "Resource not found",
            SimulatedFault::Internal => "Internal server error",
            SimulatedFault::Unavailable => "Service unavailable",
            SimulatedFault::RequestTimeout => "Request timeout",
            SimulatedFault::TooManyRequests => "Too many requests",
        }
    }

    /// The message surfaced for this fault when raised by `resource`.
    pub fn message_for(self, resource: Resource) -> &'static str {
        match (self, resource) {
            (SimulatedFault::Unauthorized, Resource::Auth) => "Invalid username or password",
            (
                SimulatedFault::Forbidden,
                Resource::Students | Resource::Courses | Resource::Enrollments,
            ) => "Only administrators may modify academic records",
            (SimulatedFault::Forbidden, Resource::Users) => {
                "User management is restricted to administrators"
            }
            _ => self.message(),
        }
    }
}

/// How a single call will resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPlan {
    Success { delay: Duration },
    Error { fault: SimulatedFault, delay: Duration },
    Timeout { delay: Duration },
}

impl CallPlan {
    pub fn delay(&self) -> Duration {
        match self {
            CallPlan::Success { delay }
            | CallPlan::Error { delay, .. }
            | CallPlan::Timeout { delay } => *delay,
        }
    }
}

/// Decides the outcome of each simulated call.
pub trait FaultSource: Send {
    fn plan(&mut self, config: &NetworkSimulationConfig) -> CallPlan;
}

/// Draws outcomes from a ChaCha8 stream.
pub struct RandomFaults {
    rng: ChaCha8Rng,
}

impl RandomFaults {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn for_config(config: &NetworkSimulationConfig) -> Self {
        match config.seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    fn delay(&mut self, config: &NetworkSimulationConfig) -> Duration {
        let (low, high) = if config.min_delay_ms <= config.max_delay_ms {
            (config.min_delay_ms, config.max_delay_ms)
        } else {
            (config.max_delay_ms, config.min_delay_ms)
        };
        Duration::from_millis(self.rng.gen_range(low..=high))
    }
}

impl FaultSource for RandomFaults {
    fn plan(&mut self, config: &NetworkSimulationConfig) -> CallPlan {
        if self.rng.gen::<f64>() < config.error_probability {
            let fault = SimulatedFault::ALL[self.rng.gen_range(0..SimulatedFault::ALL.len())];
            return CallPlan::Error {
                fault,
                delay: self.delay(config),
            };
        }
        if self.rng.gen::<f64>() < config.timeout_probability {
            return CallPlan::Timeout {
                delay: Duration::from_millis(config.timeout_delay_ms),
            };
        }
        CallPlan::Success {
            delay: self.delay(config),
        }
    }
}

/// Replays a fixed sequence of plans, then succeeds immediately.
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    script: VecDeque<CallPlan>,
}

impl ScriptedFaults {
    pub fn new(script: impl IntoIterator<Item = CallPlan>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FaultSource for ScriptedFaults {
    fn plan(&mut self, _config: &NetworkSimulationConfig) -> CallPlan {
        self.script.pop_front().unwrap_or(CallPlan::Success {
            delay: Duration::ZERO,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("{resource:?} request failed with {status}: {message}")]
    Transient {
        status: u16,
        message: String,
        resource: Resource,
    },
    #[error("{resource:?} request timed out after {elapsed:?}")]
    Timeout {
        resource: Resource,
        elapsed: Duration,
    },
    #[error("unexpected response for {0}")]
    UnexpectedResponse(String),
}

impl NetworkError {
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Transient { status, .. } => Some(*status),
            NetworkError::Timeout { .. } => Some(408),
            NetworkError::UnexpectedResponse(_) => None,
        }
    }
}

impl From<NetworkError> for ApiError {
    fn from(value: NetworkError) -> Self {
        let code = match &value {
            NetworkError::Transient { status, .. } => ErrorCode::from_status(*status),
            NetworkError::Timeout { .. } => ErrorCode::Timeout,
            NetworkError::UnexpectedResponse(_) => ErrorCode::Internal,
        };
        ApiError::new(code, value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub calls: u64,
    pub successes: u64,
    pub errors: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

pub struct MockNetwork {
    config: NetworkSimulationConfig,
    faults: Mutex<Box<dyn FaultSource>>,
    counters: Counters,
}

impl MockNetwork {
    pub fn new(config: NetworkSimulationConfig) -> Self {
        let faults = RandomFaults::for_config(&config);
        Self::with_fault_source(config, faults)
    }

    pub fn with_fault_source(
        config: NetworkSimulationConfig,
        faults: impl FaultSource + 'static,
    ) -> Self {
        Self {
            config,
            faults: Mutex::new(Box::new(faults)),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &NetworkSimulationConfig {
        &self.config
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Decides the next call's outcome without waiting for it.
    pub async fn next_plan(&self) -> CallPlan {
        if !self.config.enabled {
            return CallPlan::Success {
                delay: Duration::ZERO,
            };
        }
        self.faults.lock().await.plan(&self.config)
    }

    /// Waits out the simulated round trip for a call against `resource`.
    pub async fn round_trip(&self, resource: Resource) -> Result<(), NetworkError> {
        let request_id = Uuid::new_v4();
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let plan = self.next_plan().await;
        if !plan.delay().is_zero() {
            tokio::time::sleep(plan.delay()).await;
        }

        match plan {
            CallPlan::Success { delay } => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                debug!(%request_id, ?resource, ?delay, "simulated call succeeded");
                Ok(())
            }
            CallPlan::Error { fault, .. } => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                let message = fault.message_for(resource);
                warn!(%request_id, ?resource, status = fault.status(), message, "simulated call failed");
                Err(NetworkError::Transient {
                    status: fault.status(),
                    message: message.to_string(),
                    resource,
                })
            }
            CallPlan::Timeout { delay } => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(%request_id, ?resource, ?delay, "simulated call timed out");
                Err(NetworkError::Timeout {
                    resource,
                    elapsed: delay,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/network_tests.rs"]
mod tests;
