//! Core environment context trait for RiskRoute services.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the fusion service and the
/// router can run in both production (tokio) and simulation (virtual clock).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the system clock
/// - **Simulation**: `SimContext` (in `riskroute_sim`) - manually advanced clock
#[async_trait]
pub trait RouteContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for cache TTLs and tick scheduling.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used to age hazard observations.
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time as fractional unix seconds.
    ///
    /// Observation timestamps use the same representation.
    fn unix_time_secs(&self) -> f64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (0 in production).
    fn seed(&self) -> u64;
}
