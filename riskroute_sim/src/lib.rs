//! RiskRoute Deterministic Simulation Harness
//!
//! This crate runs the routing core through scripted flood scenarios on a
//! virtual clock, so a whole run is reproducible from one 64-bit seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: [`SimContext`] advances only when the harness ticks
//! - **Observations**: [`HazardOracle`] derives every report from the seed
//! - **Delivery**: reports travel through the same bounded channel the
//!   production service uses, duplicates and back-pressure included
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                   ScenarioRunner                      │
//! │  ┌──────────────┐   envelopes   ┌──────────────────┐  │
//! │  │ HazardOracle │──────────────►│ bounded channel  │  │
//! │  │ (true water) │               └────────┬─────────┘  │
//! │  └──────────────┘                        │ drain      │
//! │                              ┌───────────▼──────────┐ │
//! │  SimContext (virtual clock)─►│  RiskRouteRuntime    │ │
//! │                              │  fusion ─► graph     │ │
//! │                              │  router ◄─ queries   │ │
//! │                              └──────────────────────┘ │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use riskroute_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::FlashFlood);
//! assert!(result.passed);
//! ```

mod city;
mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use city::GridCity;
pub use context::SimContext;
pub use exporter::{RunExport, SimExport};
pub use oracle::{to_envelope, FloodZone, HazardOracle};
pub use runner::{RouteRecord, ScenarioMetrics, ScenarioResult, ScenarioRunner, SimError, TickFrame};
