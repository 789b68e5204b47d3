//! RiskRoute Environment Abstraction Layer
//!
//! This crate keeps every source of non-determinism out of the routing core:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - The inbound observation channel (`ObservationSource`)
//!
//! The core engines take time as an argument; only the runtime talks to a
//! [`RouteContext`]. Production uses [`TokioContext`], the simulator plugs in
//! a virtual clock so whole fusion runs become reproducible from a seed.
//!
//! # Example
//!
//! ```ignore
//! use riskroute_env::{observation_channel, RouteContext, ObservationSource};
//!
//! async fn fusion_loop<Ctx: RouteContext, Src: ObservationSource>(ctx: &Ctx, src: &mut Src) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(5)).await;
//!         let batch = src.drain_batch(1024);
//!         ingest(batch.envelopes);
//!         if batch.closed { break; }
//!     }
//! }
//! ```

mod channel;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use channel::{observation_channel, ObservationReceiver, ObservationSender, ObservationSource, SourceBatch};
pub use context::RouteContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::ObservationEnvelope;
