//! Org Simulation Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the organization
//! engines to run in both **Production** (tokio + HTTP) and **Simulation**
//! (virtual clock + scripted transport) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! For reproducible runs, every source of non-determinism is intercepted:
//! - Time (`now()`, `sleep()`)
//! - Inference I/O (`post_json()`, `get()`)
//! - Randomness (`derive_rng()`, `mint_id()`)
//!
//! By deriving all entropy from a single 64-bit seed, any run becomes
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use orgsim_env::{OrgContext, InferenceTransport, Endpoint};
//!
//! async fn probe<Ctx: OrgContext, T: InferenceTransport>(ctx: &Ctx, net: &T) -> bool {
//!     let started = ctx.now();
//!     let reachable = net.get(&Endpoint::new("http://localhost:11434/api/tags")).await.is_ok();
//!     tracing::debug!("probe took {:?}", ctx.now() - started);
//!     reachable
//! }
//! ```

mod context;
mod network;
mod types;
mod rng;
mod error;
mod tokio_impl;
mod http_impl;

pub use context::OrgContext;
pub use network::InferenceTransport;
pub use types::{Endpoint, TransportResponse};
pub use rng::SeededRng;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use http_impl::HttpTransport;
