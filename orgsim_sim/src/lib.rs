//! OrgSim simulation harness
//!
//! This crate drives an [`orgsim_core::Organization`] forward in discrete
//! ticks. Each tick, every on-duty agent gets at most one decision from the
//! first strategy that produces one; the executor applies it and the ACP
//! bus carries the resulting messages.
//!
//! # Decision passes
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Simulation                          │
//! │                                                              │
//! │   orders ──► parse_order_into_tasks ──► backlog + notice     │
//! │                                                              │
//! │   tick:  ┌─────────┐   ┌─────────┐   ┌───────────────┐       │
//! │          │ replay  │──►│  model  │──►│ deterministic │       │
//! │          └────┬────┘   └────┬────┘   └───────┬───────┘       │
//! │               └─────────────┴────────────────┘               │
//! │                             │                                │
//! │                    execute_decision (orgsim_core)            │
//! │                             │                                │
//! │          router hook ─ statuses ─ invariants ─ metrics       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Determinism
//!
//! Given the same seed, scenario and orders, the deterministic strategy and
//! replay produce byte-identical task and message histories. Time is read
//! through [`orgsim_env::OrgContext`]; [`SimContext`] supplies a virtual
//! clock and seeded entropy.
//!
//! # Usage
//!
//! ```ignore
//! use orgsim_sim::{ScenarioRunner, SimConfig};
//! use orgsim_sim::scenarios::ScenarioId;
//!
//! let config = SimConfig { seed: 42, max_ticks: 10, ..Default::default() };
//! let result = ScenarioRunner::simulated(config)
//!     .with_order("1) Build the signup API. 2) Write the launch blog post.")
//!     .run(ScenarioId::Startup)
//!     .await?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod network;
mod orders;
mod recorder;
mod runner;
mod world;
pub mod llm;
pub mod prompt;
pub mod scenarios;
pub mod strategy;

pub use context::SimContext;
pub use error::SimError;
pub use network::{chat_completion_body, RecordedRequest, ScriptedTransport};
pub use orders::{parse_order_into_tasks, TaskDef};
pub use recorder::{DecisionRecorder, RecordedDecision};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use strategy::{
    Decided, DecisionStrategy, DeterministicStrategy, ModelStrategy, PassMode, Proposal, ReplayLibrary, ReplayStrategy,
    StrategyError,
};
pub use world::{SimConfig, SimEvent, SimEventKind, Simulation, TickDecision, TickMetrics, TickReport};
