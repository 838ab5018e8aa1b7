//! OrgSim Core - engines for simulating an agent organization
//!
//! Pure, synchronous state machines driven by the simulation harness:
//! 1. **Organization**: agents, tasks, roster and structural invariants
//! 2. **Protocol**: typed ACP messages and their delivery side effects
//! 3. **Executor**: applies strategy-agnostic decisions to the organization
//! 4. **Router**: simulated provider/model selection with cost and latency
//! 5. **Transcript**: the durable recorded-decision format

pub mod ids;
pub mod org;
pub mod acp;
pub mod decision;
pub mod executor;
pub mod router;
pub mod transcript;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use acp::{deliver, AcpMessage, EscalationReason, MessageType, PRINCIPAL};
pub use decision::{parse_decision, Action, AgentDecision, ParseError};
pub use executor::{execute_decision, DropReason, ExecutionContext, ExecutionOutcome};
pub use ids::{AgentId, DecisionSource, TaskId, TaskIdAllocator};
pub use org::{
    Agent, AgentStats, AgentStatus, InvariantViolation, OrgError, Organization, Priority, Role, Task,
    TaskStatus, Trigger,
};
pub use router::{ModelRouter, RouteDecision, RouteRequest, RouterMetrics, TaskType};
pub use transcript::{Transcript, TranscriptEntry, TranscriptError};
