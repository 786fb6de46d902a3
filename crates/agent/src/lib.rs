//! Conversational layer between customers and the inventory engine.
//!
//! This crate owns everything that talks to the hosted completion service:
//! - **Threads and runs** (`assistant`) - HTTP client behind the
//!   `AssistantClient` trait
//! - **Sessions** (`session`) - one thread per customer identity, with the
//!   resolved profile and idle eviction
//! - **Tool calls** (`dispatch`) - the five catalog/reservation functions
//!   the model may invoke, plus their advertised schema
//! - **Orchestration** (`orchestrator`) - the poll loop that feeds tool
//!   outputs back until the run completes
//! - **Rendering** (`render`) - markdown image markers split into ordered
//!   reply segments
//!
//! # Safety Principle
//!
//! The model never touches stock or prices directly. Every mutation goes
//! through the reservation ledger, which re-checks stock under a product
//! lock; the model only phrases the outcome.

pub mod assistant;
pub mod dispatch;
pub mod orchestrator;
pub mod render;
pub mod session;

pub use assistant::{
    AssistantClient, AssistantError, AssistantReply, ContentItem, HttpAssistantClient,
    RunSnapshot, RunStatus, ToolCallRequest, ToolOutput,
};
pub use dispatch::{tool_schema, DispatchError, ToolContext, ToolDispatcher, ToolInvocation};
pub use orchestrator::{AgentReply, OrchestratorError, RunOrchestrator};
pub use render::render_reply;
pub use session::{Session, SessionRegistry};
