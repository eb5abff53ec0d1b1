//! Shopping assistant agent runtime.
//!
//! Everything between an incoming chat message and its text reply lives here:
//! - `gateway` - single-attempt HTTP calls to the product/cart backend with a typed failure
//!   taxonomy
//! - `tools` - the six shopping tools, rendered as plain text for the model
//! - `llm` / `provider` - model abstraction and the OpenAI-compatible client
//! - `runtime` - the per-session tool-calling loop
//! - `factory` - builds one agent per session, restoring its saved transcript
//! - `registry` - lazy, race-free session map with optional idle eviction
//! - `processor` - the never-failing entry point used by the HTTP layer
//!
//! # Failure policy
//!
//! Errors are turned into data at the layer where they occur. The gateway returns
//! [`gateway::GatewayError`] values, tools turn those into sentences, and the processor turns
//! any remaining [`AgentError`] into a fixed apology.

pub mod error;
pub mod factory;
pub mod gateway;
pub mod llm;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod tools;
pub mod transcript;

pub use error::AgentError;
pub use factory::{AgentFactory, ShoppingAgentFactory};
pub use processor::MessageProcessor;
pub use registry::SessionRegistry;
