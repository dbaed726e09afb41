//! Message envelope shared by every agent call.
//!
//! Agents are plain async functions; the envelope is the shape of their
//! HTTP responses and the unit that log lines are correlated by.

mod protocol;

pub use protocol::{new_session_id, new_trace_id, Agent, Envelope, MessageType};
