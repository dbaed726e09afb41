//! Envelope definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of envelopes exchanged between agents and the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A document was ingested and a session created
    SessionStarted,
    /// A document was appended to an existing session
    DocumentAppended,
    /// Current state of a live session
    SessionSummary,
    /// Outcome of a session deletion
    SessionDeleted,
    /// Chunks produced by the ingestion agent
    ParsedChunks,
    /// Re-ranked context produced by the retrieval agent
    RetrievalResult,
    /// Answer plus justification produced by the LLM agent
    FinalAnswer,
    /// Terminal failure of an operation
    Error,
}

/// Participants of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Agent {
    #[serde(rename = "CoordinatorAgent")]
    Coordinator,
    #[serde(rename = "IngestionAgent")]
    Ingestion,
    #[serde(rename = "RetrievalAgent")]
    Retrieval,
    #[serde(rename = "LLMResponseAgent")]
    LlmResponse,
    #[serde(rename = "Frontend")]
    Frontend,
}

/// A uniform message wrapper: `{type, sender, receiver, trace_id, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender: Agent,
    pub receiver: Agent,
    /// Correlates every call and log line of one user-visible operation
    pub trace_id: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(
        message_type: MessageType,
        sender: Agent,
        receiver: Agent,
        trace_id: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            message_type,
            sender,
            receiver,
            trace_id: trace_id.into(),
            payload,
        }
    }

    /// Envelope sent by the coordinator to the frontend.
    pub fn to_frontend(message_type: MessageType, trace_id: impl Into<String>, payload: T) -> Self {
        Self::new(message_type, Agent::Coordinator, Agent::Frontend, trace_id, payload)
    }

    /// Envelope sent by an agent back to the coordinator.
    pub fn to_coordinator(
        message_type: MessageType,
        sender: Agent,
        trace_id: impl Into<String>,
        payload: T,
    ) -> Self {
        Self::new(message_type, sender, Agent::Coordinator, trace_id, payload)
    }
}

/// `trace-` followed by 8 hex digits.
pub fn new_trace_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("trace-{}", &id[..8])
}

/// `session-` followed by 32 hex digits.
pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_wire_names() {
        let envelope = Envelope::to_coordinator(
            MessageType::ParsedChunks,
            Agent::Ingestion,
            "trace-abcdef01",
            json!({"chunks": ["a"]}),
        );
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "PARSED_CHUNKS");
        assert_eq!(value["sender"], "IngestionAgent");
        assert_eq!(value["receiver"], "CoordinatorAgent");
        assert_eq!(value["trace_id"], "trace-abcdef01");
        assert_eq!(value["payload"]["chunks"][0], "a");
    }

    #[test]
    fn llm_agent_name_matches_wire_format() {
        let value = serde_json::to_value(Agent::LlmResponse).unwrap();
        assert_eq!(value, "LLMResponseAgent");
    }

    #[test]
    fn ids_have_stable_shape() {
        let trace = new_trace_id();
        assert!(trace.starts_with("trace-"));
        assert_eq!(trace.len(), "trace-".len() + 8);

        let session = new_session_id();
        assert!(session.starts_with("session-"));
        assert_eq!(session.len(), "session-".len() + 32);
        assert_ne!(session, new_session_id());
    }
}
