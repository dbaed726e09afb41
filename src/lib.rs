pub mod a2a;
pub mod agents;
pub mod core;
pub mod documents;
pub mod llm;
pub mod rag;
pub mod server;
pub mod session;
pub mod state;
