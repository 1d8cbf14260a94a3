pub mod chat_model;
pub mod transcript_source;
