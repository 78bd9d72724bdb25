pub mod app;
pub mod config;
pub mod environment;
pub mod llm;
pub mod pipeline;
pub mod speech;
