pub mod chat;
pub mod chunker;
pub mod config;
pub mod core;
pub mod embeddings;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod server;
pub mod state;
pub mod vector_store;
pub mod web;
