pub mod analysis;
pub mod config;
pub mod data_assistant;
pub mod enrich;
pub mod error;
pub mod intent;
pub mod llm;
pub mod lookup;
pub mod narrative;
pub mod tables;
