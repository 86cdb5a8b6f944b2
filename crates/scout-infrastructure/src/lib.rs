//! Storage adapters for the Scout engine: the durable feedback event log and
//! TOML configuration storage.

pub mod config_storage;
pub mod jsonl_feedback_repository;
pub mod memory_feedback_repository;

pub use config_storage::ConfigStorage;
pub use jsonl_feedback_repository::JsonlFeedbackRepository;
pub use memory_feedback_repository::InMemoryFeedbackRepository;
