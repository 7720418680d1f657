#![forbid(unsafe_code)]

pub mod http;
pub mod memory;
pub mod repository;

pub use http::{HttpAttemptStore, HttpStoreConfig};
pub use memory::InMemoryAttemptStore;
pub use repository::{AnswerSave, AttemptStore, StartOutcome, StartedAttempt, StoreError};
