#![doc = include_str!("../README.md")]

pub mod memory;
pub mod query;
pub mod sqlite;
pub mod store;

// --- 주요 타입 re-export ---

// 저장소 trait
pub use store::{AnalysisStore, BeginAnalysis};

// 구현
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// 조회 타입
pub use query::{FindingFilter, FindingsPage, PageRequest};
