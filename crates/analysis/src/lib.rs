#![doc = include_str!("../README.md")]
//!
//! # 데이터 흐름
//!
//! ```text
//! log content ─┬─> RuleEngine (patterns + per-IP aggregates) ─┐
//!              │                                              ├─> merge ─> Findings
//!              └─> LlmOrchestrator (chunks -> provider) ──────┘
//! ```

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod llm;
pub mod merge;
pub mod parser;
pub mod patterns;

// --- 주요 타입 re-export ---

// 에러
pub use error::AnalysisError;

// 패턴 라이브러리
pub use patterns::{CompiledPattern, PatternLibrary, PatternSpec};

// 규칙 엔진
pub use engine::RuleEngine;

// 파서 / 집계
pub use aggregate::{AggregateState, IpAggregate};
pub use parser::{LineFields, LineParser};

// LLM
pub use llm::{
    AnthropicProvider, LlmAnalysisReport, LlmFinding, LlmOrchestrator, LlmProvider, LogChunk,
    OpenAiProvider, chunk_lines,
};

// 병합
pub use merge::{dedup_against, llm_to_findings, merge_findings};
