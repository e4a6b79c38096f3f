//! 提示词构建：把事件与统计数据组装为 LLM 请求。
//!
//! Prompt builders. Each builder turns domain input into an immutable
//! [`crate::types::Request`]; identical input always yields an identical
//! request, and therefore the same cache fingerprint.

pub mod insights;
pub mod processing;

pub use insights::{
    preprocess_summary, DimensionDigest, InsightsPromptBuilder, SummaryDigest,
    HIGHLIGHTS_PER_DIMENSION,
};
pub use processing::ProcessingPromptBuilder;
