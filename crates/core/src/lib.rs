#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, IronhookError, PipelineError};

// 설정
pub use config::IronhookConfig;

// 생명주기 trait
pub use pipeline::{HealthStatus, Pipeline};
