#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`decoder`]: 전송 디코더 (gzip 해제)
//! - [`batch`]: 알림 배치 파서
//! - [`fact`]: 평가 대상 팩트와 파생 접근자
//! - [`rule`]: 선언형 룰 엔진과 지식 베이스
//! - [`dispatcher`]: 알림 단위 평가 디스패처
//! - [`server`]: 웹훅 리스너 (Pipeline trait 구현)
//! - [`config`]: 서버 설정 (core 설정 기반)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! HTTP POST -> TransportDecoder -> BatchParser -> Dispatcher -> RuleEngine -> downstream
//!                  |                   |              |             |
//!               gzip 해제        alertname 검사    Fact 생성    Arc<KnowledgeBase>
//! ```

pub mod batch;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod fact;
pub mod rule;
pub mod server;

// --- 주요 타입 re-export ---

// 서버
pub use server::{IngestResponse, IngestServer, IngestServerBuilder, ListenerState};

// 설정
pub use config::IngestConfig;

// 에러
pub use error::{ErrorScope, IngestError};

// 디코딩/파싱
pub use batch::{Alert, AlertBatch, Annotations, BatchParser};
pub use decoder::{ContentEncoding, TransportDecoder};

// 팩트
pub use fact::{Fact, FactOutputs, OutputField};

// 룰 엔진
pub use rule::{EvaluationContext, EvaluationReport, KnowledgeBase, RuleEngine};

// 디스패처
pub use dispatcher::{BatchOutcome, Dispatcher, EvaluatedFact};
