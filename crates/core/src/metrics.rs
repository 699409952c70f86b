//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironhook_`
//! - 모듈명: `ingest_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ironhook_core::metrics::INGEST_REQUESTS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 거부 사유 레이블 키 (decode, unsupported_encoding, body_too_large, parse, missing_alertname)
pub const LABEL_REASON: &str = "reason";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 룰 이름 레이블 키
pub const LABEL_RULE: &str = "rule";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 수신된 웹훅 요청 수 (counter)
pub const INGEST_REQUESTS_TOTAL: &str = "ironhook_ingest_requests_total";

/// Ingest: 거부된 웹훅 요청 수 (counter, label: reason)
pub const INGEST_REQUESTS_REJECTED_TOTAL: &str = "ironhook_ingest_requests_rejected_total";

/// Ingest: 파싱된 알림 수 (counter)
pub const INGEST_ALERTS_RECEIVED_TOTAL: &str = "ironhook_ingest_alerts_received_total";

/// Ingest: 평가 완료된 알림 수 (counter, label: result)
pub const INGEST_ALERTS_EVALUATED_TOTAL: &str = "ironhook_ingest_alerts_evaluated_total";

/// Ingest: 알림 단위 평가 에러 수 (counter)
pub const INGEST_EVALUATION_ERRORS_TOTAL: &str = "ironhook_ingest_evaluation_errors_total";

/// Ingest: 알림 1건 평가 소요 시간 (histogram, 초)
pub const INGEST_EVALUATION_DURATION_SECONDS: &str =
    "ironhook_ingest_evaluation_duration_seconds";

/// Ingest: 발화된 룰 수 (counter, label: rule)
pub const INGEST_RULES_FIRED_TOTAL: &str = "ironhook_ingest_rules_fired_total";

/// Ingest: 지식 베이스에 로드된 룰 수 (gauge)
pub const INGEST_KNOWLEDGE_BASE_RULES: &str = "ironhook_ingest_knowledge_base_rules";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "ironhook_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 평가 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 1s 범위
pub const EVALUATION_DURATION_BUCKETS: [f64; 9] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `ironhook-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        INGEST_REQUESTS_TOTAL,
        "Total number of webhook requests received"
    );
    describe_counter!(
        INGEST_REQUESTS_REJECTED_TOTAL,
        "Webhook requests rejected before evaluation, by reason"
    );
    describe_counter!(
        INGEST_ALERTS_RECEIVED_TOTAL,
        "Total number of alerts decoded from accepted batches"
    );
    describe_counter!(
        INGEST_ALERTS_EVALUATED_TOTAL,
        "Alerts evaluated against the knowledge base, by result"
    );
    describe_counter!(
        INGEST_EVALUATION_ERRORS_TOTAL,
        "Alert evaluations that failed (rule engine error or cycle limit)"
    );
    describe_histogram!(
        INGEST_EVALUATION_DURATION_SECONDS,
        "Rule evaluation latency per alert in seconds"
    );
    describe_counter!(INGEST_RULES_FIRED_TOTAL, "Rule firings, by rule name");
    describe_gauge!(
        INGEST_KNOWLEDGE_BASE_RULES,
        "Number of rules in the loaded knowledge base"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
