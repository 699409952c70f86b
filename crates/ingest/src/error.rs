//! 수집 파이프라인 에러 타입
//!
//! [`IngestError`]는 웹훅 수신부터 룰 평가까지 발생하는 모든 에러를 표현합니다.
//! 각 에러는 [`ErrorScope`]로 복구 경계가 정해집니다.
//!
//! - `Startup`: 룰 로딩/검증 실패. 리스너가 시작되지 않아야 합니다.
//! - `Request`: 디코딩/파싱 실패. 요청 전체를 거부합니다.
//! - `Alert`: 룰 평가 실패. 해당 알림만 실패로 기록하고 배치는 계속 진행합니다.
//!
//! `From<IngestError> for IronhookError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ironhook_core::error::{IronhookError, PipelineError};

/// 에러 복구 경계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// 프로세스 시작 단계 (치명적)
    Startup,
    /// 요청 단위
    Request,
    /// 알림 단위
    Alert,
}

impl ErrorScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Request => "request",
            Self::Alert => "alert",
        }
    }
}

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 압축 스트림 손상 또는 잘림
    #[error("decode error: {encoding}: {reason}")]
    Decode {
        /// Content-Encoding 값
        encoding: String,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 Content-Encoding
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// 본문 크기 초과 (압축 해제 후 포함)
    #[error("body too large: exceeds {max} bytes")]
    BodyTooLarge {
        /// 허용 최대 크기
        max: usize,
    },

    /// 배치 JSON 구조 오류
    #[error("parse error at line {line}, column {column}: {reason}")]
    Parse {
        /// 실패 위치 (행)
        line: usize,
        /// 실패 위치 (열)
        column: usize,
        /// 실패 사유
        reason: String,
    },

    /// 알림에 `alertname` 레이블 누락
    #[error("alert[{index}] (fingerprint '{fingerprint}') is missing the 'alertname' label")]
    MissingAlertName {
        /// 배치 내 알림 순서
        index: usize,
        /// 알림 fingerprint
        fingerprint: String,
    },

    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 평가 중 최대 발화 횟수 초과
    #[error("evaluation of fact '{fingerprint}' exceeded max cycle {max_cycle} (last rule: '{last_rule}')")]
    CycleLimitExceeded {
        /// 평가 중인 알림 fingerprint
        fingerprint: String,
        /// 설정된 최대 발화 횟수
        max_cycle: u32,
        /// 마지막으로 발화한 룰
        last_rule: String,
    },

    /// 룰 실행 중 에러
    #[error("evaluation error: rule '{rule}': {reason}")]
    Evaluation {
        /// 실행 중이던 룰
        rule: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 값 오류
    #[error("config error: {field}: {reason}")]
    Config {
        /// 문제가 된 필드
        field: String,
        /// 오류 사유
        reason: String,
    },

    /// 블로킹 작업 태스크 실패
    #[error("worker task failed: {0}")]
    Worker(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// 에러의 복구 경계를 반환합니다.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::RuleLoad { .. }
            | Self::RuleValidation { .. }
            | Self::Config { .. }
            | Self::Io(_) => ErrorScope::Startup,
            Self::Decode { .. }
            | Self::UnsupportedEncoding(_)
            | Self::BodyTooLarge { .. }
            | Self::Parse { .. }
            | Self::MissingAlertName { .. }
            | Self::Worker(_) => ErrorScope::Request,
            Self::CycleLimitExceeded { .. } | Self::Evaluation { .. } => ErrorScope::Alert,
        }
    }

    /// 메트릭 레이블로 사용하는 짧은 사유 문자열을 반환합니다.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::UnsupportedEncoding(_) => "unsupported_encoding",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::Parse { .. } => "parse",
            Self::MissingAlertName { .. } => "missing_alertname",
            Self::RuleLoad { .. } => "rule_load",
            Self::RuleValidation { .. } => "rule_validation",
            Self::CycleLimitExceeded { .. } => "cycle_limit",
            Self::Evaluation { .. } => "evaluation",
            Self::Config { .. } => "config",
            Self::Worker(_) => "worker",
            Self::Io(_) => "io",
        }
    }

    /// 요청 거부 시 응답할 HTTP 상태 코드를 반환합니다.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode { .. } | Self::Parse { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedEncoding(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingAlertName { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<IngestError> for IronhookError {
    fn from(err: IngestError) -> Self {
        IronhookError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_alert_name_display() {
        let err = IngestError::MissingAlertName {
            index: 2,
            fingerprint: "abc123".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("alert[2]"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("alertname"));
    }

    #[test]
    fn scopes_follow_recovery_boundaries() {
        let decode = IngestError::Decode {
            encoding: "gzip".to_owned(),
            reason: "unexpected end of file".to_owned(),
        };
        assert_eq!(decode.scope(), ErrorScope::Request);

        let cycle = IngestError::CycleLimitExceeded {
            fingerprint: "f1".to_owned(),
            max_cycle: 100,
            last_rule: "loop".to_owned(),
        };
        assert_eq!(cycle.scope(), ErrorScope::Alert);

        let load = IngestError::RuleLoad {
            path: "rules.yml".to_owned(),
            reason: "not found".to_owned(),
        };
        assert_eq!(load.scope(), ErrorScope::Startup);

        let worker = IngestError::Worker("task cancelled".to_owned());
        assert_eq!(worker.scope(), ErrorScope::Request);
        assert_eq!(worker.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(
            IngestError::UnsupportedEncoding("br".to_owned()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            IngestError::BodyTooLarge { max: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            IngestError::MissingAlertName {
                index: 0,
                fingerprint: String::new(),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            IngestError::Parse {
                line: 1,
                column: 1,
                reason: "expected value".to_owned(),
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn converts_to_ironhook_error() {
        let err = IngestError::RuleLoad {
            path: "/etc/ironhook/rules.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        let top: IronhookError = err.into();
        assert!(matches!(top, IronhookError::Pipeline(_)));
        assert!(top.to_string().contains("rules.yml"));
    }
}
