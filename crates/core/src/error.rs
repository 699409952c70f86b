//! 에러 타입 -- 도메인별 에러 정의

/// Ironhook 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronhookError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,

    /// 파이프라인 초기화 실패 (룰 로딩 등)
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 리스너 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: IronhookError = ConfigError::FileNotFound {
            path: "/etc/ironhook/ironhook.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, IronhookError::Config(_)));
        assert!(err.to_string().contains("ironhook.toml"));
    }

    #[test]
    fn bind_error_display() {
        let err = PipelineError::Bind {
            addr: "0.0.0.0:5000".to_owned(),
            reason: "address in use".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:5000"));
        assert!(msg.contains("address in use"));
    }
}
