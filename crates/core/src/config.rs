//! 설정 관리 -- ironhook.toml 파싱 및 런타임 설정
//!
//! [`IronhookConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONHOOK_LISTENER_PORT=5000` 형식)
//! 3. 설정 파일 (`ironhook.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironhook_core::error::IronhookError> {
//! use ironhook_core::config::IronhookConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronhookConfig::load("ironhook.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronhookConfig::parse("[listener]\nport = 5001")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronhookError};

/// 헬스 체크 라우트 경로 (웹훅 경로와 겹칠 수 없음)
pub const HEALTH_PATH: &str = "/health";

/// Ironhook 통합 설정
///
/// `ironhook.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronhookConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 웹훅 리스너 설정
    #[serde(default)]
    pub listener: ListenerConfig,
    /// 룰 지식 베이스 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronhookConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronhookError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronhookError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronhookError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronhookError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronhookError> {
        toml::from_str(toml_str).map_err(|e| {
            IronhookError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONHOOK_{SECTION}_{FIELD}`
    /// 예: `IRONHOOK_RULES_MAX_CYCLE=50`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONHOOK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONHOOK_GENERAL_LOG_FORMAT");

        // Listener
        override_string(
            &mut self.listener.bind_addr,
            "IRONHOOK_LISTENER_BIND_ADDR",
        );
        override_u16(&mut self.listener.port, "IRONHOOK_LISTENER_PORT");
        override_string(&mut self.listener.path, "IRONHOOK_LISTENER_PATH");
        override_usize(
            &mut self.listener.max_body_bytes,
            "IRONHOOK_LISTENER_MAX_BODY_BYTES",
        );
        override_usize(
            &mut self.listener.max_decompressed_bytes,
            "IRONHOOK_LISTENER_MAX_DECOMPRESSED_BYTES",
        );
        override_usize(
            &mut self.listener.max_alerts_per_batch,
            "IRONHOOK_LISTENER_MAX_ALERTS_PER_BATCH",
        );
        override_usize(
            &mut self.listener.fact_channel_capacity,
            "IRONHOOK_LISTENER_FACT_CHANNEL_CAPACITY",
        );

        // Rules
        override_string(&mut self.rules.path, "IRONHOOK_RULES_PATH");
        override_u32(&mut self.rules.max_cycle, "IRONHOOK_RULES_MAX_CYCLE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONHOOK_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "IRONHOOK_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "IRONHOOK_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronhookError> {
        const MAX_CYCLE_LIMIT: u32 = 10_000;

        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // listener 검증
        if self.listener.bind_addr.is_empty() {
            return Err(invalid("listener.bind_addr", "must not be empty"));
        }

        if self.listener.port == 0 {
            return Err(invalid("listener.port", "must be greater than 0"));
        }

        if !self.listener.path.starts_with('/') {
            return Err(invalid("listener.path", "must start with '/'"));
        }

        if self.listener.path == HEALTH_PATH {
            return Err(invalid(
                "listener.path",
                format!("'{HEALTH_PATH}' is reserved for the health endpoint"),
            ));
        }

        if self.listener.max_body_bytes == 0 {
            return Err(invalid("listener.max_body_bytes", "must be greater than 0"));
        }

        if self.listener.max_decompressed_bytes < self.listener.max_body_bytes {
            return Err(invalid(
                "listener.max_decompressed_bytes",
                "must be greater than or equal to listener.max_body_bytes",
            ));
        }

        if self.listener.max_alerts_per_batch == 0 {
            return Err(invalid(
                "listener.max_alerts_per_batch",
                "must be greater than 0",
            ));
        }

        if self.listener.fact_channel_capacity == 0 {
            return Err(invalid(
                "listener.fact_channel_capacity",
                "must be greater than 0",
            ));
        }

        // rules 검증
        if self.rules.path.is_empty() {
            return Err(invalid("rules.path", "must not be empty"));
        }

        if self.rules.max_cycle == 0 || self.rules.max_cycle > MAX_CYCLE_LIMIT {
            return Err(invalid(
                "rules.max_cycle",
                format!("must be 1-{MAX_CYCLE_LIMIT}"),
            ));
        }

        // metrics 검증
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
            if self.metrics.port == self.listener.port {
                return Err(invalid(
                    "metrics.port",
                    "must differ from listener.port",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> IronhookError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 웹훅 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 웹훅 수신 경로
    pub path: String,
    /// 요청 본문 최대 크기 (바이트, 압축 상태)
    pub max_body_bytes: usize,
    /// 압축 해제 후 최대 크기 (바이트)
    pub max_decompressed_bytes: usize,
    /// 배치당 최대 알림 수
    pub max_alerts_per_batch: usize,
    /// 평가된 Fact 전달 채널 용량
    pub fact_channel_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: 5000,
            path: "/alerts".to_owned(),
            max_body_bytes: 4 * 1024 * 1024,          // 4MB
            max_decompressed_bytes: 16 * 1024 * 1024, // 16MB
            max_alerts_per_batch: 1000,
            fact_channel_capacity: 256,
        }
    }
}

impl ListenerConfig {
    /// `bind_addr:port` 형식의 소켓 주소 문자열을 반환합니다.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// 룰 지식 베이스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 룰 정의 파일 경로
    pub path: String,
    /// 평가 1회당 최대 룰 발화 횟수
    pub max_cycle: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "rules.yml".to_owned(),
            max_cycle: 100,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 메트릭 엔드포인트 바인드 주소
    pub listen_addr: String,
    /// 메트릭 엔드포인트 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = IronhookConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.listener.port, 5000);
        assert_eq!(config.listener.path, "/alerts");
        assert_eq!(config.rules.path, "rules.yml");
        assert_eq!(config.rules.max_cycle, 100);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = IronhookConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = IronhookConfig::parse("").unwrap();
        assert_eq!(config.listener.bind_addr, "0.0.0.0");
        assert_eq!(config.rules.max_cycle, 100);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[listener]
port = 5001

[rules]
path = "/etc/ironhook/rules.yml"
"#;
        let config = IronhookConfig::parse(toml).unwrap();
        assert_eq!(config.listener.port, 5001);
        // path는 기본값 유지
        assert_eq!(config.listener.path, "/alerts");
        assert_eq!(config.rules.path, "/etc/ironhook/rules.yml");
        assert_eq!(config.rules.max_cycle, 100);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = IronhookConfig::parse("invalid = [[[toml");
        assert!(matches!(
            result.unwrap_err(),
            IronhookError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn socket_addr_joins_host_and_port() {
        let listener = ListenerConfig {
            bind_addr: "127.0.0.1".to_owned(),
            port: 5005,
            ..Default::default()
        };
        assert_eq!(listener.socket_addr(), "127.0.0.1:5005");
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IronhookConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = IronhookConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = IronhookConfig::default();
        config.listener.port = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listener.port"));
    }

    #[test]
    fn validate_rejects_relative_path() {
        let mut config = IronhookConfig::default();
        config.listener.path = "alerts".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listener.path"));
    }

    #[test]
    fn validate_rejects_health_path_collision() {
        let mut config = IronhookConfig::default();
        config.listener.path = HEALTH_PATH.to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_decompressed_limit_below_body_limit() {
        let mut config = IronhookConfig::default();
        config.listener.max_body_bytes = 1024;
        config.listener.max_decompressed_bytes = 512;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_decompressed_bytes"));
    }

    #[test]
    fn validate_rejects_out_of_range_max_cycle() {
        let mut config = IronhookConfig::default();
        config.rules.max_cycle = 0;
        assert!(config.validate().is_err());

        config.rules.max_cycle = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_metrics_port_collision_when_enabled() {
        let mut config = IronhookConfig::default();
        config.metrics.enabled = true;
        config.metrics.port = config.listener.port;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.port"));
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 실행되어 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONHOOK_STR", "overridden") };
        override_string(&mut val, "TEST_IRONHOOK_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_IRONHOOK_STR") };
    }

    #[test]
    #[serial]
    fn env_override_u16_invalid_keeps_original() {
        let mut val = 5000u16;
        // SAFETY: serial 테스트로 실행되어 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONHOOK_PORT_BAD", "70000") };
        override_u16(&mut val, "TEST_IRONHOOK_PORT_BAD");
        assert_eq!(val, 5000); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_IRONHOOK_PORT_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_bool_valid() {
        let mut val = false;
        // SAFETY: serial 테스트로 실행되어 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONHOOK_BOOL", "true") };
        override_bool(&mut val, "TEST_IRONHOOK_BOOL");
        assert!(val);
        unsafe { std::env::remove_var("TEST_IRONHOOK_BOOL") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_IRONHOOK_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = IronhookConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = IronhookConfig::parse(&toml_str).unwrap();
        assert_eq!(config.listener.port, parsed.listener.port);
        assert_eq!(config.rules.path, parsed.rules.path);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = IronhookConfig::from_file("/nonexistent/path/ironhook.toml").await;
        assert!(matches!(
            result.unwrap_err(),
            IronhookError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
