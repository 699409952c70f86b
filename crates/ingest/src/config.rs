//! 수집 서버 설정
//!
//! [`IngestConfig`]는 core의 [`ListenerConfig`](ironhook_core::config::ListenerConfig)와
//! [`RulesConfig`](ironhook_core::config::RulesConfig)를 합쳐 서버 내부에서 사용하는 형태로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use ironhook_core::config::IronhookConfig;
//! use ironhook_ingest::config::IngestConfig;
//!
//! let core_config = IronhookConfig::default();
//! let config = IngestConfig::from_core(&core_config);
//! ```

use serde::{Deserialize, Serialize};

use ironhook_core::config::{HEALTH_PATH, IronhookConfig};

use crate::error::IngestError;
use crate::rule::DEFAULT_MAX_CYCLE;

/// 수집 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 수신 포트 (0이면 임의 포트)
    pub port: u16,
    /// 웹훅 수신 경로
    pub path: String,
    /// 요청 본문 최대 크기 (압축 상태)
    pub max_body_bytes: usize,
    /// 압축 해제 후 최대 크기
    pub max_decompressed_bytes: usize,
    /// 배치당 최대 알림 수
    pub max_alerts_per_batch: usize,
    /// 평가된 Fact 전달 채널 용량
    pub fact_channel_capacity: usize,
    /// 평가 1회당 최대 룰 발화 횟수
    pub max_cycle: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: 5000,
            path: "/alerts".to_owned(),
            max_body_bytes: 4 * 1024 * 1024,
            max_decompressed_bytes: 16 * 1024 * 1024,
            max_alerts_per_batch: 1000,
            fact_channel_capacity: 256,
            max_cycle: DEFAULT_MAX_CYCLE,
        }
    }
}

impl IngestConfig {
    /// core 설정에서 수집 서버 설정을 생성합니다.
    pub fn from_core(core: &IronhookConfig) -> Self {
        let listener = &core.listener;
        Self {
            bind_addr: listener.bind_addr.clone(),
            port: listener.port,
            path: listener.path.clone(),
            max_body_bytes: listener.max_body_bytes,
            max_decompressed_bytes: listener.max_decompressed_bytes,
            max_alerts_per_batch: listener.max_alerts_per_batch,
            fact_channel_capacity: listener.fact_channel_capacity,
            max_cycle: core.rules.max_cycle,
        }
    }

    /// `bind_addr:port` 형식의 주소를 반환합니다.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// core 검증과 달리 테스트용 임의 포트(0)를 허용합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.bind_addr.is_empty() {
            return Err(config_error("bind_addr", "must not be empty"));
        }

        if !self.path.starts_with('/') || self.path == HEALTH_PATH {
            return Err(config_error(
                "path",
                format!("must start with '/' and must not be '{HEALTH_PATH}'"),
            ));
        }

        if self.max_body_bytes == 0 || self.max_decompressed_bytes == 0 {
            return Err(config_error("max_body_bytes", "size limits must be greater than 0"));
        }

        if self.max_alerts_per_batch == 0 {
            return Err(config_error("max_alerts_per_batch", "must be greater than 0"));
        }

        if self.fact_channel_capacity == 0 {
            return Err(config_error("fact_channel_capacity", "must be greater than 0"));
        }

        if self.max_cycle == 0 {
            return Err(config_error("max_cycle", "must be greater than 0"));
        }

        Ok(())
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        IngestConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_copies_listener_and_rules() {
        let mut core = IronhookConfig::default();
        core.listener.port = 6000;
        core.listener.path = "/webhook".to_owned();
        core.rules.max_cycle = 7;

        let config = IngestConfig::from_core(&core);
        assert_eq!(config.port, 6000);
        assert_eq!(config.path, "/webhook");
        assert_eq!(config.max_cycle, 7);
        assert_eq!(config.socket_addr(), "0.0.0.0:6000");
    }

    #[test]
    fn ephemeral_port_is_allowed() {
        let config = IngestConfig {
            port: 0,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn health_path_collision_fails() {
        let config = IngestConfig {
            path: "/health".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IngestError::Config { .. })
        ));
    }

    #[test]
    fn zero_max_cycle_fails() {
        let config = IngestConfig {
            max_cycle: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
