//! 룰 파일 로더 -- YAML 룰 파일을 디스크에서 읽어 정의로 변환합니다.
//!
//! 로딩 실패는 모두 치명적입니다. 지식 베이스 없이 리스너를 시작하지 않습니다.

use std::path::Path;

use crate::error::IngestError;

use super::types::RuleSetDefinition;

/// 룰 파일 최대 크기
pub const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 룰 세트당 최대 룰 수
pub const MAX_RULES_COUNT: usize = 10_000;

/// 룰 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 단일 YAML 파일에서 룰 세트를 로드합니다.
    ///
    /// # Errors
    /// - 파일이 없거나 읽을 수 없는 경우
    /// - 파일 크기가 `MAX_RULE_FILE_SIZE`를 초과하는 경우
    /// - YAML 구문 오류 또는 룰 검증 실패
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleSetDefinition, IngestError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| IngestError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if !metadata.is_file() {
            return Err(IngestError::RuleLoad {
                path: path.display().to_string(),
                reason: "not a regular file".to_owned(),
            });
        }

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(IngestError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하여 룰 세트를 생성합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleSetDefinition, IngestError> {
        let set: RuleSetDefinition =
            serde_yaml::from_str(yaml_str).map_err(|e| IngestError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        set.validate(MAX_RULES_COUNT)?;

        tracing::debug!(
            source = source,
            name = %set.name,
            rules = set.rules.len(),
            "parsed rule set"
        );

        Ok(set)
    }
}
