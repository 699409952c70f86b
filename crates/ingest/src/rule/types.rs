//! 룰 정의 데이터 타입
//!
//! YAML 룰 파일에서 역직렬화되는 구조체들을 정의합니다.
//! 컴파일된 형태는 [`super::knowledge`]에 있습니다.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::fact::OutputField;

/// 룰 이름 최대 길이
pub const MAX_RULE_NAME_LEN: usize = 256;

/// 룰 세트 -- 하나의 YAML 룰 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// name: AlertRules
/// version: 0.0.1
/// rules:
///   - name: HighCpuPlaybook
///     salience: 10
///     when:
///       - field: labels.alertname
///         value: HighCPU
///     then:
///       - set: playbook
///         value: playbooks/cpu.yml
///       - set: limit_host
///         value: "{{ limit_host() }}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    /// 지식 베이스 이름
    pub name: String,
    /// 지식 베이스 버전 (semver)
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// 룰 목록 (선언 순서가 동일 salience의 우선순위)
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSetDefinition {
    /// 룰 세트 전체의 유효성을 검증합니다.
    ///
    /// 개별 룰 검증과 이름 중복 검사를 포함합니다.
    pub fn validate(&self, max_rules: usize) -> Result<(), IngestError> {
        if self.name.trim().is_empty() {
            return Err(IngestError::RuleValidation {
                rule: "(knowledge base)".to_owned(),
                reason: "knowledge base name must not be empty".to_owned(),
            });
        }

        if self.rules.len() > max_rules {
            return Err(IngestError::RuleValidation {
                rule: "(knowledge base)".to_owned(),
                reason: format!("too many rules: {} (max: {max_rules})", self.rules.len()),
            });
        }

        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.name.as_str()) {
                return Err(IngestError::RuleValidation {
                    rule: rule.name.clone(),
                    reason: "duplicate rule name".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// 단일 룰 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// 룰 고유 이름
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 우선순위 (높을수록 먼저 발화)
    #[serde(default)]
    pub salience: i32,
    #[serde(default)]
    pub status: RuleStatus,
    /// true면 발화 후에도 철회되지 않음
    #[serde(default)]
    pub refire: bool,
    /// 조건 목록 (AND 결합, 비어 있으면 항상 매칭)
    #[serde(default)]
    pub when: Vec<FieldCondition>,
    /// 발화 시 순서대로 실행할 액션
    #[serde(default)]
    pub then: Vec<ActionDefinition>,
}

impl RuleDefinition {
    /// 룰의 유효성을 검증합니다.
    ///
    /// 정규식과 템플릿 컴파일 검증은 지식 베이스 컴파일 단계에서 수행합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.name.trim().is_empty() {
            return Err(IngestError::RuleValidation {
                rule: "(empty)".to_owned(),
                reason: "rule name must not be empty".to_owned(),
            });
        }

        if self.name.len() > MAX_RULE_NAME_LEN {
            return Err(IngestError::RuleValidation {
                rule: self.name.clone(),
                reason: format!("rule name must not exceed {MAX_RULE_NAME_LEN} characters"),
            });
        }

        if self.then.is_empty() {
            return Err(IngestError::RuleValidation {
                rule: self.name.clone(),
                reason: "rule must define at least one action".to_owned(),
            });
        }

        for (idx, condition) in self.when.iter().enumerate() {
            if condition.field.trim().is_empty() {
                return Err(IngestError::RuleValidation {
                    rule: self.name.clone(),
                    reason: format!("condition[{idx}] field must not be empty"),
                });
            }
        }

        Ok(())
    }

    /// 활성 상태인지 확인합니다.
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }
}

/// 룰 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화 (로딩은 되지만 발화하지 않음)
    Disabled,
}

/// 필드 매칭 조건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCondition {
    /// 팩트 필드 경로 (`labels.instance`, `status`, `Fact.annotations.summary` 등)
    pub field: String,
    #[serde(default)]
    pub modifier: ConditionModifier,
    /// 비교 값 (`exists`에서는 무시)
    #[serde(default)]
    pub value: String,
    /// 결과 반전
    #[serde(default)]
    pub negate: bool,
}

/// 조건 수정자 -- 매칭 방식을 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionModifier {
    /// 정확히 일치
    #[default]
    Exact,
    /// 부분 문자열 포함
    Contains,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    Regex,
    /// 필드 존재 여부
    Exists,
}

/// 출력 필드 설정 액션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// 대상 출력 필드
    pub set: OutputField,
    /// 값 템플릿 (`{{ labels.instance }}`, `{{ limit_host() }}` 등)
    pub value: String,
}
