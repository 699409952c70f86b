//! 조건 매칭 로직 -- 컴파일된 조건 평가
//!
//! [`CompiledCondition`]은 룰 로딩 시 필드 경로 해석과 정규식 컴파일을 한 번만 수행합니다.
//! 매칭 시점에는 재컴파일이나 경로 파싱이 일어나지 않습니다.

use regex::Regex;

use super::types::{ConditionModifier, FieldCondition};
use crate::error::IngestError;
use crate::fact::{Fact, FactPath};

/// 값 비교 방식
#[derive(Debug, Clone)]
enum Comparison {
    Exact(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regex(Regex),
    Exists,
}

/// 컴파일된 필드 조건
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    path: FactPath,
    comparison: Comparison,
    negate: bool,
}

impl CompiledCondition {
    /// 조건 정의를 컴파일합니다.
    ///
    /// # Errors
    /// 알 수 없는 필드 경로 또는 잘못된 정규식이면 [`IngestError::RuleValidation`]
    pub fn compile(
        rule: &str,
        idx: usize,
        condition: &FieldCondition,
    ) -> Result<Self, IngestError> {
        let path = FactPath::parse(&condition.field).ok_or_else(|| IngestError::RuleValidation {
            rule: rule.to_owned(),
            reason: format!("unknown field '{}' in condition[{idx}]", condition.field),
        })?;

        let value = condition.value.clone();
        let comparison = match condition.modifier {
            ConditionModifier::Exact => Comparison::Exact(value),
            ConditionModifier::Contains => Comparison::Contains(value),
            ConditionModifier::StartsWith => Comparison::StartsWith(value),
            ConditionModifier::EndsWith => Comparison::EndsWith(value),
            ConditionModifier::Exists => Comparison::Exists,
            ConditionModifier::Regex => {
                let regex = Regex::new(&value).map_err(|e| IngestError::RuleValidation {
                    rule: rule.to_owned(),
                    reason: format!(
                        "invalid regex in condition[{idx}] for field '{}': {e}",
                        condition.field
                    ),
                })?;
                Comparison::Regex(regex)
            }
        };

        Ok(Self {
            path,
            comparison,
            negate: condition.negate,
        })
    }

    /// 팩트가 조건을 만족하는지 평가합니다.
    ///
    /// 필드가 없으면 매칭 실패이며, `negate`가 설정된 경우에만 참이 됩니다.
    pub fn matches(&self, fact: &Fact) -> bool {
        let matched = match fact.resolve(&self.path) {
            Some(value) => match &self.comparison {
                Comparison::Exact(expected) => value == expected.as_str(),
                Comparison::Contains(needle) => value.contains(needle.as_str()),
                Comparison::StartsWith(prefix) => value.starts_with(prefix.as_str()),
                Comparison::EndsWith(suffix) => value.ends_with(suffix.as_str()),
                Comparison::Regex(regex) => regex.is_match(&value),
                Comparison::Exists => true,
            },
            None => false,
        };

        matched != self.negate
    }
}

/// 모든 조건이 만족되는지 평가합니다 (AND 결합).
///
/// 조건이 비어 있으면 true를 반환합니다.
pub fn all_match(conditions: &[CompiledCondition], fact: &Fact) -> bool {
    conditions.iter().all(|c| c.matches(fact))
}
