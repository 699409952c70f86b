//! 룰 실행 엔진
//!
//! 평가 1회마다 새 [`EvaluationContext`]를 만들어 팩트 하나를 `"Fact"`로 바인딩하고,
//! 공유 지식 베이스의 룰을 발화가 멈출 때까지 반복 적용합니다.
//!
//! # 실행 규칙
//! 1. 철회되지 않은 활성 룰 중 조건이 모두 매칭되는 첫 번째 룰을 선택
//!    (salience 내림차순, 동일하면 선언 순서)
//! 2. 액션을 순서대로 적용
//! 3. `refire`가 아니면 룰을 철회
//! 4. 선택할 룰이 없으면 종료
//!
//! 발화 횟수가 `max_cycle`을 넘으면 [`IngestError::CycleLimitExceeded`]로 실패합니다.

use crate::error::IngestError;
use crate::fact::{FACT_BINDING, Fact};

use super::knowledge::KnowledgeBase;

/// 기본 최대 발화 횟수
pub const DEFAULT_MAX_CYCLE: u32 = 100;

/// 출력 필드 값 최대 길이 (바이트)
pub const MAX_OUTPUT_LEN: usize = 4096;

/// 평가 컨텍스트 -- 팩트 1개와 지식 베이스의 1회성 바인딩
///
/// 철회된 룰과 발화 기록 등 실행 중 상태를 보관하며 재사용되지 않습니다.
pub struct EvaluationContext<'a> {
    binding: &'static str,
    fact: &'a mut Fact,
    kb: &'a KnowledgeBase,
    retracted: Vec<bool>,
    fired: Vec<String>,
    cycles: u32,
}

impl<'a> EvaluationContext<'a> {
    /// 팩트를 `"Fact"` 이름으로 바인딩합니다.
    pub fn bind(kb: &'a KnowledgeBase, fact: &'a mut Fact) -> Self {
        Self {
            binding: FACT_BINDING,
            fact,
            kb,
            retracted: vec![false; kb.rule_count()],
            fired: Vec::new(),
            cycles: 0,
        }
    }

    /// 바인딩 이름
    pub fn binding(&self) -> &str {
        self.binding
    }

    /// 다음에 발화할 룰의 인덱스를 찾습니다.
    fn next_eligible(&self) -> Option<usize> {
        self.kb
            .rules()
            .iter()
            .enumerate()
            .find(|(idx, rule)| {
                rule.is_enabled() && !self.retracted[*idx] && rule.matches(self.fact)
            })
            .map(|(idx, _)| idx)
    }
}

/// 평가 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// 발화 순서대로 기록된 룰 이름
    pub fired_rules: Vec<String>,
    /// 총 발화 횟수
    pub cycles: u32,
}

/// 룰 실행 엔진
///
/// 상태를 갖지 않으므로 모든 요청에서 공유해도 안전합니다.
#[derive(Debug, Clone, Copy)]
pub struct RuleEngine {
    max_cycle: u32,
}

impl RuleEngine {
    pub fn new(max_cycle: u32) -> Self {
        Self { max_cycle }
    }

    pub fn max_cycle(&self) -> u32 {
        self.max_cycle
    }

    /// 컨텍스트에 바인딩된 팩트에 대해 룰을 실행합니다.
    ///
    /// # Errors
    /// - 발화 횟수가 `max_cycle` 초과 → [`IngestError::CycleLimitExceeded`]
    /// - 템플릿 렌더링 실패, 액션 결과가 `MAX_OUTPUT_LEN` 초과 → [`IngestError::Evaluation`]
    pub fn execute(&self, mut ctx: EvaluationContext<'_>) -> Result<EvaluationReport, IngestError> {
        let kb = ctx.kb;
        while let Some(idx) = ctx.next_eligible() {
            let rule = &kb.rules()[idx];

            if ctx.cycles >= self.max_cycle {
                return Err(IngestError::CycleLimitExceeded {
                    fingerprint: ctx.fact.fingerprint.clone(),
                    max_cycle: self.max_cycle,
                    last_rule: ctx.fired.last().cloned().unwrap_or_default(),
                });
            }

            for action in rule.actions() {
                let value = action.render(ctx.fact).map_err(|reason| IngestError::Evaluation {
                    rule: rule.name().to_owned(),
                    reason: format!("failed to render '{}': {reason}", action.field()),
                })?;
                if value.len() > MAX_OUTPUT_LEN {
                    return Err(IngestError::Evaluation {
                        rule: rule.name().to_owned(),
                        reason: format!(
                            "value for '{}' is {} bytes (max: {MAX_OUTPUT_LEN})",
                            action.field(),
                            value.len()
                        ),
                    });
                }
                ctx.fact.set_output(action.field(), value);
            }

            tracing::trace!(
                binding = ctx.binding,
                rule = rule.name(),
                description = rule.description(),
                salience = rule.salience(),
                cycle = ctx.cycles + 1,
                "rule fired"
            );

            if !rule.refires() {
                ctx.retracted[idx] = true;
            }
            ctx.fired.push(rule.name().to_owned());
            ctx.cycles += 1;
        }

        Ok(EvaluationReport {
            fired_rules: ctx.fired,
            cycles: ctx.cycles,
        })
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CYCLE)
    }
}
