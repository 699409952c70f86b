//! 선언형 룰 엔진 -- YAML 룰로 팩트에 운영 메타데이터를 부여
//!
//! 수집 코어는 두 진입점만 사용합니다.
//! - 시작 시 [`KnowledgeBase::load`] (컴파일)
//! - 팩트마다 [`RuleEngine::execute`] (실행)
//!
//! # 룰 형식
//! ```yaml
//! name: AlertRules
//! version: 0.0.1
//! rules:
//!   - name: HighCpuPlaybook
//!     salience: 10
//!     when:
//!       - field: labels.alertname
//!         modifier: exact
//!         value: HighCPU
//!     then:
//!       - set: playbook
//!         value: playbooks/cpu.yml
//!       - set: limit_host
//!         value: "{{ limit_host() }}"
//! ```
//!
//! # 아키텍처
//! - [`types`]: YAML 룰 정의 구조체
//! - [`loader`]: 파일 로딩 및 정의 검증
//! - [`matcher`]: 조건 컴파일 및 매칭 (exact, contains, regex 등)
//! - [`template`]: 액션 값 템플릿
//! - [`knowledge`]: 컴파일된 불변 지식 베이스
//! - [`engine`]: 평가 컨텍스트와 발화 루프

pub mod engine;
pub mod knowledge;
pub mod loader;
pub mod matcher;
pub mod template;
pub mod types;

pub use engine::{DEFAULT_MAX_CYCLE, EvaluationContext, EvaluationReport, RuleEngine};
pub use knowledge::{CompiledAction, CompiledRule, KnowledgeBase};
pub use loader::RuleLoader;
pub use matcher::CompiledCondition;
pub use template::Template;
pub use types::{
    ActionDefinition, ConditionModifier, FieldCondition, RuleDefinition, RuleSetDefinition,
    RuleStatus,
};
