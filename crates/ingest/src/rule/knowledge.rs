//! 지식 베이스 -- 컴파일된 불변 룰 세트
//!
//! 프로세스 시작 시 한 번 생성되어 `Arc`로 모든 평가에 공유됩니다.
//! 생성 이후 변경 API가 없으므로 동시 읽기에 잠금이 필요 없습니다.

use std::path::Path;

use semver::Version;

use super::loader::RuleLoader;
use super::matcher::{self, CompiledCondition};
use super::template::Template;
use super::types::{RuleDefinition, RuleSetDefinition};
use crate::error::IngestError;
use crate::fact::{Fact, OutputField};

/// 컴파일된 액션
#[derive(Debug, Clone)]
pub struct CompiledAction {
    field: OutputField,
    template: Template,
}

impl CompiledAction {
    /// 대상 출력 필드
    pub fn field(&self) -> OutputField {
        self.field
    }

    /// 팩트 값으로 템플릿을 렌더링합니다.
    ///
    /// # Errors
    /// 렌더링 실패 사유를 반환합니다.
    pub fn render(&self, fact: &Fact) -> Result<String, String> {
        self.template.render(fact)
    }
}

/// 컴파일된 룰
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    description: String,
    salience: i32,
    enabled: bool,
    refire: bool,
    conditions: Vec<CompiledCondition>,
    actions: Vec<CompiledAction>,
}

impl CompiledRule {
    fn compile(def: &RuleDefinition) -> Result<Self, IngestError> {
        let conditions = def
            .when
            .iter()
            .enumerate()
            .map(|(idx, c)| CompiledCondition::compile(&def.name, idx, c))
            .collect::<Result<Vec<_>, _>>()?;

        let actions = def
            .then
            .iter()
            .enumerate()
            .map(|(idx, a)| {
                Template::parse(&a.value)
                    .map(|template| CompiledAction {
                        field: a.set,
                        template,
                    })
                    .map_err(|reason| IngestError::RuleValidation {
                        rule: def.name.clone(),
                        reason: format!("invalid template in action[{idx}]: {reason}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: def.name.clone(),
            description: def.description.clone(),
            salience: def.salience,
            enabled: def.is_enabled(),
            refire: def.refire,
            conditions,
            actions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn salience(&self) -> i32 {
        self.salience
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 발화 후 철회되지 않는 룰인지 확인합니다.
    pub fn refires(&self) -> bool {
        self.refire
    }

    /// 모든 조건이 팩트에 매칭되는지 평가합니다.
    pub fn matches(&self, fact: &Fact) -> bool {
        matcher::all_match(&self.conditions, fact)
    }

    pub fn actions(&self) -> &[CompiledAction] {
        &self.actions
    }
}

/// 지식 베이스
///
/// 룰은 salience 내림차순, 동일 salience는 선언 순서로 정렬되어 저장됩니다.
#[derive(Debug)]
pub struct KnowledgeBase {
    name: String,
    version: Version,
    rules: Vec<CompiledRule>,
}

impl KnowledgeBase {
    /// 룰 세트 정의를 컴파일합니다.
    ///
    /// # Errors
    /// 버전이 semver가 아니거나, 정규식/템플릿/필드 경로가 잘못된 경우
    /// [`IngestError::RuleValidation`]
    pub fn compile(def: &RuleSetDefinition) -> Result<Self, IngestError> {
        let version = Version::parse(def.version.trim()).map_err(|e| {
            IngestError::RuleValidation {
                rule: "(knowledge base)".to_owned(),
                reason: format!("invalid version '{}': {e}", def.version),
            }
        })?;

        let mut rules = def
            .rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        // 안정 정렬이므로 동일 salience는 선언 순서 유지
        rules.sort_by(|a, b| b.salience.cmp(&a.salience));

        Ok(Self {
            name: def.name.clone(),
            version,
            rules,
        })
    }

    /// YAML 문자열에서 지식 베이스를 생성합니다.
    pub fn from_yaml(yaml: &str, source: &str) -> Result<Self, IngestError> {
        let def = RuleLoader::parse_yaml(yaml, source)?;
        Self::compile(&def)
    }

    /// 룰 파일에서 지식 베이스를 생성합니다.
    ///
    /// 실패는 모두 치명적이며, 호출자는 리스너를 시작하지 않아야 합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let def = RuleLoader::load_file(path).await?;
        let kb = Self::compile(&def)?;

        tracing::info!(
            path = %path.display(),
            name = %kb.name,
            version = %kb.version,
            rules = kb.rules.len(),
            enabled = kb.enabled_rule_count(),
            "knowledge base loaded"
        );

        Ok(kb)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// 평가 순서로 정렬된 룰 목록
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn enabled_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
name: AlertRules
version: 0.0.1
rules:
  - name: Fallback
    then:
      - set: inventory_file
        value: inventory/default
  - name: HighCpu
    salience: 10
    when:
      - field: labels.alertname
        value: HighCPU
    then:
      - set: playbook
        value: playbooks/cpu.yml
  - name: AlsoZero
    status: disabled
    then:
      - set: playbook
        value: never
"#;

    #[test]
    fn compiles_and_orders_by_salience() {
        let kb = KnowledgeBase::from_yaml(RULES, "rules.yml").unwrap();
        assert_eq!(kb.name(), "AlertRules");
        assert_eq!(kb.version(), &Version::new(0, 0, 1));
        let names: Vec<_> = kb.rules().iter().map(CompiledRule::name).collect();
        assert_eq!(names, ["HighCpu", "Fallback", "AlsoZero"]);
        assert_eq!(kb.rule_count(), 3);
        assert_eq!(kb.enabled_rule_count(), 2);
    }

    #[test]
    fn invalid_version_fails() {
        let yaml = RULES.replace("version: 0.0.1", "version: latest");
        let err = KnowledgeBase::from_yaml(&yaml, "rules.yml").unwrap_err();
        assert!(err.to_string().contains("invalid version"));
    }

    #[test]
    fn invalid_template_fails() {
        let yaml = RULES.replace("inventory/default", "\"{{ labels.env\"");
        let err = KnowledgeBase::from_yaml(&yaml, "rules.yml").unwrap_err();
        assert!(matches!(err, IngestError::RuleValidation { ref rule, .. } if rule == "Fallback"));
    }

    #[test]
    fn block_helper_in_template_fails() {
        let yaml = RULES.replace("inventory/default", "\"{{#each labels}}{{this}}{{/each}}\"");
        let err = KnowledgeBase::from_yaml(&yaml, "rules.yml").unwrap_err();
        assert!(err.to_string().contains("invalid template in action[0]"), "{err}");
    }

    #[test]
    fn empty_rule_set_is_valid() {
        let kb = KnowledgeBase::from_yaml("name: Empty\nversion: 1.0.0\nrules: []", "e.yml").unwrap();
        assert_eq!(kb.rule_count(), 0);
    }

    #[tokio::test]
    async fn load_missing_file_is_fatal() {
        let err = KnowledgeBase::load("/nonexistent/rules.yml").await.unwrap_err();
        assert_eq!(err.scope(), crate::error::ErrorScope::Startup);
    }
}
