//! 액션 값 템플릿
//!
//! Handlebars 문법의 `{{ ref }}` 자리표시자를 사용합니다.
//! `ref`는 팩트 경로(`labels.instance`, `Fact.playbook`) 또는 `limit_host` 헬퍼입니다.
//! `{{ limit_host() }}` 호출 표기도 헬퍼로 해석되며,
//! 같은 이름의 출력 필드는 `{{ Fact.limit_host }}`로 참조합니다.
//!
//! 참조는 룰 컴파일 시 검증됩니다. 렌더링 데이터에는 검증된 참조만 채워지고
//! 존재하지 않는 필드는 빈 문자열이 됩니다. 엄격 모드가 켜져 있어
//! 그 밖의 경로는 렌더링 에러가 됩니다.

use std::sync::LazyLock;

use handlebars::template::{Template as Compiled, TemplateElement};
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, no_escape};
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::fact::{Fact, FactPath, INSTANCE_LABEL, host_from_instance};

const TEMPLATE_NAME: &str = "action";
const LIMIT_HOST_HELPER: &str = "limit_host";

/// 헬퍼 전용 데이터 키. 팩트 경로로는 접근할 수 없습니다.
const HELPER_DATA: &str = "__alert";

/// `{{ limit_host() }}` / `{{ Fact.limit_host( ) }}` 호출 표기
static LIMIT_HOST_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?:Fact\.)?limit_host\(\s*\)\s*\}\}").expect("call pattern is valid")
});

/// 템플릿이 참조하는 팩트 경로
#[derive(Debug, Clone)]
struct Reference {
    segments: Vec<String>,
    path: FactPath,
}

/// 컴파일된 값 템플릿
#[derive(Debug, Clone)]
pub struct Template {
    registry: Handlebars<'static>,
    references: Vec<Reference>,
    uses_limit_host: bool,
}

impl Template {
    /// 템플릿 문자열을 컴파일합니다.
    ///
    /// # Errors
    /// 문법 오류(닫히지 않은 `{{` 등), 짝이 없는 `}}`, 알 수 없는 참조,
    /// 인자를 받는 헬퍼 호출, 블록/부분 템플릿은 사유 문자열과 함께 실패합니다.
    pub fn parse(source: &str) -> Result<Self, String> {
        let normalized = LIMIT_HOST_CALL.replace_all(source, "{{limit_host}}");
        let compiled = Compiled::compile(&normalized).map_err(|e| e.to_string())?;

        let mut references = Vec::new();
        let mut uses_limit_host = false;
        for element in &compiled.elements {
            match element {
                TemplateElement::RawString(text) => {
                    if text.contains("}}") {
                        return Err("unmatched '}}' in template".to_owned());
                    }
                }
                TemplateElement::Comment(_) => {}
                TemplateElement::Expression(expr) | TemplateElement::HtmlExpression(expr) => {
                    let name = expr
                        .name
                        .as_name()
                        .ok_or_else(|| "template reference must be a name".to_owned())?;
                    if !expr.params.is_empty() || !expr.hash.is_empty() {
                        return Err(format!("'{name}' does not take arguments"));
                    }
                    if name == LIMIT_HOST_HELPER {
                        uses_limit_host = true;
                    } else {
                        references.push(Reference::parse(name)?);
                    }
                }
                _ => return Err("only '{{ ref }}' placeholders are supported".to_owned()),
            }
        }

        // labels.a 와 labels.a.b 처럼 겹치는 참조를 거부
        let mut shape = Map::new();
        for reference in &references {
            insert_at(&mut shape, &reference.segments, String::new())?;
        }

        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        registry.register_helper(LIMIT_HOST_HELPER, Box::new(limit_host_helper));
        registry.register_template(TEMPLATE_NAME, compiled);

        Ok(Self {
            registry,
            references,
            uses_limit_host,
        })
    }

    /// 팩트 값을 대입하여 문자열을 생성합니다.
    ///
    /// # Errors
    /// 렌더링 실패 사유를 반환합니다.
    pub fn render(&self, fact: &Fact) -> Result<String, String> {
        let mut data = Map::new();
        for reference in &self.references {
            let value = fact.resolve(&reference.path).unwrap_or_default();
            insert_at(&mut data, &reference.segments, value.into_owned())?;
        }
        if self.uses_limit_host {
            data.insert(
                HELPER_DATA.to_owned(),
                json!({
                    "instance": fact.labels.get(INSTANCE_LABEL),
                    "fingerprint": fact.fingerprint,
                }),
            );
        }

        self.registry
            .render(TEMPLATE_NAME, &Value::Object(data))
            .map_err(|e| e.to_string())
    }
}

impl Reference {
    fn parse(raw: &str) -> Result<Self, String> {
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        let plain = segments.iter().all(|s| {
            !s.is_empty()
                && s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'))
        });

        match FactPath::parse(raw) {
            Some(path) if plain => Ok(Self { segments, path }),
            _ => Err(format!("unknown template reference '{raw}'")),
        }
    }
}

fn insert_at(
    map: &mut Map<String, Value>,
    segments: &[String],
    value: String,
) -> Result<(), String> {
    let Some((leaf, parents)) = segments.split_last() else {
        return Ok(());
    };

    let mut node = map;
    for segment in parents {
        let entry = node
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match entry {
            Value::Object(inner) => inner,
            _ => return Err(format!("conflicting template references at '{segment}'")),
        };
    }

    if matches!(node.get(leaf), Some(Value::Object(_))) {
        return Err(format!("conflicting template references at '{leaf}'"));
    }
    node.insert(leaf.clone(), Value::String(value));
    Ok(())
}

fn limit_host_helper(
    _: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let alert = &ctx.data()[HELPER_DATA];
    let host = host_from_instance(
        alert["instance"].as_str(),
        alert["fingerprint"].as_str().unwrap_or_default(),
    );
    out.write(&host)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::batch::Alert;
    use crate::fact::OutputField;

    fn fact() -> Fact {
        let labels = BTreeMap::from([
            ("alertname".to_owned(), "HighCPU".to_owned()),
            ("instance".to_owned(), "db01:9100".to_owned()),
            ("env".to_owned(), "prod".to_owned()),
        ]);
        Fact::from(Alert {
            labels,
            fingerprint: "fp-1".to_owned(),
            ..Default::default()
        })
    }

    fn render(source: &str, fact: &Fact) -> String {
        Template::parse(source).unwrap().render(fact).unwrap()
    }

    #[test]
    fn literal_only() {
        assert_eq!(render("playbooks/cpu.yml", &fact()), "playbooks/cpu.yml");
    }

    #[test]
    fn field_substitution() {
        assert_eq!(
            render("inventory/{{ labels.env }}/hosts", &fact()),
            "inventory/prod/hosts"
        );
        assert_eq!(render("{{Fact.labels.env}}-{{ fingerprint }}", &fact()), "prod-fp-1");
    }

    #[test]
    fn values_are_not_html_escaped() {
        let mut f = fact();
        f.labels.insert("query".to_owned(), "a<b & \"c\"".to_owned());
        assert_eq!(render("{{ labels.query }}", &f), "a<b & \"c\"");
    }

    #[test]
    fn limit_host_helper_and_call_forms() {
        assert_eq!(render("{{ limit_host() }}", &fact()), "db01");
        assert_eq!(render("{{Fact.limit_host( )}}", &fact()), "db01");
        assert_eq!(render("hosts:{{ limit_host }}", &fact()), "hosts:db01");
    }

    #[test]
    fn limit_host_without_instance_is_empty() {
        let mut f = fact();
        f.labels.remove("instance");
        assert_eq!(render("[{{ limit_host() }}]", &f), "[]");
    }

    #[test]
    fn missing_field_renders_empty() {
        assert_eq!(render("x-{{ labels.region }}-y", &fact()), "x--y");
    }

    #[test]
    fn output_field_reference_reads_current_value() {
        let mut f = fact();
        f.set_output(OutputField::Playbook, "p.yml".to_owned());
        f.set_output(OutputField::LimitHost, "web01".to_owned());
        assert_eq!(render("{{ playbook }}.bak", &f), "p.yml.bak");
        assert_eq!(render("{{ Fact.limit_host }}", &f), "web01");
    }

    #[test]
    fn malformed_templates_fail() {
        assert!(Template::parse("{{ labels.env").is_err());
        assert!(Template::parse("labels.env }}").is_err());
        assert!(Template::parse("{{ }}").is_err());
        assert!(Template::parse("{{ nonsense }}").is_err());
        assert!(Template::parse("{{ other_fn() }}").is_err());
    }

    #[test]
    fn handlebars_features_beyond_references_are_rejected() {
        for source in [
            "{{#if labels.env}}x{{/if}}",
            "{{> partial }}",
            "{{ limit_host labels.env }}",
            "{{ lookup labels \"env\" }}",
            "{{ this }}",
            "{{ ../labels.env }}",
            "{{ @root.labels.env }}",
        ] {
            assert!(Template::parse(source).is_err(), "{source}");
        }
    }

    #[test]
    fn overlapping_references_are_rejected() {
        let err = Template::parse("{{ labels.a }}{{ labels.a.b }}").unwrap_err();
        assert!(err.contains("conflicting"), "{err}");
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(render("a{{! note }}b", &fact()), "ab");
    }
}
