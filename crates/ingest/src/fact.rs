//! 팩트 모델 -- 룰 평가에 전달되는 알림 단위 가변 레코드
//!
//! [`Fact`]는 [`Alert`]의 모든 필드와 룰이 채우는 세 출력 필드
//! (playbook, inventory_file, limit_host)를 가집니다.
//! 요청마다 새로 생성되고 하나의 평가에만 배타적으로 전달됩니다.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::batch::{ALERT_NAME_LABEL, Alert, Annotations};

/// 평가 컨텍스트에서 팩트를 바인딩하는 고정 이름
pub const FACT_BINDING: &str = "Fact";

/// 호스트 추출 대상 레이블
pub const INSTANCE_LABEL: &str = "instance";

/// `host:port` 형식. 호스트에 콜론이 올 수 없으므로 IPv6 주소는 매칭되지 않습니다.
static HOST_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9./_-]+):([0-9]{2,5})$").expect("host/port pattern is valid")
});

/// 룰이 설정할 수 있는 출력 필드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    /// 대응 플레이북 경로
    Playbook,
    /// 인벤토리 파일 경로
    InventoryFile,
    /// 작업 대상 호스트
    LimitHost,
}

impl OutputField {
    /// 필드 경로 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playbook => "playbook",
            Self::InventoryFile => "inventory_file",
            Self::LimitHost => "limit_host",
        }
    }
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 평가 결과 출력 필드 (값 복사본)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactOutputs {
    pub playbook: String,
    pub inventory_file: String,
    pub limit_host: String,
}

impl FactOutputs {
    /// 모든 출력이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.playbook.is_empty() && self.inventory_file.is_empty() && self.limit_host.is_empty()
    }
}

/// 팩트 필드 경로
///
/// 룰 조건과 템플릿이 참조하는 경로를 컴파일 시점에 해석한 형태입니다.
/// `Fact.` 접두어는 선택 사항입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactPath {
    Status,
    Fingerprint,
    GeneratorUrl,
    StartsAt,
    EndsAt,
    /// `labels.<name>`
    Label(String),
    Description,
    Summary,
    /// `annotations.<name>`
    Annotation(String),
    /// 룰이 설정한 출력 필드
    Output(OutputField),
}

impl FactPath {
    /// 경로 문자열을 해석합니다. 알 수 없는 경로는 `None`을 반환합니다.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim();
        let path = path
            .strip_prefix(FACT_BINDING)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(path);

        if let Some(name) = path.strip_prefix("labels.") {
            return (!name.is_empty()).then(|| Self::Label(name.to_owned()));
        }

        if let Some(name) = path.strip_prefix("annotations.") {
            return match name {
                "" => None,
                "description" => Some(Self::Description),
                "summary" => Some(Self::Summary),
                other => Some(Self::Annotation(other.to_owned())),
            };
        }

        match path {
            "status" => Some(Self::Status),
            "fingerprint" => Some(Self::Fingerprint),
            "generator_url" => Some(Self::GeneratorUrl),
            "starts_at" => Some(Self::StartsAt),
            "ends_at" => Some(Self::EndsAt),
            "playbook" => Some(Self::Output(OutputField::Playbook)),
            "inventory_file" => Some(Self::Output(OutputField::InventoryFile)),
            "limit_host" => Some(Self::Output(OutputField::LimitHost)),
            _ => None,
        }
    }
}

impl fmt::Display for FactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => f.write_str("status"),
            Self::Fingerprint => f.write_str("fingerprint"),
            Self::GeneratorUrl => f.write_str("generator_url"),
            Self::StartsAt => f.write_str("starts_at"),
            Self::EndsAt => f.write_str("ends_at"),
            Self::Label(name) => write!(f, "labels.{name}"),
            Self::Description => f.write_str("annotations.description"),
            Self::Summary => f.write_str("annotations.summary"),
            Self::Annotation(name) => write!(f, "annotations.{name}"),
            Self::Output(field) => write!(f, "{field}"),
        }
    }
}

/// 알림 팩트
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: Annotations,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub generator_url: String,
    pub fingerprint: String,
    #[serde(flatten)]
    outputs: FactOutputs,
}

impl From<Alert> for Fact {
    fn from(alert: Alert) -> Self {
        Self {
            status: alert.status,
            labels: alert.labels,
            annotations: alert.annotations,
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url,
            fingerprint: alert.fingerprint,
            outputs: FactOutputs::default(),
        }
    }
}

impl Fact {
    /// `alertname` 레이블 값을 반환합니다. 없으면 빈 문자열입니다.
    pub fn alert_name(&self) -> &str {
        self.labels
            .get(ALERT_NAME_LABEL)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// `instance` 레이블에서 포트를 제외한 호스트 부분을 추출합니다.
    ///
    /// - 레이블 없음 → 빈 문자열 (로그 없음)
    /// - `host:port` 형식 → `host`
    /// - 그 외 → 경고 로그 후 빈 문자열
    ///
    /// 출력 필드를 변경하지 않습니다.
    pub fn limit_host(&self) -> String {
        host_from_instance(
            self.labels.get(INSTANCE_LABEL).map(String::as_str),
            &self.fingerprint,
        )
    }

    /// 경로 문자열로 필드 값을 조회합니다.
    pub fn field(&self, path: &str) -> Option<Cow<'_, str>> {
        FactPath::parse(path).and_then(|p| self.resolve(&p))
    }

    /// 해석된 경로로 필드 값을 조회합니다.
    ///
    /// 존재하지 않는 레이블/어노테이션과 설정되지 않은 타임스탬프는 `None`입니다.
    pub fn resolve(&self, path: &FactPath) -> Option<Cow<'_, str>> {
        match path {
            FactPath::Status => Some(Cow::Borrowed(&self.status)),
            FactPath::Fingerprint => Some(Cow::Borrowed(&self.fingerprint)),
            FactPath::GeneratorUrl => Some(Cow::Borrowed(&self.generator_url)),
            FactPath::StartsAt => self.starts_at.map(|t| Cow::Owned(rfc3339(t))),
            FactPath::EndsAt => self.ends_at.map(|t| Cow::Owned(rfc3339(t))),
            FactPath::Label(name) => self.labels.get(name).map(|v| Cow::Borrowed(v.as_str())),
            FactPath::Description => Some(Cow::Borrowed(&self.annotations.description)),
            FactPath::Summary => Some(Cow::Borrowed(&self.annotations.summary)),
            FactPath::Annotation(name) => self
                .annotations
                .extra
                .get(name)
                .map(|v| Cow::Borrowed(v.as_str())),
            FactPath::Output(field) => Some(Cow::Borrowed(self.output(*field))),
        }
    }

    /// 출력 필드 값을 반환합니다.
    pub fn output(&self, field: OutputField) -> &str {
        match field {
            OutputField::Playbook => &self.outputs.playbook,
            OutputField::InventoryFile => &self.outputs.inventory_file,
            OutputField::LimitHost => &self.outputs.limit_host,
        }
    }

    /// 출력 필드를 설정합니다.
    pub fn set_output(&mut self, field: OutputField, value: String) {
        let slot = match field {
            OutputField::Playbook => &mut self.outputs.playbook,
            OutputField::InventoryFile => &mut self.outputs.inventory_file,
            OutputField::LimitHost => &mut self.outputs.limit_host,
        };
        *slot = value;
    }

    /// 출력 필드의 값 복사본을 반환합니다.
    pub fn outputs(&self) -> FactOutputs {
        self.outputs.clone()
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// `instance` 레이블 값에서 호스트를 추출합니다. [`Fact::limit_host`]와
/// 템플릿의 `limit_host` 헬퍼가 공유합니다.
pub(crate) fn host_from_instance(instance: Option<&str>, fingerprint: &str) -> String {
    let Some(instance) = instance else {
        return String::new();
    };

    match split_host_port(instance) {
        Some(host) => host.to_owned(),
        None => {
            tracing::warn!(
                fingerprint = %fingerprint,
                instance = %instance,
                "could not match host/port in alert instance label"
            );
            String::new()
        }
    }
}

fn split_host_port(instance: &str) -> Option<&str> {
    HOST_PORT
        .captures(instance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact_with_instance(instance: Option<&str>) -> Fact {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_owned(), "HighCPU".to_owned());
        if let Some(i) = instance {
            labels.insert("instance".to_owned(), i.to_owned());
        }
        Fact::from(Alert {
            status: "firing".to_owned(),
            labels,
            fingerprint: "fp-1".to_owned(),
            ..Default::default()
        })
    }

    #[test]
    fn limit_host_strips_port() {
        assert_eq!(fact_with_instance(Some("db01:9100")).limit_host(), "db01");
        assert_eq!(
            fact_with_instance(Some("node-1.example.com:9100")).limit_host(),
            "node-1.example.com"
        );
        assert_eq!(
            fact_with_instance(Some("10.0.0.5:80")).limit_host(),
            "10.0.0.5"
        );
    }

    #[test]
    fn limit_host_rejects_non_matching_shapes() {
        for bad in ["db01", "db01:1", "db01:123456", "db01:port", ":9100", "[::1]:9100", "a b:80"] {
            assert_eq!(fact_with_instance(Some(bad)).limit_host(), "", "{bad}");
        }
    }

    #[test]
    fn host_port_pattern_is_anchored() {
        assert_eq!(split_host_port("db01:9100"), Some("db01"));
        assert_eq!(split_host_port("db01:9100\n"), None);
        assert_eq!(split_host_port(" db01:9100"), None);
        assert_eq!(split_host_port("db01:9100:80"), None);
        assert_eq!(split_host_port("a/b_c-d.e:65535"), Some("a/b_c-d.e"));
    }

    #[test]
    fn absent_instance_is_empty_without_fact() {
        assert_eq!(host_from_instance(None, "fp"), "");
        assert_eq!(host_from_instance(Some("web:8080"), "fp"), "web");
    }

    #[test]
    fn limit_host_absent_label_is_empty() {
        assert_eq!(fact_with_instance(None).limit_host(), "");
    }

    #[test]
    fn limit_host_does_not_touch_outputs() {
        let fact = fact_with_instance(Some("db01:9100"));
        let _ = fact.limit_host();
        assert!(fact.outputs().is_empty());
    }

    #[test]
    fn field_paths_resolve() {
        let fact = fact_with_instance(Some("db01:9100"));
        assert_eq!(fact.field("labels.alertname").as_deref(), Some("HighCPU"));
        assert_eq!(fact.field("Fact.labels.instance").as_deref(), Some("db01:9100"));
        assert_eq!(fact.field("status").as_deref(), Some("firing"));
        assert_eq!(fact.field("fingerprint").as_deref(), Some("fp-1"));
        assert_eq!(fact.field("playbook").as_deref(), Some(""));
        assert!(fact.field("labels.missing").is_none());
        assert!(fact.field("starts_at").is_none());
        assert!(fact.field("nonsense").is_none());
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        let mut fact = fact_with_instance(None);
        fact.starts_at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .ok()
            .map(|t| t.with_timezone(&Utc));
        assert_eq!(
            fact.field("starts_at").as_deref(),
            Some("2024-03-01T10:00:00Z")
        );
    }

    #[test]
    fn path_parse_handles_prefix_and_annotations() {
        assert_eq!(FactPath::parse("Fact.summary"), None);
        assert_eq!(
            FactPath::parse("Fact.annotations.summary"),
            Some(FactPath::Summary)
        );
        assert_eq!(
            FactPath::parse("annotations.runbook"),
            Some(FactPath::Annotation("runbook".to_owned()))
        );
        assert_eq!(FactPath::parse("labels."), None);
        assert_eq!(
            FactPath::parse("limit_host"),
            Some(FactPath::Output(OutputField::LimitHost))
        );
    }

    #[test]
    fn set_output_and_copy() {
        let mut fact = fact_with_instance(None);
        fact.set_output(OutputField::Playbook, "playbooks/cpu.yml".to_owned());
        let outputs = fact.outputs();
        fact.set_output(OutputField::Playbook, "changed".to_owned());
        assert_eq!(outputs.playbook, "playbooks/cpu.yml");
        assert_eq!(fact.output(OutputField::Playbook), "changed");
    }

    #[test]
    fn serialized_fact_flattens_outputs() {
        let mut fact = fact_with_instance(None);
        fact.set_output(OutputField::InventoryFile, "inventory/prod".to_owned());
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["inventory_file"], "inventory/prod");
        assert_eq!(json["labels"]["alertname"], "HighCPU");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use regex::Regex;

        proptest! {
            #[test]
            fn host_port_matches_reference_pattern(instance in "[a-z0-9.:/_ -]{0,24}") {
                let reference = Regex::new(r"^([a-zA-Z0-9./\-_]+):([0-9]{2,5})$").unwrap();
                let expected = reference
                    .captures(&instance)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str());
                prop_assert_eq!(split_host_port(&instance), expected);
            }

            #[test]
            fn well_formed_instance_yields_host(
                host in "[a-zA-Z0-9._-][a-zA-Z0-9./_-]{0,30}",
                port in 10u32..=65535,
            ) {
                let fact = fact_with_instance(Some(&format!("{host}:{port}")));
                prop_assert_eq!(fact.limit_host(), host);
            }
        }
    }
}
