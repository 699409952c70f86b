//! 알림 배치 파서
//!
//! Alertmanager 웹훅 본문(JSON)을 [`AlertBatch`]로 역직렬화합니다.
//! 알 수 없는 필드는 무시하며, `alertname` 레이블이 없는 알림이 하나라도 있으면
//! 배치 전체를 거부합니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// 필수 레이블 키
pub const ALERT_NAME_LABEL: &str = "alertname";

/// 웹훅 1회 전송분
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertBatch {
    /// 수신자 이름
    #[serde(default)]
    pub receiver: String,
    /// 그룹 상태 (firing / resolved)
    #[serde(default)]
    pub status: String,
    /// 알림 목록 (전송 순서 유지)
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Alertmanager 외부 URL
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    /// 페이로드 버전
    #[serde(default)]
    pub version: String,
    /// 그룹 키
    #[serde(default)]
    pub group_key: String,
    /// 잘려서 전송되지 않은 알림 수
    #[serde(default)]
    pub truncated_alerts: u64,
    #[serde(default)]
    pub group_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,
}

/// 개별 알림 레코드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// 알림 상태 (firing / resolved)
    #[serde(default)]
    pub status: String,
    /// 레이블 (키 유일)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl Alert {
    /// `alertname` 레이블 값을 반환합니다.
    pub fn alert_name(&self) -> Option<&str> {
        self.labels.get(ALERT_NAME_LABEL).map(String::as_str)
    }
}

/// 알림 어노테이션
///
/// `description`, `summary` 외의 키는 `extra`에 보관됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// 배치 파서
///
/// 상태를 갖지 않으며 요청 간에 공유해도 안전합니다.
#[derive(Debug, Clone)]
pub struct BatchParser {
    max_alerts: usize,
}

impl BatchParser {
    /// 배치당 최대 알림 수를 지정하여 파서를 생성합니다.
    pub fn new(max_alerts: usize) -> Self {
        Self { max_alerts }
    }

    /// 원시 바이트를 배치로 파싱합니다.
    ///
    /// # Errors
    /// - JSON 구조 오류 또는 타입 불일치 → [`IngestError::Parse`]
    /// - 알림 수가 최대치를 초과 → [`IngestError::Parse`]
    /// - `alertname` 레이블 누락 → [`IngestError::MissingAlertName`]
    pub fn parse(&self, bytes: &[u8]) -> Result<AlertBatch, IngestError> {
        let batch: AlertBatch = serde_json::from_slice(bytes).map_err(|e| IngestError::Parse {
            line: e.line(),
            column: e.column(),
            reason: e.to_string(),
        })?;

        if batch.alerts.len() > self.max_alerts {
            return Err(IngestError::Parse {
                line: 0,
                column: 0,
                reason: format!(
                    "batch holds {} alerts (max: {})",
                    batch.alerts.len(),
                    self.max_alerts
                ),
            });
        }

        if let Some((index, alert)) = batch
            .alerts
            .iter()
            .enumerate()
            .find(|(_, alert)| alert.alert_name().is_none())
        {
            return Err(IngestError::MissingAlertName {
                index,
                fingerprint: alert.fingerprint.clone(),
            });
        }

        tracing::debug!(
            receiver = %batch.receiver,
            group_key = %batch.group_key,
            alerts = batch.alerts.len(),
            "parsed alert batch"
        );

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  "receiver": "webhook",
  "status": "firing",
  "alerts": [
    {
      "status": "firing",
      "labels": {"alertname": "HighCPU", "instance": "db01:9100", "severity": "critical"},
      "annotations": {"description": "cpu above 90%", "summary": "high cpu", "runbook": "https://runbooks/cpu"},
      "startsAt": "2024-03-01T10:00:00.000Z",
      "endsAt": "0001-01-01T00:00:00Z",
      "generatorURL": "http://prometheus:9090/graph",
      "fingerprint": "a1b2c3"
    }
  ],
  "groupLabels": {"alertname": "HighCPU"},
  "commonLabels": {"alertname": "HighCPU"},
  "commonAnnotations": {},
  "externalURL": "http://alertmanager:9093",
  "version": "4",
  "groupKey": "{}:{alertname=\"HighCPU\"}",
  "truncatedAlerts": 0,
  "unknownField": true
}"#;

    #[test]
    fn parses_alertmanager_payload() {
        let batch = BatchParser::new(10).parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(batch.receiver, "webhook");
        assert_eq!(batch.external_url, "http://alertmanager:9093");
        assert_eq!(batch.version, "4");
        assert_eq!(batch.alerts.len(), 1);

        let alert = &batch.alerts[0];
        assert_eq!(alert.alert_name(), Some("HighCPU"));
        assert_eq!(alert.generator_url, "http://prometheus:9090/graph");
        assert_eq!(alert.annotations.summary, "high cpu");
        assert_eq!(
            alert.annotations.extra.get("runbook").map(String::as_str),
            Some("https://runbooks/cpu")
        );
        assert!(alert.starts_at.is_some());
    }

    #[test]
    fn empty_alert_list_is_valid() {
        let batch = BatchParser::new(10)
            .parse(br#"{"receiver":"r","alerts":[]}"#)
            .unwrap();
        assert!(batch.alerts.is_empty());
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = BatchParser::new(10)
            .parse(b"{\n  \"alerts\": [ oops ]\n}")
            .unwrap_err();
        match err {
            IngestError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_parse_error() {
        let err = BatchParser::new(10)
            .parse(br#"{"alerts": {"not": "a list"}}"#)
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }

    #[test]
    fn missing_alertname_rejects_batch() {
        let body = br#"{"alerts": [
            {"labels": {"alertname": "A"}, "fingerprint": "f0"},
            {"labels": {"instance": "db01:9100"}, "fingerprint": "f1"}
        ]}"#;
        let err = BatchParser::new(10).parse(body).unwrap_err();
        match err {
            IngestError::MissingAlertName { index, fingerprint } => {
                assert_eq!(index, 1);
                assert_eq!(fingerprint, "f1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn too_many_alerts_rejected() {
        let body = br#"{"alerts": [
            {"labels": {"alertname": "A"}},
            {"labels": {"alertname": "B"}},
            {"labels": {"alertname": "C"}}
        ]}"#;
        let err = BatchParser::new(2).parse(body).unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
        assert!(err.to_string().contains("max: 2"));
    }
}
