//! 평가 디스패처 -- 배치의 각 알림을 팩트로 만들어 룰 엔진에 전달합니다.
//!
//! 알림은 배치 순서대로 하나씩 평가됩니다. 평가마다 새 컨텍스트를 만들며,
//! 한 알림의 평가 실패는 해당 알림에만 기록되고 나머지는 계속 진행됩니다.
//! 지식 베이스는 읽기만 합니다.
//!
//! 평가([`Dispatcher::evaluate_batch`])는 동기 함수라 블로킹 스레드에서 실행할 수 있고,
//! 하류 채널 전달([`Dispatcher::forward_batch`])은 비동기로 분리되어 있습니다.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::mpsc;

use ironhook_core::metrics as m;

use crate::batch::AlertBatch;
use crate::error::IngestError;
use crate::fact::Fact;
use crate::rule::{EvaluationContext, EvaluationReport, KnowledgeBase, RuleEngine};

/// 평가가 끝난 팩트
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedFact {
    /// 평가 후 팩트 (출력 필드 포함)
    pub fact: Fact,
    /// 발화 순서대로 기록된 룰 이름
    pub fired_rules: Vec<String>,
    /// 알림 단위 평가 에러 메시지
    pub error: Option<String>,
}

impl EvaluatedFact {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 배치 평가 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub receiver: String,
    pub group_key: String,
    /// 배치 순서대로 정렬된 평가 결과
    pub facts: Vec<EvaluatedFact>,
}

impl BatchOutcome {
    /// 평가 성공 수
    pub fn evaluated(&self) -> usize {
        self.facts.iter().filter(|f| f.is_success()).count()
    }

    /// 평가 실패 수
    pub fn failed(&self) -> usize {
        self.facts.len() - self.evaluated()
    }
}

/// 평가 디스패처
///
/// 공유 지식 베이스와 상태 없는 엔진 설정만 가지므로 복제해서 요청마다 사용합니다.
#[derive(Clone)]
pub struct Dispatcher {
    kb: Arc<KnowledgeBase>,
    engine: RuleEngine,
    fact_tx: Option<mpsc::Sender<EvaluatedFact>>,
}

impl Dispatcher {
    /// 새 디스패처를 생성합니다.
    pub fn new(kb: Arc<KnowledgeBase>, engine: RuleEngine) -> Self {
        Self {
            kb,
            engine,
            fact_tx: None,
        }
    }

    /// 평가된 팩트를 전달할 채널을 설정합니다.
    pub fn with_fact_sender(mut self, tx: mpsc::Sender<EvaluatedFact>) -> Self {
        self.fact_tx = Some(tx);
        self
    }

    /// 공유 지식 베이스
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    /// 팩트 1개를 평가합니다.
    ///
    /// 새 [`EvaluationContext`]에 팩트를 바인딩하고 엔진을 실행합니다.
    /// 에러가 나더라도 지식 베이스는 변경되지 않습니다.
    pub fn evaluate(&self, fact: &mut Fact) -> Result<EvaluationReport, IngestError> {
        let started = Instant::now();
        let ctx = EvaluationContext::bind(&self.kb, fact);
        let result = self.engine.execute(ctx);
        histogram!(m::INGEST_EVALUATION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => {
                for rule in &report.fired_rules {
                    counter!(m::INGEST_RULES_FIRED_TOTAL, m::LABEL_RULE => rule.clone())
                        .increment(1);
                }
                counter!(m::INGEST_ALERTS_EVALUATED_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
            }
            Err(_) => {
                counter!(m::INGEST_ALERTS_EVALUATED_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                counter!(m::INGEST_EVALUATION_ERRORS_TOTAL).increment(1);
            }
        }

        result
    }

    /// 배치의 모든 알림을 순서대로 평가합니다.
    ///
    /// 알림 단위 실패는 [`EvaluatedFact::error`]에 기록되며 배치 처리는 중단되지 않습니다.
    pub fn evaluate_batch(&self, batch: AlertBatch) -> BatchOutcome {
        let AlertBatch {
            receiver,
            group_key,
            alerts,
            ..
        } = batch;

        counter!(m::INGEST_ALERTS_RECEIVED_TOTAL).increment(alerts.len() as u64);

        let mut facts = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let mut fact = Fact::from(alert);

            tracing::debug!(
                alertname = fact.alert_name(),
                status = %fact.status,
                fingerprint = %fact.fingerprint,
                "evaluating fact"
            );

            let evaluated = match self.evaluate(&mut fact) {
                Ok(report) => {
                    let outputs = fact.outputs();
                    tracing::info!(
                        alertname = fact.alert_name(),
                        fingerprint = %fact.fingerprint,
                        playbook = %outputs.playbook,
                        inventory_file = %outputs.inventory_file,
                        limit_host = %outputs.limit_host,
                        fired = report.fired_rules.len(),
                        "fact evaluated"
                    );
                    EvaluatedFact {
                        fact,
                        fired_rules: report.fired_rules,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        alertname = fact.alert_name(),
                        fingerprint = %fact.fingerprint,
                        scope = e.scope().as_str(),
                        error = %e,
                        "fact evaluation failed"
                    );
                    EvaluatedFact {
                        fact,
                        fired_rules: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };

            facts.push(evaluated);
        }

        BatchOutcome {
            receiver,
            group_key,
            facts,
        }
    }

    /// 평가된 팩트를 배치 순서대로 하류 채널에 전달합니다.
    ///
    /// 채널이 가득 차면 대기하고, 수신측이 닫혀 있으면 경고만 남깁니다.
    pub async fn forward_batch(&self, outcome: &BatchOutcome) {
        let Some(tx) = &self.fact_tx else {
            return;
        };

        for evaluated in &outcome.facts {
            if tx.send(evaluated.clone()).await.is_err() {
                tracing::warn!(
                    fingerprint = %evaluated.fact.fingerprint,
                    "fact receiver dropped, evaluated fact not forwarded"
                );
                return;
            }
        }
    }
}
