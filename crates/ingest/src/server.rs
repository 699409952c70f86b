//! 웹훅 리스너 -- HTTP 수신부터 평가 응답까지의 전체 흐름을 관리합니다.
//!
//! [`IngestServer`]는 core의 [`Pipeline`] trait을 구현하여
//! `ironhook-daemon`에서 시작/정지/헬스 체크 생명주기로 관리됩니다.
//!
//! # 요청 처리 흐름
//! ```text
//! POST /alerts -> body limit -> TransportDecoder -> BatchParser -> Dispatcher -> JSON 응답
//! ```
//!
//! 압축 해제, 파싱, 룰 평가는 CPU 작업이므로 `spawn_blocking`으로 런타임 워커 밖에서 실행하고,
//! 하류 채널 전달만 비동기 태스크에서 수행합니다.
//!
//! # 상태 전이
//! ```text
//! Stopped -> Starting (bind) -> Serving -> Stopped (stop)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use axum::Router;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use ironhook_core::config::HEALTH_PATH;
use ironhook_core::error::{IronhookError, PipelineError};
use ironhook_core::metrics as m;
use ironhook_core::pipeline::{HealthStatus, Pipeline};

use crate::batch::BatchParser;
use crate::config::IngestConfig;
use crate::decoder::{ContentEncoding, TransportDecoder};
use crate::dispatcher::{Dispatcher, EvaluatedFact};
use crate::error::IngestError;
use crate::rule::{KnowledgeBase, RuleEngine};

/// 리스너 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    /// 바인드 전 또는 정지 완료
    Stopped,
    /// 소켓 바인드 중
    Starting,
    /// 요청 처리 중
    Serving,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Serving => "serving",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Serving,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Serving => 2,
        }
    }
}

/// 핸들러와 서버가 공유하는 리스너 상태 셀
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ListenerState::Stopped.as_u8())))
    }

    fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ListenerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// 요청 핸들러 공유 상태
///
/// 지식 베이스(`Arc`)와 상태 없는 구성 요소만 보관하므로 요청 경로에 잠금이 없습니다.
struct AppState {
    decoder: TransportDecoder,
    parser: BatchParser,
    dispatcher: Dispatcher,
    max_body_bytes: usize,
    listener_state: StateCell,
}

/// 웹훅 처리 성공 응답
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub receiver: String,
    pub group_key: String,
    /// 배치의 알림 수
    pub alerts: usize,
    /// 평가 성공 수
    pub evaluated: usize,
    /// 알림 단위 평가 실패 수
    pub failed: usize,
}

/// 헬스 응답의 지식 베이스 요약
#[derive(Debug, Serialize)]
struct KnowledgeBaseSummary {
    name: String,
    version: String,
    rules: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    state: ListenerState,
    knowledge_base: KnowledgeBaseSummary,
}

/// 웹훅 수신 핸들러
async fn receive_alerts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<IngestResponse>, IngestError> {
    let span = tracing::info_span!("webhook", request_id = %Uuid::new_v4());

    async move {
        counter!(m::INGEST_REQUESTS_TOTAL).increment(1);

        match process(&state, &headers, body).await {
            Ok(response) => {
                tracing::info!(
                    receiver = %response.receiver,
                    alerts = response.alerts,
                    evaluated = response.evaluated,
                    failed = response.failed,
                    "finished processing webhook"
                );
                Ok(Json(response))
            }
            Err(e) => {
                counter!(m::INGEST_REQUESTS_REJECTED_TOTAL, m::LABEL_REASON => e.reason_label())
                    .increment(1);
                tracing::warn!(
                    error = %e,
                    scope = e.scope().as_str(),
                    reason = e.reason_label(),
                    status = e.status_code().as_u16(),
                    "webhook rejected"
                );
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn process(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<IngestResponse, IngestError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            IngestError::BodyTooLarge {
                max: state.max_body_bytes,
            }
        } else {
            IngestError::Decode {
                encoding: ContentEncoding::Identity.as_str().to_owned(),
                reason: rejection.body_text(),
            }
        }
    })?;

    let header = match headers.get(CONTENT_ENCODING) {
        Some(value) => Some(value.to_str().map_err(|_| {
            IngestError::UnsupportedEncoding(String::from_utf8_lossy(value.as_bytes()).into_owned())
        })?),
        None => None,
    };
    let encoding = ContentEncoding::from_header(header)?;

    tracing::debug!(
        encoding = encoding.as_str(),
        bytes = body.len(),
        "received webhook body"
    );

    let worker = Arc::clone(state);
    let span = tracing::Span::current();
    let (alerts, outcome) = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let raw = worker.decoder.decode(body, encoding)?;
        let batch = worker.parser.parse(&raw)?;
        let alerts = batch.alerts.len();
        Ok::<_, IngestError>((alerts, worker.dispatcher.evaluate_batch(batch)))
    })
    .await
    .map_err(|e| IngestError::Worker(format!("spawn_blocking failed: {e}")))??;

    state.dispatcher.forward_batch(&outcome).await;

    Ok(IngestResponse {
        evaluated: outcome.evaluated(),
        failed: outcome.failed(),
        receiver: outcome.receiver,
        group_key: outcome.group_key,
        alerts,
    })
}

/// 헬스 체크 핸들러
async fn health(State(state): State<Arc<AppState>>) -> Response {
    let kb = state.dispatcher.knowledge_base();
    let listener_state = state.listener_state.get();
    let status = health_of(listener_state, kb);

    let code = if status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = HealthResponse {
        status: status.to_string(),
        state: listener_state,
        knowledge_base: KnowledgeBaseSummary {
            name: kb.name().to_owned(),
            version: kb.version().to_string(),
            rules: kb.rule_count(),
        },
    };

    (code, Json(body)).into_response()
}

fn health_of(state: ListenerState, kb: &KnowledgeBase) -> HealthStatus {
    match state {
        ListenerState::Serving if kb.enabled_rule_count() == 0 => {
            HealthStatus::Degraded("knowledge base has no enabled rules".to_owned())
        }
        ListenerState::Serving => HealthStatus::Healthy,
        ListenerState::Starting => HealthStatus::Degraded("starting".to_owned()),
        ListenerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
    }
}

/// 웹훅 수집 서버
///
/// # 사용 예시
/// ```ignore
/// use ironhook_ingest::{IngestServerBuilder, KnowledgeBase};
///
/// let kb = Arc::new(KnowledgeBase::load("rules.yml").await?);
/// let mut server = IngestServerBuilder::new()
///     .config(config)
///     .knowledge_base(kb)
///     .build()?;
///
/// let addr = server.serve().await?;
/// ```
pub struct IngestServer {
    config: IngestConfig,
    app: Arc<AppState>,
    listener_state: StateCell,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl IngestServer {
    /// 현재 리스너 상태
    pub fn state(&self) -> ListenerState {
        self.listener_state.get()
    }

    /// 바인드된 주소 (Serving 상태에서만 존재)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 공유 지식 베이스
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        self.app.dispatcher.knowledge_base()
    }

    /// 요청 라우터를 생성합니다.
    ///
    /// 소켓 없이 `tower::ServiceExt::oneshot`으로 호출할 수 있습니다.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.path, post(receive_alerts))
            .route(HEALTH_PATH, get(health))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(Arc::clone(&self.app))
    }

    /// 소켓을 바인드하고 백그라운드 태스크에서 요청 처리를 시작합니다.
    ///
    /// 바인드된 주소를 반환합니다. 포트 0이면 OS가 할당한 포트입니다.
    ///
    /// # Errors
    /// - 이미 실행 중 → [`PipelineError::AlreadyRunning`]
    /// - 바인드 실패 → [`PipelineError::Bind`]
    pub async fn serve(&mut self) -> Result<SocketAddr, IronhookError> {
        if self.state() != ListenerState::Stopped {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.listener_state.set(ListenerState::Starting);
        let addr = self.config.socket_addr();

        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                self.listener_state.set(ListenerState::Stopped);
                return Err(PipelineError::Bind {
                    addr,
                    reason: e.to_string(),
                }
                .into());
            }
        };
        let local_addr = listener
            .local_addr()
            .inspect_err(|_| self.listener_state.set(ListenerState::Stopped))?;

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let router = self.router();
        let state = self.listener_state.clone();

        self.cancel = Some(token);
        self.local_addr = Some(local_addr);
        self.listener_state.set(ListenerState::Serving);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "webhook listener terminated");
            }
            state.set(ListenerState::Stopped);
        });

        self.task = Some(task);

        tracing::info!(
            addr = %local_addr,
            path = %self.config.path,
            knowledge_base = self.knowledge_base().name(),
            "webhook listener started"
        );

        Ok(local_addr)
    }
}

impl Pipeline for IngestServer {
    async fn start(&mut self) -> Result<(), IronhookError> {
        self.serve().await.map(|_| ())
    }

    /// 새 연결 수락을 중단하고 처리 중인 요청이 끝날 때까지 기다립니다.
    async fn stop(&mut self) -> Result<(), IronhookError> {
        let (Some(token), Some(task)) = (self.cancel.take(), self.task.take()) else {
            return Err(PipelineError::NotRunning.into());
        };

        tracing::info!("stopping webhook listener");
        token.cancel();

        if let Err(e) = task.await {
            tracing::error!(error = %e, "webhook listener task failed");
        }

        self.listener_state.set(ListenerState::Stopped);
        self.local_addr = None;
        tracing::info!("webhook listener stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        health_of(self.state(), self.knowledge_base())
    }
}

/// 수집 서버 빌더
///
/// 지식 베이스 없이는 서버를 만들 수 없습니다.
pub struct IngestServerBuilder {
    config: IngestConfig,
    kb: Option<Arc<KnowledgeBase>>,
    fact_tx: Option<mpsc::Sender<EvaluatedFact>>,
}

impl IngestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            kb: None,
            fact_tx: None,
        }
    }

    /// 서버 설정을 지정합니다.
    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// 공유 지식 베이스를 지정합니다.
    pub fn knowledge_base(mut self, kb: Arc<KnowledgeBase>) -> Self {
        self.kb = Some(kb);
        self
    }

    /// 평가된 팩트를 받을 하류 채널을 지정합니다.
    pub fn fact_sender(mut self, tx: mpsc::Sender<EvaluatedFact>) -> Self {
        self.fact_tx = Some(tx);
        self
    }

    /// 하류 채널을 새로 만들고 수신측을 반환합니다.
    ///
    /// 용량은 `fact_channel_capacity` 설정을 따릅니다.
    pub fn fact_channel(&mut self) -> mpsc::Receiver<EvaluatedFact> {
        let (tx, rx) = mpsc::channel(self.config.fact_channel_capacity);
        self.fact_tx = Some(tx);
        rx
    }

    /// 서버를 빌드합니다.
    ///
    /// # Errors
    /// 설정이 잘못되었거나 지식 베이스가 지정되지 않은 경우 [`IngestError::Config`]
    pub fn build(self) -> Result<IngestServer, IngestError> {
        self.config.validate()?;

        let kb = self.kb.ok_or_else(|| IngestError::Config {
            field: "knowledge_base".to_owned(),
            reason: "a compiled knowledge base is required before the listener can start"
                .to_owned(),
        })?;

        let mut dispatcher = Dispatcher::new(kb, RuleEngine::new(self.config.max_cycle));
        if let Some(tx) = self.fact_tx {
            dispatcher = dispatcher.with_fact_sender(tx);
        }

        let listener_state = StateCell::new();
        let app = Arc::new(AppState {
            decoder: TransportDecoder::new(self.config.max_decompressed_bytes),
            parser: BatchParser::new(self.config.max_alerts_per_batch),
            dispatcher,
            max_body_bytes: self.config.max_body_bytes,
            listener_state: listener_state.clone(),
        });

        Ok(IngestServer {
            config: self.config,
            app,
            listener_state,
            cancel: None,
            task: None,
            local_addr: None,
        })
    }
}

impl Default for IngestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
