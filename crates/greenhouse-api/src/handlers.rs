//! HTTP request handlers

use crate::error::ApiError;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use greenhouse_core::{Sample, Timestamp};
use greenhouse_ingest::{IngestHandle, IngestStatsSnapshot};
use greenhouse_query::{
    DownsampledSeries, EnvelopeSeries, MultiChannelSeries, QueryServiceConfig, RangeQueryService,
};
use greenhouse_storage::{StorageEngine, StorageStats};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Server startup phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    /// Server is initializing
    Initializing,
    /// WAL replay into the memtable
    WalRecovery,
    /// Server is ready to serve requests
    Ready,
}

impl std::fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupPhase::Initializing => write!(f, "initializing"),
            StartupPhase::WalRecovery => write!(f, "wal_recovery"),
            StartupPhase::Ready => write!(f, "ready"),
        }
    }
}

/// Startup state tracking
pub struct StartupState {
    phase: RwLock<StartupPhase>,
    start_time: Instant,
}

impl StartupState {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(StartupPhase::Initializing),
            start_time: Instant::now(),
        }
    }

    pub fn phase(&self) -> StartupPhase {
        *self.phase.read()
    }

    pub fn set_phase(&self, phase: StartupPhase) {
        *self.phase.write() = phase;
    }

    pub fn is_ready(&self) -> bool {
        *self.phase.read() == StartupPhase::Ready
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for StartupState {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub storage: RwLock<Option<Arc<StorageEngine>>>,
    pub service: RwLock<Option<Arc<RangeQueryService>>>,
    pub ingest: RwLock<Option<IngestHandle>>,
    pub query_config: QueryServiceConfig,
    pub query_semaphore: Arc<Semaphore>,
    pub query_timeout: Duration,
    pub startup_state: Arc<StartupState>,
}

impl AppState {
    /// Create a new AppState with storage already initialized (ready state)
    pub fn new(
        storage: Arc<StorageEngine>,
        ingest: IngestHandle,
        query_config: QueryServiceConfig,
        query_timeout: Duration,
        max_concurrent_queries: usize,
    ) -> Self {
        let startup_state = Arc::new(StartupState::new());
        let state = Self::new_initializing(
            query_config,
            query_timeout,
            max_concurrent_queries,
            Arc::clone(&startup_state),
        );
        state.set_storage(storage, ingest);
        startup_state.set_phase(StartupPhase::Ready);
        state
    }

    /// Create a new AppState in initializing mode (no storage yet)
    pub fn new_initializing(
        query_config: QueryServiceConfig,
        query_timeout: Duration,
        max_concurrent_queries: usize,
        startup_state: Arc<StartupState>,
    ) -> Self {
        Self {
            storage: RwLock::new(None),
            service: RwLock::new(None),
            ingest: RwLock::new(None),
            query_config,
            query_semaphore: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
            query_timeout,
            startup_state,
        }
    }

    /// Install the recovered store and the ingestion handle feeding it
    pub fn set_storage(&self, storage: Arc<StorageEngine>, ingest: IngestHandle) {
        let service = Arc::new(RangeQueryService::new(
            storage.clone(),
            self.query_config.clone(),
        ));
        *self.storage.write() = Some(storage);
        *self.service.write() = Some(service);
        *self.ingest.write() = Some(ingest);
    }

    /// Check if storage is ready
    pub fn is_storage_ready(&self) -> bool {
        self.storage.read().is_some()
    }

    pub fn get_storage(&self) -> Option<Arc<StorageEngine>> {
        self.storage.read().clone()
    }

    pub fn get_service(&self) -> Option<Arc<RangeQueryService>> {
        self.service.read().clone()
    }

    pub fn get_ingest(&self) -> Option<IngestHandle> {
        self.ingest.read().clone()
    }

    fn starting_up(&self) -> ApiError {
        ApiError::ServiceUnavailable(format!(
            "Server is starting up ({})",
            self.startup_state.phase()
        ))
    }
}

/// Run a query on the blocking pool under the concurrency limit and timeout
async fn run_query<T, F>(state: &AppState, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&RangeQueryService, &CancellationToken) -> greenhouse_query::Result<T>
        + Send
        + 'static,
{
    let service = state.get_service().ok_or_else(|| state.starting_up())?;

    let permit = Arc::clone(&state.query_semaphore)
        .acquire_owned()
        .await
        .map_err(|_| ApiError::Internal("Query semaphore closed".to_string()))?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    // The permit lives as long as the blocking task, which outlasts a timeout
    let query_result = tokio::time::timeout(state.query_timeout, async {
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            query(&service, &cancel_clone)
        })
        .await
    })
    .await;

    match query_result {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(query_err))) => Err(query_err.into()),
        Ok(Err(join_err)) => Err(ApiError::Internal(format!("Query task failed: {}", join_err))),
        Err(_timeout) => {
            // Stops the scan at its next checkpoint
            cancel.cancel();
            Err(ApiError::Timeout)
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Health check handler - always responds, even during startup
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let phase = state.startup_state.phase();
    let is_ready = phase == StartupPhase::Ready;

    Json(HealthResponse {
        status: if is_ready { "healthy".to_string() } else { "unhealthy".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        phase: if is_ready { None } else { Some(phase.to_string()) },
    })
}

/// Ready check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub uptime_seconds: u64,
}

/// Ready check handler - always responds, returns ready=false during startup
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let phase = state.startup_state.phase();
    let is_ready = phase == StartupPhase::Ready;

    Json(ReadyResponse {
        ready: is_ready,
        phase: if is_ready { None } else { Some(phase.to_string()) },
        uptime_seconds: state.startup_state.uptime_seconds(),
    })
}

/// Query string of the range endpoints. Values stay strings so that a bad
/// timestamp produces a JSON error body instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub channel: Option<String>,
}

impl RangeParams {
    fn window(&self) -> Result<(Timestamp, Timestamp), ApiError> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => Ok((parse_timestamp(from)?, parse_timestamp(to)?)),
            _ => Err(ApiError::BadRequest("missing from/to".to_string())),
        }
    }

    fn channel(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

fn parse_timestamp(raw: &str) -> Result<Timestamp, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid timestamp: {}", raw)))
}

/// Query string of the recent endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub limit: Option<String>,
}

/// Most recent sample
pub async fn latest(State(state): State<Arc<AppState>>) -> Result<Json<Sample>, ApiError> {
    run_query(&state, |service, _| service.latest())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no samples recorded".to_string()))
}

/// Most recent samples, newest first
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("invalid limit: {}", raw)))?,
    };

    let samples = run_query(&state, move |service, _| service.recent(limit)).await?;
    Ok(Json(samples))
}

/// Range response: one channel's averages, or every channel's
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RangeResponse {
    Channel(DownsampledSeries),
    All(MultiChannelSeries),
}

/// Downsampled averages over `[from, to]`
pub async fn range(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<RangeResponse>, ApiError> {
    let start = Instant::now();
    let (from, to) = params.window()?;

    let response = match params.channel() {
        Some(channel) => {
            let channel = channel.to_string();
            let series = run_query(&state, move |service, cancel| {
                service.query_downsampled_with_cancellation(from, to, &channel, cancel)
            })
            .await?;
            RangeResponse::Channel(series)
        }
        None => {
            let series = run_query(&state, move |service, cancel| {
                service.query_downsampled_all_with_cancellation(from, to, cancel)
            })
            .await?;
            RangeResponse::All(series)
        }
    };

    debug!(
        from,
        to,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Range request served"
    );
    Ok(Json(response))
}

/// Min/avg/max envelope of every channel over `[from, to]`
pub async fn range_combined(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<EnvelopeSeries>, ApiError> {
    let (from, to) = params.window()?;

    let series = run_query(&state, move |service, cancel| {
        service.query_envelope_with_cancellation(from, to, cancel)
    })
    .await?;
    Ok(Json(series))
}

/// Ingest response
#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
}

/// Enqueue one sensor payload; parsing happens on the consumer
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let handle = state.get_ingest().ok_or_else(|| state.starting_up())?;
    handle.try_submit(body.to_vec())?;

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted: true })))
}

/// Stats response
#[derive(Serialize)]
pub struct StatsResponse {
    pub storage: StorageStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestStatsSnapshot>,
    pub uptime_seconds: u64,
}

/// Store and ingestion counters
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let storage = state.get_storage().ok_or_else(|| state.starting_up())?;

    Ok(Json(StatsResponse {
        storage: storage.stats(),
        ingest: state.get_ingest().map(|handle| handle.stats().snapshot()),
        uptime_seconds: state.startup_state.uptime_seconds(),
    }))
}
