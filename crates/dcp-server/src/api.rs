// crates/dcp-server/src/api.rs
// ============================================================================
// Module: HTTP API
// Description: axum router and handlers for the decision request surface.
// Purpose: Translate HTTP requests into engine operations under a deadline.
// Dependencies: axum, dcp-core, serde_json, tokio, tower-http
// ============================================================================

//! ## Overview
//! Handlers parse bodies themselves so malformed input is reported with the
//! same error envelope as engine failures:
//! `{ "error": { "category", "message", "decision"? } }`. Engine calls run on
//! the blocking pool under the configured request deadline; a call that
//! misses the deadline is reported as `timeout` and its outcome is abandoned.
//!
//! Every response carries an `x-request-id` header: a caller-supplied id is
//! echoed, otherwise a UUID is generated, and the id is attached to the
//! request's tracing span. Decision routes pass through the per-client rate
//! limiter when one is configured; `/healthz` and `/metrics` never do.
//! Security posture: request bodies and paths are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::MatchedPath;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use dcp_core::ActionInput;
use dcp_core::ActionRequest;
use dcp_core::ActionType;
use dcp_core::ActorType;
use dcp_core::CreateGateRequest;
use dcp_core::Decision;
use dcp_core::DecisionEngine;
use dcp_core::DecisionId;
use dcp_core::DecisionQuery;
use dcp_core::DecisionStatus;
use dcp_core::EngineError;
use dcp_core::ErrorCategory;
use dcp_core::OrgId;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyError;
use dcp_core::SharedDecisionStore;
use dcp_core::Timestamp;
use dcp_core::ValidationError;
use dcp_core::validation::validate_identifier;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::request_id::MakeRequestUuid;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::request_id::SetRequestIdLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing::debug;
use tracing::info_span;
use tracing::warn;

use crate::audit::AuditOutcome;
use crate::audit::AuditRecord;
use crate::audit::AuditSink;
use crate::metrics::ServiceMetrics;
use crate::rate_limit::RateDecision;
use crate::rate_limit::RateLimiter;
use crate::rate_limit::client_key;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Query value that disables the status filter.
const STATUS_FILTER_ALL: &str = "all";
/// Request correlation header.
const REQUEST_ID_HEADER: &str = "x-request-id";
/// Proxy chain header consulted for the client key.
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Route label for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";
/// Prometheus text exposition content type.
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// ============================================================================
// SECTION: State
// ============================================================================

/// Engine type served by the API.
pub type Engine = DecisionEngine<SharedDecisionStore>;
/// Loads a fresh policy catalog for hot reload.
pub type PolicyLoader = Arc<dyn Fn() -> Result<PolicyCatalog, PolicyError> + Send + Sync>;
/// Wall clock used to stamp requests.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle engine.
    engine: Arc<Engine>,
    /// Audit destination.
    audit: Arc<dyn AuditSink>,
    /// Policy catalog source for reloads.
    policy_loader: PolicyLoader,
    /// Per-request deadline.
    request_timeout: Duration,
    /// Request clock.
    clock: Clock,
    /// Prometheus metrics; `/metrics` answers 404 without them.
    metrics: Option<Arc<ServiceMetrics>>,
    /// Per-client limiter for decision routes.
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    /// Builds handler state with the system clock and default deadline.
    #[must_use]
    pub fn new(engine: Arc<Engine>, audit: Arc<dyn AuditSink>, policy_loader: PolicyLoader) -> Self {
        Self {
            engine,
            audit,
            policy_loader,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            clock: Arc::new(system_now),
            metrics: None,
            rate_limiter: None,
        }
    }

    /// Overrides the request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the request clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Enables metrics recording and the `/metrics` route.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enables per-client rate limiting on decision routes.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Returns the metrics registry, when enabled.
    #[must_use]
    pub const fn metrics(&self) -> Option<&Arc<ServiceMetrics>> {
        self.metrics.as_ref()
    }

    /// Reads the request clock.
    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Runs `op` on the blocking pool under the request deadline.
    async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine, Timestamp) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let now = self.now();
        let task = tokio::task::spawn_blocking(move || op(&engine, now));
        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result.map_err(ApiError::from),
            Ok(Err(err)) => Err(ApiError::new(ErrorCategory::Internal, err.to_string())),
            Err(_) => Err(ApiError::new(
                ErrorCategory::Timeout,
                format!("request exceeded {} ms deadline", self.request_timeout.as_millis()),
            )),
        }
    }

    /// Counts an applied action when metrics are enabled.
    fn record_action(&self, action_type: ActionType, actor_type: ActorType) {
        if let Some(metrics) = &self.metrics {
            metrics.action_applied(action_type.as_str(), actor_type.as_str());
        }
    }

    /// Records an audit entry stamped with the request clock.
    fn audit(&self, event: &'static str, result: Result<&Decision, &ApiError>) {
        let now = self.now();
        let record = match result {
            Ok(decision) => AuditRecord::new(event, now, AuditOutcome::Ok).with_decision(
                decision.decision_id.as_str(),
                Some(decision.org_id.to_string()),
                Some(decision.status.as_str().to_string()),
            ),
            Err(err) => AuditRecord::new(event, now, AuditOutcome::Error)
                .with_error(err.category.as_str())
                .with_detail(json!({ "message": err.message })),
        };
        self.audit.record(&record);
    }
}

/// Reads the system clock as unix milliseconds.
#[must_use]
pub fn system_now() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the HTTP router.
///
/// Decision routes are nested under `api_prefix`; `/healthz` and `/metrics`
/// are at the root.
#[must_use]
pub fn router(state: AppState, api_prefix: &str, max_body_bytes: usize) -> Router {
    let api = Router::new()
        .route("/decision-gates", post(create_gate))
        .route("/decisions", get(list_decisions))
        .route("/decisions/{decision_id}", get(get_decision))
        .route("/decisions/{decision_id}/{operation}", post(decision_operation))
        .route("/policies/reload", post(reload_policies))
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit));
    Router::new()
        .nest(api_prefix, api)
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Opens the tracing span for one request, tagged with its request id.
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Records request count and latency by matched route.
async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return next.run(request).await;
    };
    let method = request.method().as_str().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |path| path.as_str().to_string());
    let started = Instant::now();
    let response = next.run(request).await;
    metrics.observe_request(&method, &route, response.status().as_u16(), started.elapsed());
    response
}

/// Refuses requests beyond the client's budget with `429` and `Retry-After`.
async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };
    let forwarded_for =
        request.headers().get(FORWARDED_FOR_HEADER).and_then(|value| value.to_str().ok());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let client = client_key(forwarded_for, peer);
    match limiter.check(&client) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited {
            retry_after,
        } => {
            if let Some(metrics) = &state.metrics {
                metrics.rate_limited();
            }
            let seconds = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                .max(1);
            debug!(client = %client, retry_after = seconds, "request rate limited");
            let mut response = ApiError::new(
                ErrorCategory::RateLimited,
                format!("rate limit exceeded; retry after {seconds} s"),
            )
            .into_response();
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST {prefix}/decision-gates`.
async fn create_gate(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let result = async {
        let request: CreateGateRequest = parse_body(&body)?;
        state.run(move |engine, now| engine.create_gate(request, now)).await
    }
    .await;
    state.audit("decision_created", result.as_ref().map(|creation| &creation.decision));
    let creation = result?;
    if creation.created
        && let Some(metrics) = &state.metrics
    {
        metrics.decision_created(creation.decision.status.as_str());
    }
    debug!(
        decision_id = %creation.decision.decision_id,
        status = creation.decision.status.as_str(),
        created = creation.created,
        "gate request served"
    );
    let status = if creation.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(creation)).into_response())
}

/// Query parameters for listing decisions.
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    /// Status filter; `all` disables it.
    status: Option<String>,
    /// Tenant filter.
    org_id: Option<String>,
    /// Page size.
    limit: Option<String>,
    /// Page offset.
    offset: Option<String>,
}

/// `GET {prefix}/decisions`.
async fn list_decisions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let query = list_query(params)?;
    let page = state.run(move |engine, _| engine.list(&query)).await?;
    Ok(Json(page).into_response())
}

/// `GET {prefix}/decisions/{decision_id}`.
async fn get_decision(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
) -> Result<Response, ApiError> {
    let decision_id = DecisionId::new(decision_id);
    let details = state.run(move |engine, _| engine.details(&decision_id)).await?;
    Ok(Json(details).into_response())
}

/// Resume acknowledgment body.
#[derive(Debug, Deserialize)]
struct ResumeBody {
    /// Token from the resolving event.
    resume_token: String,
}

/// `POST {prefix}/decisions/{decision_id}/{operation}`.
async fn decision_operation(
    State(state): State<AppState>,
    Path((decision_id, operation)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let decision_id = DecisionId::new(decision_id);
    match operation.as_str() {
        "approve" | "reject" | "escalate" | "modify" => {
            let action_type = match operation.as_str() {
                "approve" => ActionType::Approve,
                "reject" => ActionType::Reject,
                "escalate" => ActionType::Escalate,
                _ => ActionType::Modify,
            };
            let result = async {
                let input: ActionInput = parse_optional_body(&body)?;
                let actor_type = input.actor_type;
                let request = ActionRequest::new(action_type, input);
                let decision = state
                    .run(move |engine, now| engine.apply_action(&decision_id, request, now))
                    .await?;
                state.record_action(action_type, actor_type);
                Ok(decision)
            }
            .await;
            state.audit("decision_actioned", result.as_ref());
            Ok(Json(result?).into_response())
        }
        "resume" => {
            let result = async {
                let resume: ResumeBody = parse_body(&body)?;
                state
                    .run(move |engine, now| {
                        engine.acknowledge_resume(&decision_id, &resume.resume_token, now)
                    })
                    .await
            }
            .await;
            state.audit("decision_resumed", result.as_ref());
            Ok(Json(result?).into_response())
        }
        "reevaluate" => {
            let result = state
                .run(move |engine, now| {
                    let snapshot = engine.reevaluate(&decision_id, now)?;
                    let decision = engine.decision(&decision_id)?;
                    Ok((decision, snapshot))
                })
                .await;
            state.audit("decision_reevaluated", result.as_ref().map(|(decision, _)| decision));
            let (_, snapshot) = result?;
            Ok(Json(snapshot).into_response())
        }
        other => Err(ApiError::new(
            ErrorCategory::NotFound,
            format!("unknown decision operation: {other}"),
        )),
    }
}

/// Reload response body.
#[derive(Debug, Serialize)]
struct ReloadResponse {
    /// Catalog state after reload.
    status: &'static str,
    /// Number of rulesets in the active catalog.
    rulesets: usize,
}

/// `POST {prefix}/policies/reload`.
async fn reload_policies(State(state): State<AppState>) -> Result<Response, ApiError> {
    let loader = Arc::clone(&state.policy_loader);
    let result = state
        .run(move |engine, _| {
            let catalog = loader();
            let rulesets = catalog.as_ref().map_or(0, PolicyCatalog::len);
            engine.reload_policies(catalog)?;
            Ok(rulesets)
        })
        .await;
    let now = state.now();
    let record = match &result {
        Ok(rulesets) => AuditRecord::new("policies_reloaded", now, AuditOutcome::Ok)
            .with_detail(json!({ "rulesets": rulesets })),
        Err(err) => AuditRecord::new("policies_reloaded", now, AuditOutcome::Error)
            .with_error(err.category.as_str())
            .with_detail(json!({ "message": err.message })),
    };
    state.audit.record(&record);
    let rulesets = result?;
    Ok(Json(ReloadResponse {
        status: "active",
        rulesets,
    })
    .into_response())
}

/// `GET /metrics`.
async fn metrics_text(State(state): State<AppState>) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return ApiError::new(ErrorCategory::NotFound, "metrics are disabled").into_response();
    };
    let pending = state
        .run(|engine, _| {
            let query = DecisionQuery {
                status: Some(DecisionStatus::PendingHumanReview),
                limit: 1,
                ..DecisionQuery::default()
            };
            engine.list(&query).map(|page| page.total)
        })
        .await;
    match pending {
        Ok(total) => metrics.set_pending_decisions(total),
        Err(err) => warn!(error = %err.message, "pending decision count unavailable"),
    }
    match metrics.encode_text() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(err) => ApiError::new(ErrorCategory::Internal, err.to_string()).into_response(),
    }
}

/// `GET /healthz`.
async fn healthz(State(state): State<AppState>) -> Response {
    let result = state
        .run(|engine, _| {
            engine.readiness()?;
            Ok(engine.policies().current().is_ok())
        })
        .await;
    match result {
        Ok(policies_active) => Json(json!({
            "status": "ok",
            "policies": if policies_active { "active" } else { "unavailable" },
        }))
        .into_response(),
        Err(err) => {
            warn!(error = %err.message, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "message": err.message })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// SECTION: Request Parsing
// ============================================================================

/// Parses a required JSON body.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::new(ErrorCategory::Validation, "request body is required"));
    }
    serde_json::from_slice(body).map_err(|err| {
        ApiError::new(ErrorCategory::Validation, format!("invalid request body: {err}"))
    })
}

/// Parses an optional JSON body; an empty body yields the default.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

/// Converts list parameters into a store query.
fn list_query(params: ListParams) -> Result<DecisionQuery, ApiError> {
    let mut query = DecisionQuery::default();
    match params.status.as_deref() {
        None => {}
        Some(STATUS_FILTER_ALL) => query.status = None,
        Some(label) => {
            let status = label.parse::<DecisionStatus>().map_err(|err| {
                ApiError::from(EngineError::from(ValidationError::new("status", err.to_string())))
            })?;
            query.status = Some(status);
        }
    }
    if let Some(org_id) = params.org_id {
        validate_identifier("org_id", &org_id).map_err(|err| ApiError::from(EngineError::from(err)))?;
        query.org_id = Some(OrgId::new(org_id));
    }
    if let Some(limit) = params.limit {
        query.limit = parse_count("limit", &limit)?;
    }
    if let Some(offset) = params.offset {
        query.offset = parse_count("offset", &offset)?;
    }
    Ok(query)
}

/// Parses a non-negative integer query parameter.
fn parse_count(field: &str, value: &str) -> Result<usize, ApiError> {
    value.trim().parse::<usize>().map_err(|_| {
        ApiError::from(EngineError::from(ValidationError::new(field, "must be a non-negative integer")))
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error rendered as the API error envelope.
#[derive(Debug)]
pub struct ApiError {
    /// Caller-facing category.
    category: ErrorCategory,
    /// Human-readable message.
    message: String,
    /// Current decision state for conflicts.
    decision: Option<Box<Decision>>,
}

impl ApiError {
    /// Creates an error without decision context.
    fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            decision: None,
        }
    }

    /// Returns the HTTP status for the category.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        status_for(self.category)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self {
            category: err.category(),
            message: err.to_string(),
            decision: err.conflicting_decision().cloned().map(Box::new),
        }
    }
}

/// Maps an error category onto an HTTP status.
#[must_use]
pub const fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Store | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serialized error body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    /// Error payload.
    error: ErrorPayload<'a>,
}

/// Serialized error payload.
#[derive(Serialize)]
struct ErrorPayload<'a> {
    /// Category label.
    category: ErrorCategory,
    /// Human-readable message.
    message: &'a str,
    /// Current decision state for conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a Decision>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorPayload {
                category: self.category,
                message: &self.message,
                decision: self.decision.as_deref(),
            },
        };
        let payload: Value = serde_json::to_value(&body).unwrap_or_else(|_| {
            json!({ "error": { "category": "internal", "message": "serialization failed" } })
        });
        (self.status(), Json(payload)).into_response()
    }
}
