//! Axum JSON surface over the task service and dashboard.
//!
//! Handlers are thin: extract the caller and payload, call the synchronous
//! core, and map [`ServiceError`] onto an HTTP status with a JSON body.

#![allow(clippy::unused_async)]

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use taskdeck::clock::SharedClock;
use taskdeck::dashboard::Dashboard;
use taskdeck::ratelimit::RateLimiter;
use taskdeck::service::{ServiceError, TaskService};
use taskdeck::store::{MemoryRepository, TaskStore};
use taskdeck::validate::ValidationLimits;
use taskdeck_proto::api::{
    CreateTaskRequest, DeleteCompletedResponse, ErrorBody, ListTasksQuery, RecentQuery,
    TaskWrite, UpcomingQuery, UpdateTaskRequest,
};
use taskdeck_proto::task::{Task, TaskCounts, TaskId, Timestamp};

use crate::auth::HeaderIdentity;
use crate::config::ServerConfig;

/// Shared server state: the service, the dashboard and the identity header.
pub struct AppState {
    tasks: TaskService<MemoryRepository>,
    dashboard: Dashboard<MemoryRepository>,
    identity_header: HeaderName,
}

impl AppState {
    /// Wires a fresh in-memory repository to the service and dashboard.
    #[must_use]
    pub fn from_config(config: &ServerConfig, clock: SharedClock) -> Self {
        let store = TaskStore::new(Arc::new(MemoryRepository::new()), Arc::clone(&clock));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limits, Arc::clone(&clock)));
        Self {
            tasks: TaskService::new(store.clone(), limiter, ValidationLimits::default(), clock),
            dashboard: Dashboard::with_default_limit(store, config.recent_limit),
            identity_header: config.identity_header.clone(),
        }
    }

    /// The task service.
    #[must_use]
    pub const fn tasks(&self) -> &TaskService<MemoryRepository> {
        &self.tasks
    }

    /// The header the caller identity is read from.
    #[must_use]
    pub const fn identity_header(&self) -> &HeaderName {
        &self.identity_header
    }
}

/// A [`ServiceError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let retry_after_ms = self.0.retry_after_ms();
        let body = ErrorBody {
            error: self.0.to_string(),
            retry_after_ms,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(ms) = retry_after_ms {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ms.div_ceil(1000)));
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the router with all routes mounted on `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/stats", get(task_stats))
        .route("/api/tasks/upcoming", get(upcoming_tasks))
        .route("/api/tasks/delete-completed", post(delete_completed))
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/dashboard/recent", get(dashboard_recent))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskWrite>)> {
    let write = state.tasks.create_task(&identity, request)?;
    Ok((StatusCode::CREATED, Json(write)))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = match query.status {
        Some(status) => state.tasks.list_tasks_by_status(&identity, status)?,
        None => state.tasks.list_tasks(&identity)?,
    };
    Ok(Json(tasks))
}

async fn task_stats(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
) -> ApiResult<Json<TaskCounts>> {
    Ok(Json(state.tasks.get_task_stats(&identity)?))
}

async fn upcoming_tasks(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let before = query.before.map(Timestamp::from_millis);
    Ok(Json(state.tasks.list_upcoming_tasks(&identity, before)?))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.get_task(&identity, &id)?))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Path(id): Path<TaskId>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskWrite>> {
    Ok(Json(state.tasks.update_task(&identity, &id, request)?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Path(id): Path<TaskId>,
) -> ApiResult<StatusCode> {
    state.tasks.delete_task(&identity, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_completed(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
) -> ApiResult<Json<DeleteCompletedResponse>> {
    Ok(Json(state.tasks.delete_completed_tasks(&identity)?))
}

async fn dashboard_summary(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
) -> ApiResult<Json<TaskCounts>> {
    Ok(Json(state.dashboard.summary(&identity)?))
}

async fn dashboard_recent(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.dashboard.recent(&identity, query.limit)?))
}

/// Starts the server on `addr` with the given state.
///
/// Returns the bound address (useful when binding to port 0) and a join
/// handle for the server task.
///
/// # Errors
///
/// Returns an error if the listener cannot bind to `addr`.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "taskdeck server error");
        }
    });

    Ok((bound_addr, handle))
}
