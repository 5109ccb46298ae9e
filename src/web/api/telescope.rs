use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::config::Permission;
use crate::telescope::{SessionError, SessionStatus, TelescopeSession};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};

type Accepted = (StatusCode, Json<SessionStatus>);

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    /// Defaults to the configured telescope host.
    pub host: Option<String>,
    /// Any JSON number is accepted here so out-of-range ports get the same
    /// validation error as the session's own checks.
    pub port: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GotoRequest {
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ObserveRequest {
    pub ra: f64,
    pub dec: f64,
    pub name: String,
    pub exposure_s: Option<f64>,
    pub gain: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AutoInitRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

async fn submit<F>(state: &AppState, user: &AuthenticatedUser, op: F) -> ApiResult<Accepted>
where
    F: FnOnce(&TelescopeSession) -> Result<(), SessionError>,
{
    require_permission(user, Permission::Control)?;
    let session = state.session.lock().await;
    op(&*session)?;
    Ok((StatusCode::ACCEPTED, Json(session.status())))
}

#[utoipa::path(
    post,
    path = "/api/telescope/connect",
    request_body = ConnectRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Connection attempt started", body = SessionStatus),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn connect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Accepted> {
    require_permission(&user, Permission::Control)?;
    let host = request
        .host
        .or_else(|| state.config.telescope.host.clone())
        .ok_or_else(|| ApiError::Validation("no telescope host given".into()))?;
    let port = match request.port {
        None => u32::from(state.config.telescope.port),
        Some(p) if p.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&p) => p as u32,
        Some(p) => {
            return Err(ApiError::Validation(format!(
                "port {} outside [1, 65535]",
                p
            )))
        }
    };
    submit(&state, &user, |s| s.connect(&host, port)).await
}

#[utoipa::path(
    post,
    path = "/api/telescope/disconnect",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Disconnected", body = SessionStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Accepted> {
    submit(&state, &user, |s| {
        s.disconnect();
        Ok(())
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/telescope/goto",
    request_body = GotoRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Slew submitted", body = SessionStatus),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Not connected", body = ErrorResponse),
        (status = 502, description = "Could not dispatch", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn goto(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<GotoRequest>,
) -> ApiResult<Accepted> {
    submit(&state, &user, |s| {
        s.goto_coordinates(request.ra, request.dec, &request.name)
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/telescope/observe",
    request_body = ObserveRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Observation submitted", body = SessionStatus),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Not connected", body = ErrorResponse),
        (status = 502, description = "Could not dispatch", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn observe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ObserveRequest>,
) -> ApiResult<Accepted> {
    let defaults = &state.config.observation;
    let exposure = request.exposure_s.unwrap_or(defaults.exposure_s);
    let gain = request.gain.unwrap_or(defaults.gain);
    submit(&state, &user, |s| {
        s.start_observation(request.ra, request.dec, &request.name, exposure, gain)
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/telescope/stop",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Stop submitted", body = SessionStatus),
        (status = 409, description = "Not connected", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn stop(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Accepted> {
    submit(&state, &user, TelescopeSession::stop_observation).await
}

#[utoipa::path(
    post,
    path = "/api/telescope/park",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Park submitted", body = SessionStatus),
        (status = 409, description = "Not connected", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn park(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Accepted> {
    submit(&state, &user, TelescopeSession::park).await
}

#[utoipa::path(
    post,
    path = "/api/telescope/focus",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Focus submitted", body = SessionStatus),
        (status = 409, description = "Not connected", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn focus(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Accepted> {
    submit(&state, &user, TelescopeSession::focus).await
}

#[utoipa::path(
    post,
    path = "/api/telescope/open-arm",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Open arm submitted", body = SessionStatus),
        (status = 409, description = "Not connected", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn open_arm(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Accepted> {
    submit(&state, &user, TelescopeSession::open_arm).await
}

#[utoipa::path(
    post,
    path = "/api/telescope/auto-init",
    request_body = AutoInitRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 202, description = "Auto-initialization submitted", body = SessionStatus),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Not connected", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn auto_init(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<AutoInitRequest>,
) -> ApiResult<Accepted> {
    let latitude = request
        .latitude
        .or(state.site.map(|s| s.latitude_deg))
        .ok_or_else(|| ApiError::Validation("no latitude given and no site configured".into()))?;
    let longitude = request
        .longitude
        .or(state.site.map(|s| s.longitude_deg))
        .ok_or_else(|| ApiError::Validation("no longitude given and no site configured".into()))?;
    submit(&state, &user, |s| s.auto_initialize(latitude, longitude)).await
}

#[utoipa::path(
    get,
    path = "/api/telescope/status",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Session status", body = SessionStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "telescope"
)]
pub async fn status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<SessionStatus>> {
    require_permission(&user, Permission::ReadStatus)?;
    let session = state.session.lock().await;
    Ok(Json(session.status()))
}
