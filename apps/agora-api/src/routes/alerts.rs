//! Alert endpoints. Alerts are strictly per-recipient; there is no way to
//! read or mutate another user's.

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::db::schema::alerts;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::alert::Alert;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/read_all", patch(mark_all_read))
        .route("/alerts/{id}/read", patch(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct AlertPath {
    pub id: String,
}

impl AlertPath {
    fn id_i64(&self) -> Result<i64, ApiError> {
        self.id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid alert ID"))
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAlertsParams {
    /// `true` keeps only unread alerts, `false` only read ones.
    pub unread: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    tag = "Alerts",
    security(("bearer" = [])),
    params(ListAlertsParams),
    responses(
        (status = 200, description = "The caller's alerts, newest first", body = [Alert]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_alerts(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let mut conn = state.db.get().await?;

    let mut query = alerts::table
        .select(Alert::as_select())
        .filter(alerts::recipient_id.eq(&user_id))
        .order(alerts::created_at.desc())
        .into_boxed();
    if let Some(unread) = params.unread {
        query = query.filter(alerts::is_read.eq(!unread));
    }

    let rows: Vec<Alert> = diesel_async::RunQueryDsl::load(query, &mut conn).await?;

    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/alerts/:id/read
// ---------------------------------------------------------------------------

#[utoipa::path(
    patch,
    path = "/api/v1/alerts/{id}/read",
    tag = "Alerts",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Alert marked read", body = Alert),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<AlertPath>,
) -> Result<Json<Alert>, ApiError> {
    let alert_id = path.id_i64()?;
    let mut conn = state.db.get().await?;

    // Scoping the update to the recipient makes someone else's alert a 404.
    let alert: Alert = diesel_async::RunQueryDsl::get_result(
        diesel::update(
            alerts::table
                .filter(alerts::id.eq(alert_id))
                .filter(alerts::recipient_id.eq(&user_id)),
        )
        .set(alerts::is_read.eq(true))
        .returning(Alert::as_returning()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Alert not found"))?;

    Ok(Json(alert))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/alerts/read_all
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadAllResponse {
    /// Number of alerts flipped to read.
    pub updated: usize,
}

#[utoipa::path(
    patch,
    path = "/api/v1/alerts/read_all",
    tag = "Alerts",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All unread alerts marked read", body = ReadAllResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn mark_all_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ReadAllResponse>, ApiError> {
    let mut conn = state.db.get().await?;

    let updated = diesel_async::RunQueryDsl::execute(
        diesel::update(
            alerts::table
                .filter(alerts::recipient_id.eq(&user_id))
                .filter(alerts::is_read.eq(false)),
        )
        .set(alerts::is_read.eq(true)),
        &mut conn,
    )
    .await?;

    Ok(Json(ReadAllResponse { updated }))
}
