//! Report schedule routes
//!
//! A schedule stores a cron expression plus the chart-request parameters to
//! replay. `execute_at` is primed with the expression's next occurrence; the
//! worker advances it after each dispatch.

use axum::extract::{Extension, Path, State};
use axum::Json;
use chartsight_shared::schedule::{next_occurrence, validate_cron};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub cron_expression: String,
    pub parameter: serde_json::Value,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduleTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cron_expression: String,
    pub parameter: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub execute_at: OffsetDateTime,
    pub executed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<ScheduleTask>>>> {
    let tasks: Vec<ScheduleTask> = sqlx::query_as(
        r#"
        SELECT id, user_id, cron_expression, parameter, execute_at, executed, created_at
        FROM schedule_tasks
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(tasks))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateScheduleRequest>,
) -> ApiResult<Json<Envelope<ScheduleTask>>> {
    validate_cron(&req.cron_expression)
        .map_err(|e| ApiError::Validation(format!("invalid cron expression: {}", e)))?;

    let execute_at = next_occurrence(&req.cron_expression, OffsetDateTime::now_utc())
        .ok_or_else(|| {
            ApiError::Validation("cron expression has no upcoming occurrence".to_string())
        })?;

    let task: ScheduleTask = sqlx::query_as(
        r#"
        INSERT INTO schedule_tasks (user_id, cron_expression, parameter, execute_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, cron_expression, parameter, execute_at, executed, created_at
        "#,
    )
    .bind(auth_user.user_id)
    .bind(&req.cron_expression)
    .bind(&req.parameter)
    .bind(execute_at)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        user_id = %auth_user.user_id,
        task_id = %task.id,
        cron = %task.cron_expression,
        execute_at = %task.execute_at,
        "Created report schedule"
    );

    Ok(ok_with("schedule created", task))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    let rows = sqlx::query("DELETE FROM schedule_tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(auth_user.user_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if rows == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(ok_with("schedule deleted", ()))
}
