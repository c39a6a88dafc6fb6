use crate::{
    auth::CurrentCaregiver,
    handlers::{ensure_caregiver_of, patient_name, profiles_by_user, users_by_id},
    models::{
        CaregiverTask, MessageResponse, NewTask, TaskCreate, TaskFilter, TaskStatus, TaskUpdate,
        TaskView,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use postgrest::Builder;
use validator::Validate;

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn caregiver_tasks(state: &AppState, caregiver_id: i64) -> Builder {
    state
        .db
        .table("caregiver_tasks")
        .select("*")
        .eq("caregiver_id", caregiver_id.to_string())
}

/// Attach patient names and the overdue flag
async fn with_patient_names(state: &AppState, tasks: Vec<CaregiverTask>) -> ApiResult<Vec<TaskView>> {
    let mut ids: Vec<i64> = tasks.iter().map(|t| t.patient_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = users_by_id(&state.db, &ids).await?;
    let profiles = profiles_by_user(&state.db, &ids).await?;

    let now = Utc::now();
    Ok(tasks
        .into_iter()
        .map(|task| TaskView {
            patient_name: patient_name(users.get(&task.patient_id), profiles.get(&task.patient_id)),
            is_overdue: task.is_overdue_at(now),
            task,
        })
        .collect())
}

async fn owned_task(state: &AppState, caregiver_id: i64, task_id: i64) -> ApiResult<CaregiverTask> {
    state
        .db
        .fetch_one(
            caregiver_tasks(state, caregiver_id).eq("id", task_id.to_string()),
            "Task",
        )
        .await
}

/// `GET /caregiver/tasks`
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Vec<TaskView>>> {
    let mut query = caregiver_tasks(&state, caregiver.id);
    if let Some(status) = filter.status {
        query = query.eq("status", status.as_str());
    }
    if let Some(priority) = filter.priority {
        query = query.eq("priority", priority.as_str());
    }
    if let Some(patient_id) = filter.patient_id {
        query = query.eq("patient_id", patient_id.to_string());
    }
    if let Some(from) = filter.due_date_from {
        query = query.gte("due_date", ts(start_of(from)));
    }
    if let Some(to) = filter.due_date_to {
        query = query.lt("due_date", ts(start_of(to) + Duration::days(1)));
    }

    let tasks = state
        .db
        .fetch_all(query.order("due_date.asc.nullslast"))
        .await?;
    Ok(Json(with_patient_names(&state, tasks).await?))
}

/// `POST /caregiver/tasks`
pub async fn create_task(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Json(request): Json<TaskCreate>,
) -> ApiResult<Json<CaregiverTask>> {
    request.validate()?;
    ensure_caregiver_of(&state.db, caregiver.id, request.patient_id).await?;
    if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
        if end <= start {
            return Err(ApiError::validation_error("end_time must be after start_time"));
        }
    }

    let task: CaregiverTask = state
        .db
        .insert(
            "caregiver_tasks",
            &NewTask {
                caregiver_id: caregiver.id,
                patient_id: request.patient_id,
                assigned_by: caregiver.id,
                title: request.title,
                description: request.description,
                task_type: request.task_type,
                priority: request.priority,
                status: TaskStatus::Pending,
                due_date: request.due_date,
                start_time: request.start_time,
                end_time: request.end_time,
                is_recurring: request.is_recurring,
                recurrence_rule: request.recurrence_rule,
                recurrence_days: request.recurrence_days,
                notes: request.notes,
            },
        )
        .await?;

    tracing::info!(task_id = task.id, caregiver_id = caregiver.id, "Task created");
    Ok(Json(task))
}

/// `GET /caregiver/tasks/overdue`
pub async fn overdue_tasks(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
) -> ApiResult<Json<Vec<TaskView>>> {
    let tasks = state
        .db
        .fetch_all(
            caregiver_tasks(&state, caregiver.id)
                .not("in", "status", "(completed,cancelled)")
                .lt("due_date", ts(Utc::now()))
                .order("due_date.asc"),
        )
        .await?;
    Ok(Json(with_patient_names(&state, tasks).await?))
}

/// `GET /caregiver/tasks/today`
pub async fn today_tasks(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
) -> ApiResult<Json<Vec<TaskView>>> {
    let start = start_of(Utc::now().date_naive());
    let tasks = state
        .db
        .fetch_all(
            caregiver_tasks(&state, caregiver.id)
                .gte("due_date", ts(start))
                .lt("due_date", ts(start + Duration::days(1)))
                .order("due_date.asc"),
        )
        .await?;
    Ok(Json(with_patient_names(&state, tasks).await?))
}

/// `PUT /caregiver/tasks/{id}`
pub async fn update_task(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(task_id): Path<i64>,
    Json(mut update): Json<TaskUpdate>,
) -> ApiResult<Json<CaregiverTask>> {
    update.validate()?;
    let current = owned_task(&state, caregiver.id, task_id).await?;

    let now = Utc::now();
    if update.status == Some(TaskStatus::Completed) && current.completed_at.is_none() {
        update.completed_at = Some(now);
    }
    update.updated_at = Some(now);

    let task = state
        .db
        .update_one(
            state.db.table("caregiver_tasks").eq("id", task_id.to_string()),
            &update,
            "Task",
        )
        .await?;
    Ok(Json(task))
}

/// `DELETE /caregiver/tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let removed = state
        .db
        .delete(
            state
                .db
                .table("caregiver_tasks")
                .eq("id", task_id.to_string())
                .eq("caregiver_id", caregiver.id.to_string()),
        )
        .await?;
    if removed == 0 {
        return Err(ApiError::not_found_error("Task not found"));
    }
    Ok(Json(MessageResponse::new("Task deleted")))
}

/// `POST /caregiver/tasks/{id}/complete`
pub async fn complete_task(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<CaregiverTask>> {
    let current = owned_task(&state, caregiver.id, task_id).await?;
    if current.status == TaskStatus::Completed {
        return Ok(Json(current));
    }

    let now = Utc::now();
    let update = TaskUpdate {
        status: Some(TaskStatus::Completed),
        completed_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };
    let task = state
        .db
        .update_one(
            state.db.table("caregiver_tasks").eq("id", task_id.to_string()),
            &update,
            "Task",
        )
        .await?;
    tracing::info!(task_id, "Task completed");
    Ok(Json(task))
}
