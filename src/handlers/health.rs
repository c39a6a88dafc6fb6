use crate::{
    analytics::{daily_health_score, daily_tip, progress_color, week_start},
    auth::CurrentUser,
    db::Database,
    handlers::{page_bounds, patient_name},
    models::{
        ActivityRing, DailyHealthScore, FoodLog, FoodLogCreate, HealthCategory, HealthDashboard,
        HealthData, HealthDataCreate, HealthTrendCard, MessageResponse, NewFoodLog,
        NewHealthData, NewWeeklyProgress, Pagination, ProgressUpdateRequest, RecentMeal,
        UserProfile, WeeklyProgress,
    },
    services::{storage::content_type_for, vision::manual_log_analysis},
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::json;
use validator::Validate;

const MAX_PAGE: usize = 100;

/// Latest reading, creating a baseline row for a first-time user
async fn latest_or_baseline(db: &Database, user_id: i64) -> ApiResult<HealthData> {
    let latest = db
        .fetch_optional(
            db.table("health_data")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("date.desc"),
        )
        .await?;
    match latest {
        Some(row) => Ok(row),
        None => {
            db.insert("health_data", &NewHealthData::baseline(user_id, Utc::now()))
                .await
        }
    }
}

async fn current_week(db: &Database, user_id: i64, week: NaiveDate) -> ApiResult<Option<WeeklyProgress>> {
    db.fetch_optional(
        db.table("weekly_progress")
            .select("*")
            .eq("user_id", user_id.to_string())
            .eq("week_start_date", week.to_string()),
    )
    .await
}

fn today_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn format_minutes(minutes: i32) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// `GET /health/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<HealthDashboard>> {
    let db = &state.db;
    let now = Utc::now();

    let profile: Option<UserProfile> = db
        .fetch_optional(db.table("user_profiles").select("*").eq("user_id", user.id.to_string()))
        .await?;
    let welcome_name = patient_name(Some(&user), profile.as_ref());

    let snapshot = latest_or_baseline(db, user.id).await?;

    let week = week_start(now.date_naive());
    let weekly_progress = match current_week(db, user.id, week).await? {
        Some(progress) => progress,
        None => {
            db.insert("weekly_progress", &NewWeeklyProgress::new(user.id, week, 0, "red"))
                .await?
        }
    };

    let meals: Vec<FoodLog> = db
        .fetch_all(
            db.table("food_logs")
                .select("*")
                .eq("user_id", user.id.to_string())
                .gte("created_at", today_start(now).to_rfc3339_opts(SecondsFormat::Secs, true))
                .order("created_at.desc")
                .limit(5),
        )
        .await?;
    let diet_score = if meals.is_empty() {
        0
    } else {
        meals.iter().map(|m| m.diet_score.unwrap_or(0)).sum::<i32>() / meals.len() as i32
    };

    let steps = snapshot.steps.unwrap_or(0);
    let water = snapshot.water_intake.unwrap_or(0);
    let calories = snapshot.calories_burned.unwrap_or(0);
    let sleep = snapshot.sleep_time.unwrap_or(0);
    let score = daily_health_score(steps, water, diet_score);

    let trends = vec![
        HealthTrendCard {
            category: "Walking",
            icon: "walk",
            value: format!("{} steps", steps),
            trend: if steps >= 5000 { "up" } else { "down" },
            message: if steps >= 5000 { "Above average walking pace." } else { "Try a short walk today." },
        },
        HealthTrendCard {
            category: "Active Energy",
            icon: "flame",
            value: format!("{} kcal", calories),
            trend: if calories >= 300 { "up" } else { "neutral" },
            message: "Burning calories well.",
        },
        HealthTrendCard {
            category: "Sleep",
            icon: "bed",
            value: format_minutes(sleep),
            trend: if sleep >= 420 { "up" } else { "down" },
            message: if sleep >= 420 { "Well rested." } else { "Try to sleep earlier." },
        },
        HealthTrendCard {
            category: "Stand",
            icon: "body",
            value: "8 hr".to_string(),
            trend: "neutral",
            message: "Meeting stand goals.",
        },
    ];

    let tile = |id, title, value: String, unit, icon, color, is_workout| HealthCategory {
        id,
        title,
        value,
        unit,
        icon,
        color,
        is_workout,
    };
    let categories = vec![
        tile("rings", "Activity", format!("{}%", calories * 100 / 600), "goal", "aperture", "#E11D48", false),
        tile("steps", "Steps", steps.to_string(), "steps", "footsteps", "#F59E0B", false),
        tile("hr", "Heart Rate", snapshot.heart_rate.unwrap_or(72).to_string(), "BPM", "heart", "#FF3B30", false),
        tile(
            "bp",
            "Blood Pressure",
            snapshot.blood_pressure.clone().unwrap_or_else(|| "120/80".to_string()),
            "mmHg",
            "pulse",
            "#FF3B30",
            false,
        ),
        tile("water", "Water Intake", water.to_string(), "ml", "water", "#007AFF", false),
        tile("sleep", "Sleep Analysis", format_minutes(sleep), "in bed", "bed", "#FF9500", false),
    ];

    Ok(Json(HealthDashboard {
        welcome_message: format!("Welcome, {}", welcome_name),
        daily_score: DailyHealthScore {
            score,
            message: format!("Welcome, {}. You're active today!", welcome_name),
        },
        activity_rings: ActivityRing {
            move_kcal: calories,
            move_goal: 600,
            exercise: 25,
            exercise_goal: 30,
            stand: 8,
            stand_goal: 12,
        },
        health_snapshot: snapshot,
        weekly_progress,
        diet_score,
        daily_tip: daily_tip(now.date_naive()),
        meal_count_today: meals.len(),
        recent_meals: meals
            .iter()
            .map(|m| RecentMeal {
                id: m.id,
                meal_type: m.meal_type.clone(),
                detected_food: m.detected_food(),
                diet_score: m.diet_score,
                created_at: m.created_at,
            })
            .collect(),
        trends,
        categories,
    }))
}

/// `POST /health/health-data`
pub async fn add_health_data(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<HealthDataCreate>,
) -> ApiResult<Json<HealthData>> {
    request.validate()?;
    if let Some(reading) = &request.blood_pressure {
        if crate::models::parse_systolic(reading).is_none() {
            return Err(ApiError::validation_error("blood_pressure must look like 120/80"));
        }
    }

    let row = state
        .db
        .insert("health_data", &NewHealthData::from_request(user.id, Utc::now(), request))
        .await?;
    Ok(Json(row))
}

/// `GET /health/health-snapshot`
pub async fn health_snapshot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<HealthData>> {
    Ok(Json(latest_or_baseline(&state.db, user.id).await?))
}

/// `POST /health/food-log`
pub async fn log_food(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<FoodLogCreate>,
) -> ApiResult<Json<FoodLog>> {
    request.validate()?;
    let (ai_analysis, nutrients, diet_score) = manual_log_analysis(request.diet_score);

    let log = state
        .db
        .insert(
            "food_logs",
            &NewFoodLog {
                user_id: user.id,
                meal_type: request.meal_type,
                food_image_url: None,
                ai_analysis,
                diet_score,
                nutrients,
            },
        )
        .await?;
    Ok(Json(log))
}

/// `GET /health/food-logs`
pub async fn food_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<FoodLog>>> {
    let (from, to) = page_bounds(page.skip, page.limit, MAX_PAGE);
    let logs = state
        .db
        .fetch_all(
            state
                .db
                .table("food_logs")
                .select("*")
                .eq("user_id", user.id.to_string())
                .order("created_at.desc")
                .range(from, to),
        )
        .await?;
    Ok(Json(logs))
}

/// `POST /health/analyze-meal`: multipart `meal_type` + image `file`
pub async fn analyze_meal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut meal_type = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("meal_type") => meal_type = Some(field.text().await?.trim().to_string()),
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let ext = crate::services::storage::image_extension(&filename)
                    .ok_or_else(ApiError::unsupported_media_type)?;
                let content = field.bytes().await?;
                if content.len() as u64 > state.config.upload.max_file_size {
                    return Err(ApiError::payload_too_large());
                }
                image = Some((ext, content));
            }
            _ => {}
        }
    }

    let meal_type = meal_type
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::validation_error("meal_type is required"))?;
    let (ext, content) = image.ok_or_else(|| ApiError::validation_error("No file uploaded"))?;

    let name = format!("meal_{}.{}", uuid::Uuid::new_v4().simple(), ext);
    let stored = state
        .services
        .storage
        .store("meals", &name, content_type_for(&ext), content.clone())
        .await?;

    let detection = state.services.vision.detect_food(content).await;
    if detection.detected_food == "Unknown food" {
        return Err(ApiError::validation_error(
            "Could not identify the food. Upload a clearer image or log the meal manually",
        ));
    }

    let profile: Option<UserProfile> = state
        .db
        .fetch_optional(
            state
                .db
                .table("user_profiles")
                .select("*")
                .eq("user_id", user.id.to_string()),
        )
        .await?;
    let conditions = profile.map(|p| p.chronic_conditions).unwrap_or_default();
    let analysis = state.services.vision.analyze_nutrition(&detection, &conditions).await;

    let log: FoodLog = state
        .db
        .insert(
            "food_logs",
            &NewFoodLog {
                user_id: user.id,
                meal_type: meal_type.clone(),
                food_image_url: Some(stored.url.clone()),
                ai_analysis: json!({
                    "detected_food": detection.detected_food,
                    "description": analysis.description,
                    "tags": detection.tags,
                    "confidence": detection.confidence,
                    "analysis_source": detection.analysis_source,
                    "immediate_recommendation": analysis.immediate_recommendation,
                    "balancing_advice": analysis.balancing_advice,
                    "warning_level": analysis.warning_level,
                }),
                diet_score: analysis.diet_score,
                nutrients: json!(analysis.nutrients),
            },
        )
        .await?;

    tracing::info!(user_id = user.id, food = %detection.detected_food, "Meal analysed");
    Ok(Json(json!({
        "food_log_id": log.id,
        "meal_type": meal_type,
        "detected_food": detection.detected_food,
        "description": analysis.description,
        "tags": detection.tags,
        "nutrients": analysis.nutrients,
        "confidence": detection.confidence,
        "diet_score": analysis.diet_score,
        "primary_recommendation": analysis.immediate_recommendation,
        "secondary_recommendation": analysis.balancing_advice,
        "warning_level": analysis.warning_level,
        "image_url": stored.url,
    })))
}

/// `GET /health/weekly-progress`; an unsaved grey placeholder when nothing is recorded
pub async fn weekly_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<WeeklyProgress>> {
    let week = week_start(Utc::now().date_naive());
    let progress = current_week(&state.db, user.id, week).await?;

    Ok(Json(progress.unwrap_or_else(|| {
        let placeholder = NewWeeklyProgress::new(user.id, week, 0, "gray");
        WeeklyProgress {
            id: 0,
            user_id: placeholder.user_id,
            week_start_date: placeholder.week_start_date,
            week_end_date: placeholder.week_end_date,
            progress_score: 0,
            progress_color: placeholder.progress_color,
            steps_goal: placeholder.steps_goal,
            sleep_goal: placeholder.sleep_goal,
            water_goal: placeholder.water_goal,
        }
    })))
}

/// `POST /health/update-progress`
pub async fn update_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ProgressUpdateRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    let db = &state.db;
    let week = week_start(Utc::now().date_naive());
    let color = progress_color(request.progress_score);

    match current_week(db, user.id, week).await? {
        Some(existing) => {
            let _: Vec<WeeklyProgress> = db
                .update(
                    db.table("weekly_progress").eq("id", existing.id.to_string()),
                    &json!({ "progress_score": request.progress_score, "progress_color": color }),
                )
                .await?;
        }
        None => {
            let _: WeeklyProgress = db
                .insert(
                    "weekly_progress",
                    &NewWeeklyProgress::new(user.id, week, request.progress_score, color),
                )
                .await?;
        }
    }

    Ok(Json(MessageResponse::new("Progress updated successfully")))
}
