use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthData {
    pub id: i64,
    pub user_id: i64,
    pub date: DateTime<Utc>,
    pub steps: Option<i32>,
    /// Minutes
    pub sleep_time: Option<i32>,
    /// Millilitres
    pub water_intake: Option<i32>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i32>,
    pub blood_glucose: Option<f64>,
    pub calories_burned: Option<i32>,
}

impl HealthData {
    /// Systolic part of a "120/80" reading
    pub fn systolic(&self) -> Option<f64> {
        parse_systolic(self.blood_pressure.as_deref()?)
    }
}

pub fn parse_systolic(reading: &str) -> Option<f64> {
    reading.split('/').next()?.trim().parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthDataCreate {
    #[validate(range(min = 0, max = 200_000))]
    pub steps: Option<i32>,
    #[validate(range(min = 0, max = 1440))]
    pub sleep_time: Option<i32>,
    #[validate(range(min = 0, max = 20_000))]
    pub water_intake: Option<i32>,
    #[validate(length(min = 3, max = 10))]
    pub blood_pressure: Option<String>,
    #[validate(range(min = 20, max = 250))]
    pub heart_rate: Option<i32>,
    #[validate(range(min = 10.0, max = 1000.0))]
    pub blood_glucose: Option<f64>,
    #[validate(range(min = 0, max = 20_000))]
    pub calories_burned: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct NewHealthData {
    pub user_id: i64,
    pub date: DateTime<Utc>,
    pub steps: Option<i32>,
    pub sleep_time: Option<i32>,
    pub water_intake: Option<i32>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i32>,
    pub blood_glucose: Option<f64>,
    pub calories_burned: Option<i32>,
}

impl NewHealthData {
    /// Placeholder snapshot for a user with no readings yet
    pub fn baseline(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            date: now,
            steps: Some(0),
            sleep_time: Some(480),
            water_intake: Some(0),
            blood_pressure: Some("120/80".to_string()),
            heart_rate: Some(72),
            blood_glucose: Some(90.0),
            calories_burned: Some(0),
        }
    }

    pub fn from_request(user_id: i64, now: DateTime<Utc>, request: HealthDataCreate) -> Self {
        Self {
            user_id,
            date: now,
            steps: request.steps,
            sleep_time: request.sleep_time,
            water_intake: request.water_intake,
            blood_pressure: request.blood_pressure,
            heart_rate: request.heart_rate,
            blood_glucose: request.blood_glucose,
            calories_burned: request.calories_burned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodLog {
    pub id: i64,
    pub user_id: i64,
    pub meal_type: Option<String>,
    pub food_image_url: Option<String>,
    pub ai_analysis: Option<serde_json::Value>,
    pub diet_score: Option<i32>,
    pub nutrients: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl FoodLog {
    pub fn detected_food(&self) -> String {
        self.ai_analysis
            .as_ref()
            .and_then(|a| a.get("detected_food"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct FoodLogCreate {
    #[validate(length(min = 1, max = 30))]
    pub meal_type: String,
    #[validate(range(min = 0, max = 100))]
    pub diet_score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct NewFoodLog {
    pub user_id: i64,
    pub meal_type: String,
    pub food_image_url: Option<String>,
    pub ai_analysis: serde_json::Value,
    pub diet_score: i32,
    pub nutrients: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyProgress {
    pub id: i64,
    pub user_id: i64,
    pub week_start_date: NaiveDate,
    pub week_end_date: NaiveDate,
    pub progress_score: i32,
    pub progress_color: String,
    #[serde(default = "default_steps_goal")]
    pub steps_goal: i32,
    #[serde(default = "default_sleep_goal")]
    pub sleep_goal: i32,
    #[serde(default = "default_water_goal")]
    pub water_goal: i32,
}

fn default_steps_goal() -> i32 {
    10_000
}

fn default_sleep_goal() -> i32 {
    480
}

fn default_water_goal() -> i32 {
    2_000
}

#[derive(Debug, Serialize)]
pub struct NewWeeklyProgress {
    pub user_id: i64,
    pub week_start_date: NaiveDate,
    pub week_end_date: NaiveDate,
    pub progress_score: i32,
    pub progress_color: String,
    pub steps_goal: i32,
    pub sleep_goal: i32,
    pub water_goal: i32,
}

impl NewWeeklyProgress {
    pub fn new(user_id: i64, week_start: NaiveDate, score: i32, color: &str) -> Self {
        Self {
            user_id,
            week_start_date: week_start,
            week_end_date: week_start + chrono::Duration::days(6),
            progress_score: score,
            progress_color: color.to_string(),
            steps_goal: default_steps_goal(),
            sleep_goal: default_sleep_goal(),
            water_goal: default_water_goal(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProgressUpdateRequest {
    #[validate(range(min = 0, max = 100))]
    pub progress_score: i32,
}

#[derive(Debug, Serialize)]
pub struct ActivityRing {
    pub move_kcal: i32,
    pub move_goal: i32,
    pub exercise: i32,
    pub exercise_goal: i32,
    pub stand: i32,
    pub stand_goal: i32,
}

#[derive(Debug, Serialize)]
pub struct HealthTrendCard {
    pub category: &'static str,
    pub icon: &'static str,
    pub value: String,
    pub trend: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthCategory {
    pub id: &'static str,
    pub title: &'static str,
    pub value: String,
    pub unit: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub is_workout: bool,
}

#[derive(Debug, Serialize)]
pub struct DailyHealthScore {
    pub score: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RecentMeal {
    pub id: i64,
    pub meal_type: Option<String>,
    pub detected_food: String,
    pub diet_score: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HealthDashboard {
    pub welcome_message: String,
    pub health_snapshot: HealthData,
    pub weekly_progress: WeeklyProgress,
    pub diet_score: i32,
    pub daily_tip: &'static str,
    pub recent_meals: Vec<RecentMeal>,
    pub meal_count_today: usize,
    pub daily_score: DailyHealthScore,
    pub activity_rings: ActivityRing,
    pub trends: Vec<HealthTrendCard>,
    pub categories: Vec<HealthCategory>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub patient_id: Option<String>,
    pub progress_score: i32,
    pub progress_color: String,
}

#[derive(Debug, Serialize)]
pub struct WeeklyLeaderboard {
    pub week_start: NaiveDate,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub current_user_rank: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ProgressHistory {
    pub patient_id: Option<String>,
    pub progress_history: Vec<WeeklyProgress>,
}

#[derive(Debug, Serialize)]
pub struct AchievementsResponse {
    pub patient_id: Option<String>,
    #[serde(flatten)]
    pub summary: crate::analytics::Achievements,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systolic_is_parsed_from_reading() {
        assert_eq!(parse_systolic("135/85"), Some(135.0));
        assert_eq!(parse_systolic(" 120 /80"), Some(120.0));
        assert_eq!(parse_systolic("high"), None);
    }
}
