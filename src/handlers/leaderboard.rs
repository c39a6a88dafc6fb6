use crate::{
    analytics::{achievements, week_start},
    auth::CurrentUser,
    handlers::users_by_id,
    models::{
        AchievementsResponse, LeaderboardEntry, ProgressHistory, User, WeeklyLeaderboard,
        WeeklyProgress,
    },
    utils::ApiResult,
    AppState,
};
use axum::{extract::State, Json};
use chrono::Utc;
use std::collections::HashMap;

const LEADERBOARD_SIZE: usize = 50;
const HISTORY_WEEKS: usize = 52;

/// Rank rows already sorted by score, skipping inactive or missing accounts
fn rank(rows: Vec<WeeklyProgress>, users: &HashMap<i64, User>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .filter_map(|row| {
            let user = users.get(&row.user_id).filter(|u| u.is_active)?;
            Some((row, user.patient_id.clone()))
        })
        .take(LEADERBOARD_SIZE)
        .enumerate()
        .map(|(i, (row, patient_id))| LeaderboardEntry {
            rank: i + 1,
            user_id: row.user_id,
            patient_id,
            progress_score: row.progress_score,
            progress_color: row.progress_color,
        })
        .collect()
}

/// `GET /leaderboard/weekly`
pub async fn weekly(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<WeeklyLeaderboard>> {
    let db = &state.db;
    let week = week_start(Utc::now().date_naive());

    // Over-fetch so inactive accounts can be dropped without shrinking the board
    let rows: Vec<WeeklyProgress> = db
        .fetch_all(
            db.table("weekly_progress")
                .select("*")
                .gte("week_start_date", week.to_string())
                .gt("progress_score", "0")
                .order("progress_score.desc")
                .limit(LEADERBOARD_SIZE * 2),
        )
        .await?;

    let mut ids: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = users_by_id(db, &ids).await?;

    let leaderboard = rank(rows, &users);
    let current_user_rank = leaderboard
        .iter()
        .find(|entry| entry.user_id == user.id)
        .map(|entry| entry.rank);

    Ok(Json(WeeklyLeaderboard {
        week_start: week,
        leaderboard,
        current_user_rank,
    }))
}

/// `GET /leaderboard/history`
pub async fn history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ProgressHistory>> {
    let progress_history = state
        .db
        .fetch_all(
            state
                .db
                .table("weekly_progress")
                .select("*")
                .eq("user_id", user.id.to_string())
                .order("week_start_date.desc")
                .limit(HISTORY_WEEKS),
        )
        .await?;

    Ok(Json(ProgressHistory {
        patient_id: user.patient_id,
        progress_history,
    }))
}

/// `GET /leaderboard/achievements`
pub async fn user_achievements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<AchievementsResponse>> {
    let weeks: Vec<WeeklyProgress> = state
        .db
        .fetch_all(
            state
                .db
                .table("weekly_progress")
                .select("*")
                .eq("user_id", user.id.to_string())
                .order("week_start_date.asc"),
        )
        .await?;

    Ok(Json(AchievementsResponse {
        patient_id: user.patient_id,
        summary: achievements(&weeks),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn user(id: i64, active: bool) -> User {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "email": format!("u{}@example.com", id),
            "username": null,
            "patient_id": format!("u{}00001", id),
            "caregiver_id": null,
            "is_active": active,
            "first_name": null,
            "last_name": null,
            "caregiver_type": null,
            "experience_years": null,
            "phone_number": null,
            "max_patients": null,
            "last_login": null,
            "created_at": null
        }))
        .unwrap()
    }

    fn row(user_id: i64, score: i32) -> WeeklyProgress {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        WeeklyProgress {
            id: user_id,
            user_id,
            week_start_date: start,
            week_end_date: start + chrono::Duration::days(6),
            progress_score: score,
            progress_color: "green".into(),
            steps_goal: 10_000,
            sleep_goal: 480,
            water_goal: 2_000,
        }
    }

    #[test]
    fn inactive_users_are_skipped_without_gaps() {
        let users: HashMap<i64, User> = [user(1, true), user(2, false), user(3, true)]
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let board = rank(vec![row(1, 95), row(2, 90), row(3, 80)], &users);

        let ranks: Vec<(usize, i64)> = board.iter().map(|e| (e.rank, e.user_id)).collect();
        assert_eq!(ranks, vec![(1, 1), (2, 3)]);
    }
}
