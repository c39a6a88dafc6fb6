pub mod admin;
pub mod analytics;
pub mod auth;
pub mod caregivers;
pub mod doctors;
pub mod health;
pub mod iot;
pub mod leaderboard;
pub mod messages;
pub mod notifications;
pub mod schedule;
pub mod system;
pub mod tasks;
pub mod users;

use crate::{
    db::Database,
    models::{CaregiverRelationship, RelationshipStatus, User, UserProfile},
    utils::{ApiError, ApiResult},
};
use std::collections::HashMap;

/// Approved link where `caregiver_id` looks after `patient_id`
pub(crate) async fn approved_relationship(
    db: &Database,
    caregiver_id: i64,
    patient_id: i64,
) -> ApiResult<Option<CaregiverRelationship>> {
    db.fetch_optional(
        db.table("caregiver_relationships")
            .select("*")
            .eq("caregiver_id", caregiver_id.to_string())
            .eq("patient_id", patient_id.to_string())
            .eq("status", RelationshipStatus::Approved.as_str()),
    )
    .await
}

/// Caregiver access to a patient's records
pub(crate) async fn ensure_caregiver_of(db: &Database, caregiver_id: i64, patient_id: i64) -> ApiResult<()> {
    match approved_relationship(db, caregiver_id, patient_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::authorization_error(
            "No approved caregiver relationship with this patient",
        )),
    }
}

/// Approved relationship in either direction
pub(crate) async fn are_connected(db: &Database, a: i64, b: i64) -> ApiResult<bool> {
    let filter = format!(
        "and(caregiver_id.eq.{a},patient_id.eq.{b}),and(caregiver_id.eq.{b},patient_id.eq.{a})"
    );
    let rows = db
        .count(
            db.table("caregiver_relationships")
                .select("id")
                .eq("status", RelationshipStatus::Approved.as_str())
                .or(filter),
        )
        .await?;
    Ok(rows > 0)
}

/// Every approved relationship touching `user_id`, from either side
pub(crate) async fn approved_partners(db: &Database, user_id: i64) -> ApiResult<Vec<CaregiverRelationship>> {
    db.fetch_all(
        db.table("caregiver_relationships")
            .select("*")
            .eq("status", RelationshipStatus::Approved.as_str())
            .or(format!("caregiver_id.eq.{user_id},patient_id.eq.{user_id}")),
    )
    .await
}

/// Caregivers approved to look after `patient_id`
pub(crate) async fn caregiver_ids_of(db: &Database, patient_id: i64) -> ApiResult<Vec<i64>> {
    let rows: Vec<CaregiverRelationship> = db
        .fetch_all(
            db.table("caregiver_relationships")
                .select("*")
                .eq("patient_id", patient_id.to_string())
                .eq("status", RelationshipStatus::Approved.as_str()),
        )
        .await?;
    Ok(rows.into_iter().map(|r| r.caregiver_id).collect())
}

/// Patients approved for `caregiver_id`
pub(crate) async fn patient_ids_of(db: &Database, caregiver_id: i64) -> ApiResult<Vec<i64>> {
    let rows: Vec<CaregiverRelationship> = db
        .fetch_all(
            db.table("caregiver_relationships")
                .select("*")
                .eq("caregiver_id", caregiver_id.to_string())
                .eq("status", RelationshipStatus::Approved.as_str()),
        )
        .await?;
    Ok(rows.into_iter().map(|r| r.patient_id).collect())
}

fn id_list(ids: &[i64]) -> Vec<String> {
    ids.iter().map(i64::to_string).collect()
}

pub(crate) async fn users_by_id(db: &Database, ids: &[i64]) -> ApiResult<HashMap<i64, User>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users: Vec<User> = db
        .fetch_all(db.table("users").select("*").in_("id", id_list(ids)))
        .await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

pub(crate) async fn profiles_by_user(db: &Database, ids: &[i64]) -> ApiResult<HashMap<i64, UserProfile>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let profiles: Vec<UserProfile> = db
        .fetch_all(db.table("user_profiles").select("*").in_("user_id", id_list(ids)))
        .await?;
    Ok(profiles.into_iter().map(|p| (p.user_id, p)).collect())
}

pub(crate) async fn find_user(db: &Database, id: i64) -> ApiResult<User> {
    db.fetch_one(db.table("users").select("*").eq("id", id.to_string()), "User")
        .await
}

/// Profile name first, then the account's display name
pub(crate) fn patient_name(user: Option<&User>, profile: Option<&UserProfile>) -> String {
    profile
        .and_then(|p| p.full_name.clone())
        .filter(|n| !n.trim().is_empty())
        .or_else(|| user.map(User::display_name))
        .unwrap_or_else(|| "Unknown patient".to_string())
}

/// Inclusive `Range` bounds for a page of `limit` rows starting at `offset`
pub(crate) fn page_bounds(offset: usize, limit: usize, max: usize) -> (usize, usize) {
    let limit = limit.clamp(1, max);
    (offset, offset.saturating_add(limit - 1))
}
