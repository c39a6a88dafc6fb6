use crate::{
    auth::{CurrentUser, Principal},
    handlers::{approved_relationship, caregiver_ids_of, notifications::deliver_all},
    models::{
        DeviceRegistration, EmergencyContact, HeartRateSample, IoTDevice, NewDevice,
        NewNotification, NewVitalReading, NotificationType, User, VitalReading, WebhookPayload,
    },
    services::HubDelivery,
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use validator::Validate;

/// Beats per minute above which a reading raises an emergency
pub const EMERGENCY_HEART_RATE: i32 = 120;

const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

pub fn is_emergency(heart_rate: i32) -> bool {
    heart_rate > EMERGENCY_HEART_RATE
}

/// `POST /iot/devices`
pub async fn register_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<DeviceRegistration>,
) -> ApiResult<Json<IoTDevice>> {
    request.validate()?;
    let db = &state.db;

    let existing: Option<IoTDevice> = db
        .fetch_optional(db.table("iot_devices").select("*").eq("device_id", &request.device_id))
        .await?;
    if let Some(device) = existing {
        if device.user_id != user.id {
            return Err(ApiError::conflict_error("Device is registered to another user"));
        }
        return Ok(Json(device));
    }

    let device: IoTDevice = db
        .insert(
            "iot_devices",
            &NewDevice {
                user_id: user.id,
                device_name: request
                    .device_name
                    .unwrap_or_else(|| format!("Device {}", request.device_id)),
                device_id: request.device_id,
                device_type: request.device_type,
                manufacturer: request.manufacturer,
                model: request.model,
                connection_status: "connected",
                last_sync: Utc::now(),
            },
        )
        .await?;

    tracing::info!(user_id = user.id, device_id = %device.device_id, "Device registered");
    Ok(Json(device))
}

/// `GET /iot/devices/{user_id}`
pub async fn list_devices(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let allowed = match &principal {
        Principal::Admin(_) => true,
        Principal::User(user) if user.id == user_id => true,
        Principal::User(user) => approved_relationship(&state.db, user.id, user_id)
            .await?
            .is_some(),
        Principal::Doctor(_) => false,
    };
    if !allowed {
        return Err(ApiError::authorization_error("Not allowed to view these devices"));
    }

    let devices: Vec<IoTDevice> = state
        .db
        .fetch_all(
            state
                .db
                .table("iot_devices")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("created_at.desc"),
        )
        .await?;
    Ok(Json(json!({ "devices": devices })))
}

/// `POST /iot/forward_to_hub`
pub async fn forward_to_hub(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(sample): Json<HeartRateSample>,
) -> ApiResult<Json<serde_json::Value>> {
    sample.validate()?;
    tracing::info!(user_id = user.id, heart_rate = sample.heart_rate, "Heart rate sample received");

    if is_emergency(sample.heart_rate) {
        raise_emergency(&state, &user, sample.heart_rate).await;
    }

    let device_id = sample
        .device_id
        .clone()
        .unwrap_or_else(|| format!("mobile-{}", user.id));
    let timestamp = sample.timestamp.unwrap_or_else(Utc::now);
    let payload = json!({
        "device_id": device_id,
        "user_id": user.id,
        "heart_rate": sample.heart_rate,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        "data_type": "heart_rate",
    });

    let delivery = state.services.iot_hub.forward(&device_id, &payload).await;
    let message = match delivery {
        HubDelivery::Forwarded => "Heart rate data forwarded to IoT Hub",
        HubDelivery::NotConfigured => "Data received (IoT Hub not configured)",
        HubDelivery::Failed => "Data received; forwarding to IoT Hub failed",
    };

    Ok(Json(json!({
        "status": delivery.as_str(),
        "message": message,
        "heart_rate": sample.heart_rate,
        "device_id": device_id,
        "emergency": is_emergency(sample.heart_rate),
    })))
}

/// `POST /iot/webhook`
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(secret) = &state.config.services.iot_webhook_secret {
        let supplied = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(secret.as_str()) {
            return Err(ApiError::authentication_error("Invalid webhook secret"));
        }
    }
    payload.validate()?;

    let db = &state.db;
    let device: IoTDevice = db
        .fetch_one(
            db.table("iot_devices").select("*").eq("device_id", &payload.device_id),
            "Device",
        )
        .await?;

    let emergency = is_emergency(payload.heart_rate);
    let reading: VitalReading = db
        .insert(
            "vital_readings",
            &NewVitalReading {
                device_id: device.id,
                user_id: device.user_id,
                heart_rate: Some(payload.heart_rate),
                blood_oxygen: payload.blood_oxygen,
                timestamp: payload.timestamp,
                is_emergency: emergency,
            },
        )
        .await?;

    let _: Vec<IoTDevice> = db
        .update(
            db.table("iot_devices").eq("id", device.id.to_string()),
            &json!({ "last_sync": Utc::now(), "connection_status": "connected" }),
        )
        .await?;

    if emergency {
        let owner: Option<User> = state.auth_service.find_user_by_id(device.user_id).await?;
        match owner {
            Some(owner) => raise_emergency(&state, &owner, payload.heart_rate).await,
            None => tracing::warn!(device_id = %device.device_id, "Emergency reading for a device without owner"),
        }
    }

    tracing::debug!(reading_id = reading.id, data_type = %payload.data_type, "Vital reading stored");
    Ok(Json(json!({
        "status": "success",
        "message": "Data received and stored",
        "reading_id": reading.id,
        "device_id": payload.device_id,
        "heart_rate": payload.heart_rate,
        "is_emergency": emergency,
    })))
}

/// `GET /iot/status`
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "IoT service is running",
        "iot_hub_configured": state.services.iot_hub.is_configured(),
        "webhook_secret_required": state.config.services.iot_webhook_secret.is_some(),
    }))
}

/// Alert every approved caregiver and text the primary emergency contact.
/// Failures are logged; the reading itself has already been accepted.
async fn raise_emergency(state: &AppState, patient: &User, heart_rate: i32) {
    let name = patient.display_name();
    let detail = format!("Heart rate of {} bpm detected", heart_rate);
    tracing::warn!(user_id = patient.id, heart_rate, "Emergency heart rate");

    match caregiver_ids_of(&state.db, patient.id).await {
        Ok(caregivers) => {
            let alerts = caregivers
                .into_iter()
                .map(|caregiver_id| {
                    NewNotification::new(
                        caregiver_id,
                        NotificationType::Critical,
                        format!("Emergency alert for {}", name),
                        format!("{}. Please check on {} immediately.", detail, name),
                    )
                    .from_sender(patient.id, "system")
                })
                .collect();
            let delivered = deliver_all(state, alerts).await;
            tracing::info!(user_id = patient.id, delivered, "Caregivers alerted");
        }
        Err(e) => tracing::error!(user_id = patient.id, "Could not load caregivers: {}", e),
    }

    let contact: ApiResult<Option<EmergencyContact>> = state
        .db
        .fetch_optional(
            state
                .db
                .table("emergency_contacts")
                .select("*")
                .eq("user_id", patient.id.to_string())
                .eq("is_primary", "true"),
        )
        .await;
    match contact {
        Ok(Some(contact)) => {
            let sent = state
                .services
                .sms
                .send_emergency_alert(&contact.phone_number, &name, &detail)
                .await;
            tracing::info!(user_id = patient.id, sent, "Emergency contact notified");
        }
        Ok(None) => tracing::debug!(user_id = patient.id, "No primary emergency contact"),
        Err(e) => tracing::error!(user_id = patient.id, "Could not load emergency contact: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_threshold_is_exclusive() {
        assert!(!is_emergency(120));
        assert!(is_emergency(121));
    }
}
