use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoTDevice {
    pub id: i64,
    pub user_id: i64,
    pub device_id: String,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub connection_status: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeviceRegistration {
    #[validate(length(min = 3, max = 128))]
    pub device_id: String,
    #[validate(length(min = 1, max = 50))]
    pub device_type: String,
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewDevice {
    pub user_id: i64,
    pub device_id: String,
    pub device_type: String,
    pub device_name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub connection_status: &'static str,
    pub last_sync: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalReading {
    pub id: i64,
    pub device_id: i64,
    pub user_id: i64,
    pub heart_rate: Option<i32>,
    pub blood_oxygen: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_emergency: bool,
}

#[derive(Debug, Serialize)]
pub struct NewVitalReading {
    pub device_id: i64,
    pub user_id: i64,
    pub heart_rate: Option<i32>,
    pub blood_oxygen: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub is_emergency: bool,
}

/// Heart-rate sample posted by the mobile app
#[derive(Debug, Deserialize, Validate)]
pub struct HeartRateSample {
    #[validate(range(min = 1, max = 300))]
    pub heart_rate: i32,
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Telemetry relayed by the IoT Hub function
#[derive(Debug, Deserialize, Validate)]
pub struct WebhookPayload {
    #[validate(length(min = 1))]
    pub device_id: String,
    #[validate(range(min = 1, max = 300))]
    pub heart_rate: i32,
    pub blood_oxygen: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

fn default_data_type() -> String {
    "heart_rate".to_string()
}
