//! Thin clients for the third-party HTTP APIs.
//!
//! Each client is built from [`Config`] and degrades to a logged no-op or a
//! mock result when its credentials are missing or the remote call fails.

pub mod email;
pub mod iot_hub;
pub mod sms;
pub mod storage;
pub mod vision;

pub use email::EmailService;
pub use iot_hub::{HubDelivery, IotHubService};
pub use sms::SmsService;
pub use storage::{StorageService, StoredFile};
pub use vision::{FoodDetection, NutritionAnalysis, VisionService};

use crate::utils::{ApiResult, Config};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Services {
    pub email: EmailService,
    pub sms: SmsService,
    pub storage: StorageService,
    pub vision: VisionService,
    pub iot_hub: IotHubService,
}

impl Services {
    pub fn new(config: &Config) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let services = Self {
            email: EmailService::new(http.clone(), config),
            sms: SmsService::new(http.clone(), config),
            storage: StorageService::new(http.clone(), config),
            vision: VisionService::new(http.clone(), config),
            iot_hub: IotHubService::new(http, config),
        };

        tracing::info!(
            email = services.email.is_configured(),
            sms = services.sms.is_configured(),
            blob_storage = services.storage.uses_blob_storage(),
            vision = services.vision.vision_configured(),
            openai = services.vision.openai_configured(),
            iot_hub = services.iot_hub.is_configured(),
            "External services initialised"
        );
        Ok(services)
    }
}
