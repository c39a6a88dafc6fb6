use crate::utils::Config;
use serde_json::json;

/// Infobip SMS client
pub struct SmsService {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    sender: String,
}

impl SmsService {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config
                .services
                .infobip_base_url
                .as_ref()
                .map(|url| with_scheme(url)),
            api_key: config.services.infobip_api_key.clone(),
            sender: config.services.sms_sender.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }

    /// Returns whether Infobip accepted the message
    pub async fn send_sms(&self, to_phone: &str, message: &str) -> bool {
        let (Some(base_url), Some(api_key)) = (&self.base_url, &self.api_key) else {
            tracing::info!(to = to_phone, "SMS not configured, skipping send");
            return false;
        };

        let body = json!({
            "messages": [{
                "destinations": [{ "to": normalize_phone(to_phone) }],
                "from": self.sender,
                "text": message,
            }]
        });

        let result = self
            .http
            .post(format!("{}/sms/2/text/advanced", base_url))
            .header("Authorization", format!("App {}", api_key))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(to = to_phone, "SMS sent");
                true
            }
            Ok(response) => {
                tracing::error!(to = to_phone, status = %response.status(), "Infobip rejected SMS");
                false
            }
            Err(e) => {
                tracing::error!(to = to_phone, "Error sending SMS: {}", e);
                false
            }
        }
    }

    pub async fn send_emergency_alert(&self, to_phone: &str, patient_name: &str, alert: &str) -> bool {
        let message = format!(
            "EMERGENCY ALERT for {}\nAlert: {}\nHEWAL3 detected critical vitals.\n\nHEWAL3 Emergency Response",
            patient_name, alert
        );
        self.send_sms(to_phone, &message).await
    }
}

fn with_scheme(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Infobip wants international digits without `+` or `00`
fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.strip_prefix("00").map(str::to_string).unwrap_or(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalisation() {
        assert_eq!(normalize_phone("+233 24 123 4567"), "233241234567");
        assert_eq!(normalize_phone("00233241234567"), "233241234567");
        assert_eq!(with_scheme("abc.api.infobip.com/"), "https://abc.api.infobip.com");
    }

    #[tokio::test]
    async fn sends_through_infobip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sms/2/text/advanced")
            .match_header("authorization", "App ib-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "messages": [{ "destinations": [{ "to": "233241234567" }], "from": "HEWAL3" }]
            })))
            .with_status(200)
            .with_body(r#"{"messages":[]}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.services.infobip_base_url = Some(server.url());
        config.services.infobip_api_key = Some("ib-key".into());
        let sms = SmsService::new(reqwest::Client::new(), &config);

        assert!(sms.send_emergency_alert("+233241234567", "Kofi", "Heart rate 140 bpm").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_is_noop() {
        let sms = SmsService::new(reqwest::Client::new(), &Config::default());
        assert!(!sms.is_configured());
        assert!(!sms.send_sms("+233241234567", "hello").await);
    }
}
