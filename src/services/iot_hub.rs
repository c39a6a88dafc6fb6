use crate::utils::Config;

const API_VERSION: &str = "2020-03-13";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubDelivery {
    Forwarded,
    NotConfigured,
    Failed,
}

impl HubDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::NotConfigured => "accepted",
            Self::Failed => "failed",
        }
    }
}

/// Device-to-cloud messages over the IoT Hub REST endpoint
pub struct IotHubService {
    http: reqwest::Client,
    base_url: Option<String>,
    sas_token: Option<String>,
}

impl IotHubService {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        let base_url = config.services.iot_hub_host.as_ref().map(|host| {
            let host = host.trim_end_matches('/');
            if host.starts_with("http://") || host.starts_with("https://") {
                host.to_string()
            } else {
                format!("https://{}", host)
            }
        });
        Self {
            http,
            base_url,
            sas_token: config.services.iot_hub_sas_token.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.sas_token.is_some()
    }

    pub async fn forward(&self, device_id: &str, payload: &serde_json::Value) -> HubDelivery {
        let (Some(base_url), Some(sas_token)) = (&self.base_url, &self.sas_token) else {
            tracing::debug!(device_id, "IoT Hub not configured, not forwarding");
            return HubDelivery::NotConfigured;
        };

        let url = format!(
            "{}/devices/{}/messages/events?api-version={}",
            base_url,
            urlencoding::encode(device_id),
            API_VERSION
        );

        match self
            .http
            .post(url)
            .header("Authorization", sas_token)
            .json(payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => HubDelivery::Forwarded,
            Ok(response) => {
                tracing::warn!(device_id, status = %response.status(), "IoT Hub rejected message");
                HubDelivery::Failed
            }
            Err(e) => {
                tracing::warn!(device_id, "IoT Hub request failed: {}", e);
                HubDelivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_with_sas_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/devices/watch-1/messages/events")
            .match_query(mockito::Matcher::UrlEncoded("api-version".into(), API_VERSION.into()))
            .match_header("authorization", "SharedAccessSignature sr=x")
            .with_status(204)
            .create_async()
            .await;

        let mut config = Config::default();
        config.services.iot_hub_host = Some(server.url());
        config.services.iot_hub_sas_token = Some("SharedAccessSignature sr=x".into());
        let hub = IotHubService::new(reqwest::Client::new(), &config);

        let delivery = hub.forward("watch-1", &serde_json::json!({ "heart_rate": 80 })).await;
        assert_eq!(delivery, HubDelivery::Forwarded);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_hub_only_acknowledges() {
        let hub = IotHubService::new(reqwest::Client::new(), &Config::default());
        let delivery = hub.forward("watch-1", &serde_json::json!({})).await;
        assert_eq!(delivery, HubDelivery::NotConfigured);
        assert_eq!(delivery.as_str(), "accepted");
    }
}
