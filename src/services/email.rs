use crate::utils::Config;
use serde_json::json;

const SENDGRID_API: &str = "https://api.sendgrid.com";
const SENDER_NAME: &str = "HEWAL3 Health System";

/// SendGrid v3 mail client
pub struct EmailService {
    http: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    from_email: String,
    frontend_url: String,
}

impl EmailService {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.services.sendgrid_api_key.clone(),
            api_base: SENDGRID_API.to_string(),
            from_email: config.services.from_email.clone(),
            frontend_url: config.server.frontend_url.clone(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns whether SendGrid accepted the message
    pub async fn send(&self, to: &str, subject: &str, html: &str, text: Option<&str>) -> bool {
        let Some(api_key) = &self.api_key else {
            tracing::info!(to, subject, "Email not configured, skipping send");
            return false;
        };

        let mut content = Vec::new();
        if let Some(text) = text {
            content.push(json!({ "type": "text/plain", "value": text }));
        }
        content.push(json!({ "type": "text/html", "value": html }));

        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_email, "name": SENDER_NAME },
            "subject": subject,
            "content": content,
        });

        let result = self
            .http
            .post(format!("{}/v3/mail/send", self.api_base))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(to, subject, "Email sent");
                true
            }
            Ok(response) => {
                tracing::error!(to, status = %response.status(), "SendGrid rejected email");
                false
            }
            Err(e) => {
                tracing::error!(to, "Error sending email: {}", e);
                false
            }
        }
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> bool {
        let html = format!(
            "<h2>Hello {name},</h2>\
             <p>Thank you for joining HEWAL3 Health Management System.</p>\
             <p><a href=\"{url}\">Open your dashboard</a></p>",
            name = name,
            url = self.frontend_url,
        );
        let text = format!(
            "Hello {},\n\nThank you for joining HEWAL3 Health Management System.\n{}",
            name, self.frontend_url
        );
        self.send(to, "Welcome to HEWAL3!", &html, Some(&text)).await
    }

    pub async fn send_caregiver_request(&self, to: &str, patient_name: &str, caregiver_name: &str) -> bool {
        let html = format!(
            "<p>Hello {},</p><p>{} has asked to become your caregiver on HEWAL3.</p>\
             <p><a href=\"{}/caregivers/requests\">Review the request</a></p>",
            patient_name, caregiver_name, self.frontend_url
        );
        self.send(to, "New caregiver request", &html, None).await
    }

    pub async fn send_emergency_alert(&self, to: &str, patient_name: &str, detail: &str) -> bool {
        let html = format!(
            "<h2>Emergency alert for {}</h2><p>{}</p><p>HEWAL3 Emergency Response</p>",
            patient_name, detail
        );
        self.send(to, &format!("EMERGENCY: {}", patient_name), &html, Some(detail))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(api_key: Option<&str>, base: &str) -> EmailService {
        let mut config = Config::default();
        config.services.sendgrid_api_key = api_key.map(str::to_string);
        EmailService::new(reqwest::Client::new(), &config).with_api_base(base)
    }

    #[tokio::test]
    async fn unconfigured_send_is_noop() {
        let email = service(None, "http://127.0.0.1:1");
        assert!(!email.send("a@example.com", "Hi", "<p>Hi</p>", None).await);
    }

    #[tokio::test]
    async fn posts_to_sendgrid() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mail/send")
            .match_header("authorization", "Bearer sg-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "personalizations": [{ "to": [{ "email": "a@example.com" }] }],
                "subject": "Welcome to HEWAL3!"
            })))
            .with_status(202)
            .create_async()
            .await;

        let email = service(Some("sg-key"), &server.url());
        assert!(email.send_welcome("a@example.com", "Ama").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_send_reports_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v3/mail/send")
            .with_status(401)
            .create_async()
            .await;

        let email = service(Some("bad"), &server.url());
        assert!(!email.send("a@example.com", "Hi", "<p>Hi</p>", None).await);
    }
}
