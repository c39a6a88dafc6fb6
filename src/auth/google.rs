//! Google sign-in (authorization code flow with PKCE).
//!
//! `authorize_url` hands back the consent-screen URL and remembers the CSRF
//! state with its PKCE verifier for ten minutes. `exchange_code` consumes that
//! state, trades the code for an access token and loads the Google profile.

use crate::{
    models::GoogleUserInfo,
    utils::{config::OAuthConfig, ApiError, ApiResult},
};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const STATE_TTL: Duration = Duration::from_secs(600);

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Pending authorization attempts keyed by CSRF state
#[derive(Default)]
pub struct OAuthStateStore {
    pending: Mutex<HashMap<String, (String, Instant)>>,
}

impl OAuthStateStore {
    async fn put(&self, state: String, verifier: String) {
        let mut pending = self.pending.lock().await;
        pending.retain(|_, (_, created)| created.elapsed() < STATE_TTL);
        pending.insert(state, (verifier, Instant::now()));
    }

    /// Removes the state; expired or unknown states yield `None`
    async fn take(&self, state: &str) -> Option<String> {
        let mut pending = self.pending.lock().await;
        pending
            .remove(state)
            .filter(|(_, created)| created.elapsed() < STATE_TTL)
            .map(|(verifier, _)| verifier)
    }
}

pub struct GoogleOAuth {
    client: ConfiguredClient,
}

impl GoogleOAuth {
    /// `None` when Google credentials are not configured
    pub fn from_config(config: &OAuthConfig) -> ApiResult<Option<Self>> {
        let (Some(client_id), Some(client_secret)) =
            (config.google_client_id.clone(), config.google_client_secret.clone())
        else {
            return Ok(None);
        };

        let invalid = |e: oauth2::url::ParseError| {
            tracing::error!("Invalid Google OAuth URL: {}", e);
            ApiError::internal_error("Google sign-in is misconfigured")
        };

        let client = BasicClient::new(ClientId::new(client_id))
            .set_client_secret(ClientSecret::new(client_secret))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string()).map_err(invalid)?)
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).map_err(invalid)?)
            .set_redirect_uri(RedirectUrl::new(config.google_redirect_url.clone()).map_err(invalid)?);

        Ok(Some(Self { client }))
    }

    /// Consent-screen URL for a new sign-in attempt
    pub async fn authorize_url(&self, store: &OAuthStateStore) -> String {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        store
            .put(csrf_state.secret().clone(), pkce_verifier.secret().clone())
            .await;

        auth_url.to_string()
    }

    /// Exchange authorization code for tokens and get user info
    pub async fn exchange_code(
        &self,
        store: &OAuthStateStore,
        code: &str,
        state: &str,
    ) -> ApiResult<GoogleUserInfo> {
        let verifier = store
            .take(state)
            .await
            .ok_or_else(|| ApiError::validation_error("Invalid or expired OAuth state"))?;

        // Token endpoint must not follow redirects
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(&http_client)
            .await
            .map_err(|e| {
                tracing::warn!("Google token exchange failed: {}", e);
                ApiError::authentication_error("Google sign-in failed")
            })?;

        let response = reqwest::Client::new()
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!("Google userinfo returned {}", response.status());
            return Err(ApiError::authentication_error("Google sign-in failed"));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_google_is_disabled() {
        let config = OAuthConfig::default();
        assert!(GoogleOAuth::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn authorize_url_registers_state() {
        let config = OAuthConfig {
            google_client_id: Some("client".to_string()),
            google_client_secret: Some("secret".to_string()),
            google_redirect_url: "http://localhost:8000/auth/google/callback".to_string(),
        };
        let google = GoogleOAuth::from_config(&config).unwrap().unwrap();
        let store = OAuthStateStore::default();

        let url = google.authorize_url(&store).await;
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("code_challenge="));

        let state = url
            .split('&')
            .find_map(|pair| pair.strip_prefix("state="))
            .unwrap()
            .to_string();
        assert!(store.take(&state).await.is_some());
        assert!(store.take(&state).await.is_none());
    }
}
