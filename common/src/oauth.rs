// OAuth2 authorization-code login for Google and Facebook

use crate::config::{OAuthConfig, OAuthProviderConfig};
use crate::errors::OAuthError;
use crate::models::AuthProvider;
use rand::RngCore;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Provider profile normalized for account lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialProfile {
    pub provider: AuthProvider,
    pub provider_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

/// Random hex value for the `state` round trip
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scope: String,
}

impl OAuthEndpoints {
    pub fn for_provider(provider: AuthProvider) -> Option<Self> {
        match provider {
            AuthProvider::Google => Some(Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token_url: "https://oauth2.googleapis.com/token".into(),
                profile_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
                scope: "openid email profile".into(),
            }),
            AuthProvider::Facebook => Some(Self {
                authorize_url: "https://www.facebook.com/v18.0/dialog/oauth".into(),
                token_url: "https://graph.facebook.com/v18.0/oauth/access_token".into(),
                profile_url:
                    "https://graph.facebook.com/me?fields=id,email,first_name,last_name,picture.type(large)"
                        .into(),
                scope: "email,public_profile".into(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: AuthProvider,
    config: OAuthProviderConfig,
    endpoints: OAuthEndpoints,
    http: Client,
}

impl OAuthClient {
    pub fn new(
        provider: AuthProvider,
        config: OAuthProviderConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OAuthError::ExchangeFailed(e.to_string()))?;
        Ok(Self {
            provider,
            config,
            endpoints,
            http,
        })
    }

    /// Client for a named provider (`google`, `facebook`) from settings
    pub fn from_settings(settings: &OAuthConfig, name: &str) -> Result<Self, OAuthError> {
        let provider: AuthProvider = name
            .parse()
            .map_err(|_| OAuthError::UnknownProvider(name.to_string()))?;
        let config = match provider {
            AuthProvider::Google => settings.google.clone(),
            AuthProvider::Facebook => settings.facebook.clone(),
            _ => return Err(OAuthError::UnknownProvider(name.to_string())),
        }
        .ok_or_else(|| OAuthError::NotConfigured(name.to_string()))?;
        let endpoints = OAuthEndpoints::for_provider(provider)
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))?;
        Self::new(provider, config, endpoints)
    }

    pub fn provider(&self) -> AuthProvider {
        self.provider
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", self.endpoints.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::NotConfigured(e.to_string()))?;
        Ok(url.into())
    }

    #[instrument(skip(self, code), fields(provider = %self.provider))]
    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::ExchangeFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(e.to_string()))?;
        Ok(token.access_token)
    }

    #[instrument(skip(self, access_token), fields(provider = %self.provider))]
    pub async fn fetch_profile(&self, access_token: &str) -> Result<SocialProfile, OAuthError> {
        let response = self
            .http
            .get(&self.endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::ProfileFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::ProfileFailed(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OAuthError::ProfileFailed(e.to_string()))?;
        debug!("Fetched OAuth profile");
        parse_profile(self.provider, &body)
    }
}

fn text(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalize a Google userinfo or Facebook Graph `/me` document
pub fn parse_profile(provider: AuthProvider, body: &Value) -> Result<SocialProfile, OAuthError> {
    let (id, first, last, avatar) = match provider {
        AuthProvider::Google => (
            text(body, "/sub").or_else(|| text(body, "/id")),
            text(body, "/given_name"),
            text(body, "/family_name"),
            text(body, "/picture"),
        ),
        _ => (
            text(body, "/id"),
            text(body, "/first_name"),
            text(body, "/last_name"),
            text(body, "/picture/data/url"),
        ),
    };

    let email = text(body, "/email").ok_or(OAuthError::MissingEmail)?;
    let provider_id =
        id.ok_or_else(|| OAuthError::ProfileFailed("profile has no id".to_string()))?;

    Ok(SocialProfile {
        provider,
        provider_id,
        email: email.to_lowercase(),
        first_name: first.unwrap_or_default(),
        last_name: last.unwrap_or_default(),
        avatar_url: avatar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_config() -> OAuthProviderConfig {
        OAuthProviderConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            redirect_url: "http://localhost:3000/auth/google/callback".into(),
        }
    }

    #[test]
    fn test_state_is_random_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url_carries_client_and_state() {
        let client = OAuthClient::new(
            AuthProvider::Google,
            provider_config(),
            OAuthEndpoints::for_provider(AuthProvider::Google).unwrap(),
        )
        .unwrap();
        let url = client.authorize_url("abc123").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn test_unconfigured_provider_is_rejected() {
        let err = OAuthClient::from_settings(&OAuthConfig::default(), "google").unwrap_err();
        assert!(matches!(err, OAuthError::NotConfigured(_)));
        let err = OAuthClient::from_settings(&OAuthConfig::default(), "myspace").unwrap_err();
        assert!(matches!(err, OAuthError::UnknownProvider(_)));
    }

    #[test]
    fn test_parse_facebook_profile() {
        let profile = parse_profile(
            AuthProvider::Facebook,
            &json!({
                "id": "fb-9",
                "email": "Priya@Example.com",
                "first_name": "Priya",
                "last_name": "S",
                "picture": {"data": {"url": "https://cdn/p.jpg"}}
            }),
        )
        .unwrap();
        assert_eq!(profile.provider_id, "fb-9");
        assert_eq!(profile.email, "priya@example.com");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn/p.jpg"));
    }

    #[test]
    fn test_profile_without_email_is_rejected() {
        let err = parse_profile(AuthProvider::Google, &json!({"sub": "g-1"})).unwrap_err();
        assert!(matches!(err, OAuthError::MissingEmail));
    }

    #[tokio::test]
    async fn test_exchange_code_and_fetch_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "g-42", "email": "a@b.io", "given_name": "Asha", "family_name": "K"
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(
            AuthProvider::Google,
            provider_config(),
            OAuthEndpoints {
                authorize_url: format!("{}/auth", server.uri()),
                token_url: format!("{}/token", server.uri()),
                profile_url: format!("{}/userinfo", server.uri()),
                scope: "email".into(),
            },
        )
        .unwrap();

        let token = client.exchange_code("the-code").await.unwrap();
        let profile = client.fetch_profile(&token).await.unwrap();
        assert_eq!(profile.provider_id, "g-42");
        assert_eq!(profile.first_name, "Asha");
    }

    #[tokio::test]
    async fn test_exchange_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = OAuthClient::new(
            AuthProvider::Facebook,
            provider_config(),
            OAuthEndpoints {
                authorize_url: format!("{}/auth", server.uri()),
                token_url: format!("{}/token", server.uri()),
                profile_url: format!("{}/me", server.uri()),
                scope: "email".into(),
            },
        )
        .unwrap();
        assert!(matches!(
            client.exchange_code("x").await,
            Err(OAuthError::ExchangeFailed(_))
        ));
    }
}
