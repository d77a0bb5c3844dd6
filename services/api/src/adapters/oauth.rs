//! services/api/src/adapters/oauth.rs
//!
//! The `OAuthProvider` implementation for Google, GitHub and LinkedIn. It runs
//! the authorization-code exchange over HTTPS and maps each provider's user
//! info onto an `OAuthProfile`.

use async_trait::async_trait;
use dose_core::{OAuthProfile, OAuthProvider, OAuthProviderKind, PortError, PortResult};
use reqwest::{header, Client, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::warn;

use crate::config::OAuthClientConfig;

const USER_AGENT: &str = "dose-api";

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    scope: &'static str,
}

fn endpoints(kind: OAuthProviderKind) -> Endpoints {
    match kind {
        OAuthProviderKind::Google => Endpoints {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
            scope: "openid email profile",
        },
        OAuthProviderKind::Github => Endpoints {
            authorize: "https://github.com/login/oauth/authorize",
            token: "https://github.com/login/oauth/access_token",
            scope: "read:user user:email",
        },
        OAuthProviderKind::Linkedin => Endpoints {
            authorize: "https://www.linkedin.com/oauth/v2/authorization",
            token: "https://www.linkedin.com/oauth/v2/accessToken",
            scope: "openid profile email",
        },
    }
}

//=========================================================================================
// Provider Payloads
//=========================================================================================

/// GitHub answers a bad code with 200 and an `error` field, so both are optional.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

/// OpenID Connect user info, as served by Google and LinkedIn.
#[derive(Deserialize)]
struct OpenIdUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn openid_profile(kind: OAuthProviderKind, info: OpenIdUserInfo) -> PortResult<OAuthProfile> {
    let email = info.email.filter(|e| !e.trim().is_empty()).ok_or_else(|| {
        warn!(provider = %kind, "Provider returned no email");
        PortError::Unauthorized
    })?;
    Ok(OAuthProfile {
        provider: kind,
        provider_user_id: info.sub,
        email,
        name: info.name.filter(|n| !n.trim().is_empty()),
    })
}

/// The primary address wins, then any verified one.
fn github_profile(user: GithubUser, emails: Vec<GithubEmail>) -> PortResult<OAuthProfile> {
    let email = emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
        .ok_or_else(|| {
            warn!(provider = "github", "No verified email on the GitHub account");
            PortError::Unauthorized
        })?;
    Ok(OAuthProfile {
        provider: OAuthProviderKind::Github,
        provider_user_id: user.id.to_string(),
        email,
        name: user.name.filter(|n| !n.trim().is_empty()).or(Some(user.login)),
    })
}

//=========================================================================================
// The Adapter
//=========================================================================================

pub struct HttpOAuthProvider {
    kind: OAuthProviderKind,
    client: OAuthClientConfig,
    http: Client,
}

impl HttpOAuthProvider {
    pub fn new(kind: OAuthProviderKind, client: OAuthClientConfig, http: Client) -> Self {
        Self { kind, client, http }
    }

    async fn fetch_access_token(&self, code: &str, redirect_uri: &str) -> PortResult<String> {
        let response = self
            .http
            .post(endpoints(self.kind).token)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("{} token request failed: {}", self.kind, e)))?;

        let status = response.status();
        if status.is_client_error() {
            warn!(provider = %self.kind, %status, "Authorization code was rejected");
            return Err(PortError::Unauthorized);
        }
        if !status.is_success() {
            return Err(PortError::Unexpected(format!(
                "{} token endpoint answered {}",
                self.kind, status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to parse {} token: {}", self.kind, e)))?;
        match (body.access_token, body.error) {
            (Some(token), None) => Ok(token),
            (_, error) => {
                warn!(provider = %self.kind, error = ?error, "Authorization code was rejected");
                Err(PortError::Unauthorized)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, access_token: &str) -> PortResult<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("{} request failed: {}", self.kind, e)))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "{} answered {} for {}",
                self.kind,
                response.status(),
                url
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to parse {} response: {}", self.kind, e)))
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn kind(&self) -> OAuthProviderKind {
        self.kind
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> PortResult<String> {
        let endpoints = endpoints(self.kind);
        Url::parse_with_params(
            endpoints.authorize,
            &[
                ("response_type", "code"),
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", endpoints.scope),
                ("state", state),
            ],
        )
        .map(String::from)
        .map_err(|e| PortError::Unexpected(format!("Invalid {} authorize URL: {}", self.kind, e)))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> PortResult<OAuthProfile> {
        let access_token = self.fetch_access_token(code, redirect_uri).await?;

        match self.kind {
            OAuthProviderKind::Google => {
                let info = self
                    .get_json("https://openidconnect.googleapis.com/v1/userinfo", &access_token)
                    .await?;
                openid_profile(self.kind, info)
            }
            OAuthProviderKind::Linkedin => {
                let info = self
                    .get_json("https://api.linkedin.com/v2/userinfo", &access_token)
                    .await?;
                openid_profile(self.kind, info)
            }
            OAuthProviderKind::Github => {
                let user = self.get_json("https://api.github.com/user", &access_token).await?;
                let emails = self
                    .get_json("https://api.github.com/user/emails", &access_token)
                    .await?;
                github_profile(user, emails)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(kind: OAuthProviderKind) -> HttpOAuthProvider {
        HttpOAuthProvider::new(
            kind,
            OAuthClientConfig {
                client_id: "client-123".to_string(),
                client_secret: "shh".to_string(),
            },
            Client::new(),
        )
    }

    #[test]
    fn authorize_url_carries_client_redirect_and_state() {
        let url = provider(OAuthProviderKind::Google)
            .authorize_url("https://dose.example/auth/oauth/google/callback", "xyz")
            .unwrap();
        let url = Url::parse(&url).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("redirect_uri"), Some("https://dose.example/auth/oauth/google/callback"));
        assert_eq!(get("state"), Some("xyz"));
        assert_eq!(get("response_type"), Some("code"));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn openid_user_info_becomes_a_profile() {
        let info: OpenIdUserInfo = serde_json::from_str(
            r#"{"sub":"1098","email":"ada@example.org","name":"Ada","email_verified":true}"#,
        )
        .unwrap();
        let profile = openid_profile(OAuthProviderKind::Linkedin, info).unwrap();
        assert_eq!(profile.provider, OAuthProviderKind::Linkedin);
        assert_eq!(profile.provider_user_id, "1098");
        assert_eq!(profile.email, "ada@example.org");
        assert_eq!(profile.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn missing_email_is_rejected() {
        let info: OpenIdUserInfo = serde_json::from_str(r#"{"sub":"1"}"#).unwrap();
        assert_eq!(
            openid_profile(OAuthProviderKind::Google, info),
            Err(PortError::Unauthorized)
        );
    }

    #[test]
    fn github_prefers_the_primary_verified_email_and_falls_back_to_login() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id":42,"login":"octo","name":null}"#).unwrap();
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[
                {"email":"old@example.org","primary":false,"verified":true},
                {"email":"main@example.org","primary":true,"verified":true}
            ]"#,
        )
        .unwrap();
        let profile = github_profile(user, emails).unwrap();
        assert_eq!(profile.provider_user_id, "42");
        assert_eq!(profile.email, "main@example.org");
        assert_eq!(profile.name.as_deref(), Some("octo"));
    }

    #[test]
    fn github_without_a_verified_email_is_rejected() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id":7,"login":"ghost","name":"Ghost"}"#).unwrap();
        let emails: Vec<GithubEmail> =
            serde_json::from_str(r#"[{"email":"x@example.org","primary":true,"verified":false}]"#)
                .unwrap();
        assert_eq!(github_profile(user, emails), Err(PortError::Unauthorized));
    }

    #[test]
    fn github_token_errors_parse() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"error":"bad_verification_code"}"#).unwrap();
        assert!(body.access_token.is_none());
        assert_eq!(body.error.as_deref(), Some("bad_verification_code"));
    }
}
