use crate::config::{ConfigError, ConfigStore};
use crate::http::{BROWSER_USER_AGENT, set_cookie_values};
use crate::metrics;
use crate::models::SessionCredentials;
use chrono::Utc;
use reqwest::{Client, header::USER_AGENT};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session refresh failed: {0}")]
    Request(String),
    #[error("no csrf token available after refresh")]
    MissingCsrf,
}

/// Durable home for refreshed credentials.
pub trait CredentialSink {
    fn persist(&self, credentials: &SessionCredentials) -> Result<(), ConfigError>;
}

impl CredentialSink for ConfigStore {
    fn persist(&self, credentials: &SessionCredentials) -> Result<(), ConfigError> {
        self.save_credentials(credentials)
    }
}

/// Hands out credentials for an authenticated call.
///
/// `round` is the zero-based attempt number; anything above zero means the
/// previous attempt with the current credentials failed.
pub trait SessionProvider {
    async fn ensure_fresh(&mut self, round: u32) -> Result<SessionCredentials, SessionError>;
}

pub struct SessionManager<K> {
    http: Client,
    site_root: String,
    credentials: SessionCredentials,
    sink: K,
}

impl<K: CredentialSink> SessionManager<K> {
    pub fn new(
        http: Client,
        site_root: impl Into<String>,
        credentials: SessionCredentials,
        sink: K,
    ) -> Self {
        Self {
            http,
            site_root: site_root.into(),
            credentials,
            sink,
        }
    }

    #[cfg(test)]
    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    /// Visits the public homepage and takes the cookie set and CSRF token it hands out.
    pub async fn refresh(&mut self) -> Result<(), SessionError> {
        let response = self
            .http
            .get(&self.site_root)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|err| SessionError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let cookies = set_cookie_values(response.headers());
        if cookies.is_empty() {
            warn!(
                target = "lowball.session",
                "homepage returned no cookies, keeping current session"
            );
        } else {
            self.credentials.cookie = cookies.join("; ");
            if let Some(token) = extract_csrf(&cookies) {
                self.credentials.csrf = Some(token);
            }
            self.credentials.refreshed_at = Some(Utc::now());
            metrics::session_refreshed();
            info!(
                target = "lowball.session",
                cookies = cookies.len(),
                has_csrf = self.credentials.is_usable(),
                "session refreshed"
            );
        }

        if let Err(err) = self.sink.persist(&self.credentials) {
            warn!(target = "lowball.session", error = %err, "failed to persist session credentials");
        }
        Ok(())
    }
}

impl<K: CredentialSink> SessionProvider for SessionManager<K> {
    async fn ensure_fresh(&mut self, round: u32) -> Result<SessionCredentials, SessionError> {
        if round > 0 || !self.credentials.is_usable() {
            self.refresh().await?;
        }
        if !self.credentials.is_usable() {
            return Err(SessionError::MissingCsrf);
        }
        Ok(self.credentials.clone())
    }
}

/// Value of `csrf_token=` in the first cookie entry that carries one.
pub fn extract_csrf(cookies: &[String]) -> Option<String> {
    cookies
        .iter()
        .find_map(|cookie| cookie.split_once("csrf_token="))
        .and_then(|(_, rest)| rest.split(';').next())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct RecordingSink {
        saved: Arc<Mutex<Vec<SessionCredentials>>>,
    }

    impl CredentialSink for RecordingSink {
        fn persist(&self, credentials: &SessionCredentials) -> Result<(), ConfigError> {
            self.saved.lock().unwrap().push(credentials.clone());
            Ok(())
        }
    }

    fn stale_credentials() -> SessionCredentials {
        SessionCredentials {
            cookie: "stale=1".into(),
            csrf: None,
            device_id: "device-1".into(),
            refreshed_at: None,
        }
    }

    async fn homepage_with_cookies(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "_grailed_session=s1; Path=/; HttpOnly")
                    .append_header("set-cookie", "csrf_token=tok123; Path=/; Secure")
                    .set_body_string("<html></html>"),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn csrf_is_taken_from_the_first_matching_cookie() {
        let cookies = vec![
            "a=1; Path=/".to_string(),
            "csrf_token=first; Path=/".to_string(),
            "csrf_token=second".to_string(),
        ];
        assert_eq!(extract_csrf(&cookies).as_deref(), Some("first"));
        assert_eq!(extract_csrf(&["a=1".to_string()]), None);
        assert_eq!(extract_csrf(&["csrf_token=; Path=/".to_string()]), None);
    }

    #[tokio::test]
    async fn refresh_updates_and_persists_credentials() {
        let server = MockServer::start().await;
        homepage_with_cookies(&server).await;
        let sink = RecordingSink::default();
        let mut manager =
            SessionManager::new(Client::new(), server.uri(), stale_credentials(), sink.clone());

        manager.refresh().await.expect("refresh");

        let creds = manager.credentials();
        assert_eq!(creds.csrf_token(), Some("tok123"));
        assert_eq!(
            creds.cookie,
            "_grailed_session=s1; Path=/; HttpOnly; csrf_token=tok123; Path=/; Secure"
        );
        assert_eq!(creds.device_id, "device-1");
        assert!(creds.refreshed_at.is_some());

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].csrf_token(), Some("tok123"));
    }

    #[tokio::test]
    async fn ensure_fresh_reuses_usable_credentials_on_first_round() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let mut creds = stale_credentials();
        creds.csrf = Some("cached".into());
        let mut manager =
            SessionManager::new(Client::new(), server.uri(), creds, RecordingSink::default());

        let fresh = manager.ensure_fresh(0).await.expect("cached credentials");
        assert_eq!(fresh.csrf_token(), Some("cached"));
    }

    #[tokio::test]
    async fn ensure_fresh_refreshes_on_retry_rounds() {
        let server = MockServer::start().await;
        homepage_with_cookies(&server).await;
        let mut creds = stale_credentials();
        creds.csrf = Some("cached".into());
        let mut manager =
            SessionManager::new(Client::new(), server.uri(), creds, RecordingSink::default());

        let fresh = manager.ensure_fresh(1).await.expect("refreshed");
        assert_eq!(fresh.csrf_token(), Some("tok123"));
    }

    #[tokio::test]
    async fn ensure_fresh_fails_without_csrf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).append_header("set-cookie", "a=1"))
            .mount(&server)
            .await;
        let mut manager = SessionManager::new(
            Client::new(),
            server.uri(),
            stale_credentials(),
            RecordingSink::default(),
        );
        let err = manager.ensure_fresh(0).await.expect_err("no csrf");
        assert!(matches!(err, SessionError::MissingCsrf));
    }

    #[tokio::test]
    async fn refresh_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let sink = RecordingSink::default();
        let mut manager =
            SessionManager::new(Client::new(), server.uri(), stale_credentials(), sink.clone());
        let err = manager.refresh().await.expect_err("503");
        assert!(matches!(err, SessionError::Request(_)));
        assert!(sink.saved.lock().unwrap().is_empty());
        assert_eq!(manager.credentials(), &stale_credentials());
    }
}
