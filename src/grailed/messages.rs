use crate::grailed::config::{conversations_url, listing_url};
use crate::grailed::SessionError;
use crate::http::describe_headers;
use crate::models::{Listing, SessionCredentials};
use reqwest::{
    Client, StatusCode,
    header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("message request failed: {0}")]
    Request(String),
    #[error("message rejected with {status}")]
    Rejected { status: StatusCode, headers: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Posts a single message. Implementations do not retry.
pub trait Messenger {
    async fn post_message(
        &self,
        credentials: &SessionCredentials,
        listing: &Listing,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct MessagesClient {
    http: Client,
    site_root: String,
    base_headers: HeaderMap,
}

#[derive(Debug, Serialize)]
struct ConversationRequest<'a> {
    body: &'a str,
    listing_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl MessagesClient {
    pub fn new(
        http: Client,
        site_root: impl Into<String>,
        api_headers: &BTreeMap<String, String>,
    ) -> Self {
        let mut base_headers = HeaderMap::new();
        for (name, value) in api_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    base_headers.insert(name, value);
                }
                _ => {
                    warn!(target = "lowball.delivery", header = %name, "skipping invalid api header");
                }
            }
        }
        Self {
            http,
            site_root: site_root.into(),
            base_headers,
        }
    }

    fn session_headers(
        &self,
        credentials: &SessionCredentials,
        listing: &Listing,
    ) -> Result<HeaderMap, DeliveryError> {
        let invalid = |what: &str| DeliveryError::Request(format!("invalid {what} header value"));
        let mut headers = self.base_headers.clone();
        headers.insert(
            "device-id",
            HeaderValue::from_str(&credentials.device_id).map_err(|_| invalid("device-id"))?,
        );
        headers.insert(
            "x-csrf-token",
            HeaderValue::from_str(credentials.csrf_token().unwrap_or_default())
                .map_err(|_| invalid("x-csrf-token"))?,
        );
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&credentials.cookie).map_err(|_| invalid("cookie"))?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&listing_url(&self.site_root, &listing.id))
                .map_err(|_| invalid("referer"))?,
        );
        Ok(headers)
    }
}

impl Messenger for MessagesClient {
    async fn post_message(
        &self,
        credentials: &SessionCredentials,
        listing: &Listing,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let headers = self.session_headers(credentials, listing)?;
        let payload = ConversationRequest {
            body,
            listing_id: &listing.id,
            kind: "question",
        };
        let response = self
            .http
            .post(conversations_url(&self.site_root))
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|err| DeliveryError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status,
                headers: describe_headers(response.headers()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing() -> Listing {
        Listing {
            id: "5501".into(),
            title: "Ramones".into(),
            price: 900.0,
            condition: Some("is_used".into()),
            description: None,
        }
    }

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            cookie: "_grailed_session=s1; csrf_token=tok".into(),
            csrf: Some("tok".into()),
            device_id: "device-7".into(),
            refreshed_at: None,
        }
    }

    #[tokio::test]
    async fn posts_conversation_with_session_headers() {
        let server = MockServer::start().await;
        let site = server.uri();
        Mock::given(method("POST"))
            .and(path("/api/conversations"))
            .and(header("x-api-version", "application/grailed.api.v1"))
            .and(header("device-id", "device-7"))
            .and(header("x-csrf-token", "tok"))
            .and(header("referer", format!("{site}/listings/5501").as_str()))
            .and(body_json(json!({
                "body": "offer 450?",
                "listing_id": "5501",
                "type": "question",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let mut api_headers = BTreeMap::new();
        api_headers.insert("x-api-version".to_string(), "application/grailed.api.v1".to_string());
        let client = MessagesClient::new(Client::new(), site, &api_headers);
        client
            .post_message(&credentials(), &listing(), "offer 450?")
            .await
            .expect("sent");
    }

    #[tokio::test]
    async fn rejection_carries_status_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).insert_header("x-request-id", "req-1"))
            .mount(&server)
            .await;

        let client = MessagesClient::new(Client::new(), server.uri(), &BTreeMap::new());
        let err = client
            .post_message(&credentials(), &listing(), "hi")
            .await
            .expect_err("rejected");
        match err {
            DeliveryError::Rejected { status, headers } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert!(headers.contains("x-request-id: req-1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_api_headers_are_skipped() {
        let mut api_headers = BTreeMap::new();
        api_headers.insert("bad header".to_string(), "x".to_string());
        api_headers.insert("accept".to_string(), "application/json".to_string());
        let client = MessagesClient::new(Client::new(), "https://www.grailed.com", &api_headers);
        assert_eq!(client.base_headers.len(), 1);
    }
}
