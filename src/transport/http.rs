use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use super::error::TransportError;
use super::types::{Command, Link, Outcome, Target};
use super::CommandTransport;

pub struct HttpTransport {
    client: Client,
    link: StdMutex<Option<Link>>,
}

impl HttpTransport {
    /// `timeout` bounds every request, handshake included.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            link: StdMutex::new(None),
        })
    }
}

impl CommandTransport for HttpTransport {
    fn open(&self, link: Link) {
        *self.link.lock().unwrap() = Some(link.clone());

        let client = self.client.clone();
        tokio::spawn(async move {
            let outcome = match handshake(&client, &link).await {
                Ok(token) => Outcome::Opened { token },
                Err(error) => Outcome::OpenFailed(error),
            };
            link.reporter.report(outcome);
        });
    }

    fn close(&self) {
        self.link.lock().unwrap().take();
    }

    fn send(&self, command: Command, token: Option<&str>) -> bool {
        let Some(link) = self.link.lock().unwrap().clone() else {
            return false;
        };

        let request = build_request(&self.client, &link.target, &command, token);
        let endpoint = command.endpoint;
        tokio::spawn(async move {
            let outcome = match deliver(request).await {
                Ok(()) => Outcome::Delivered { endpoint },
                Err(error) => Outcome::Failed { endpoint, error },
            };
            link.reporter.report(outcome);
        });
        true
    }
}

fn build_request(
    client: &Client,
    target: &Target,
    command: &Command,
    token: Option<&str>,
) -> RequestBuilder {
    let mut request = client
        .post(target.url(&command.endpoint))
        .header(CONTENT_TYPE, "application/json")
        .json(&command.payload);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        request = request.header(AUTHORIZATION, token);
    }
    request
}

async fn handshake(client: &Client, link: &Link) -> Result<String, TransportError> {
    log::debug!(
        "Handshake with {} (generation {})",
        link.target.url(&link.handshake.endpoint),
        link.reporter.generation()
    );
    let response = build_request(client, &link.target, &link.handshake, None)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }

    let header_token = response
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.bytes().await?;
    extract_token(&body, header_token)
}

/// The token comes from the `token` field of the reply body, falling back to
/// the reply's `Authorization` header.
fn extract_token(body: &[u8], header_token: Option<String>) -> Result<String, TransportError> {
    let body_token = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("token").and_then(Value::as_str).map(String::from));

    body_token
        .into_iter()
        .chain(header_token)
        .find(|t| !t.is_empty())
        .ok_or_else(|| TransportError::MalformedResponse("no auth token in reply".into()))
}

async fn deliver(request: RequestBuilder) -> Result<(), TransportError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    serde_json::from_slice::<Value>(&body)
        .map(|_| ())
        .map_err(|e| TransportError::MalformedResponse(e.to_string()))
}
