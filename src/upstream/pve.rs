//! reqwest backed [`Upstream`] implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::COOKIE;
use reqwest::Client;

use super::session::{self, SessionContext};
use super::{Envelope, Method, Params, Upstream};
use crate::config::Config;
use crate::error::{AuthError, UpstreamError};

const CSRF_HEADER: &str = "CSRFPreventionToken";

pub struct PveGateway {
    client: Client,
    base_url: String,
    session: Arc<SessionContext>,
}

impl PveGateway {
    pub fn new(client: Client, base_url: impl Into<String>, session: Arc<SessionContext>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            session,
        }
    }

    /// Builds the HTTP client. Certificate validation is skipped when
    /// `accept_invalid_certs` is set.
    pub fn build_client(
        accept_invalid_certs: bool,
        timeout: Option<Duration>,
    ) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder().danger_accept_invalid_certs(accept_invalid_certs);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Builds the client and logs in. Any failure here is fatal.
    pub async fn connect(config: &Config) -> Result<Self, AuthError> {
        let client = Self::build_client(config.accept_invalid_certs, config.request_timeout())?;
        let session = session::establish(
            &client,
            &config.proxmox_url,
            &config.username,
            &config.password,
        )
        .await?;
        Ok(Self::new(client, config.proxmox_url.clone(), Arc::new(session)))
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }
}

#[async_trait]
impl Upstream for PveGateway {
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<Envelope, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        info!("{} {}", method, url);

        let mut req = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !params.is_empty() {
            debug!("Request params: {:?}", redacted(params));
            req = if method.uses_query() {
                req.query(params)
            } else {
                req.form(params)
            };
        }

        let resp = req
            .header(COOKIE, self.session.cookie())
            .header(CSRF_HEADER, self.session.csrf_token())
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!("Response {}: {}", status, body);

        decode_response(status.as_u16(), &body)
    }
}

/// Copy of `params` safe to log: the container root password is masked.
fn redacted(params: &Params) -> Params {
    let mut shown = params.clone();
    if let Some(password) = shown.get_mut("password") {
        *password = "<redacted>".into();
    }
    shown
}

/// Turns a status code and raw body into an envelope or an error.
pub(crate) fn decode_response(status: u16, body: &str) -> Result<Envelope, UpstreamError> {
    let parsed = serde_json::from_str::<Envelope>(body);

    if status >= 400 {
        let envelope = parsed.ok();
        let message = failure_message(envelope.as_ref(), body);
        return Err(UpstreamError::Status {
            status,
            message,
            envelope,
        });
    }

    parsed.map_err(|e| UpstreamError::Decode {
        reason: e.to_string(),
        body: body.to_string(),
    })
}

/// Best available diagnostic: textual `data`, then `errors`, then the body.
fn failure_message(envelope: Option<&Envelope>, body: &str) -> String {
    if let Some(envelope) = envelope {
        if let Some(data) = envelope.data_str() {
            return data.to_string();
        }
        if let Some(errors) = envelope.errors() {
            return errors.to_string();
        }
    }
    body.to_string()
}
