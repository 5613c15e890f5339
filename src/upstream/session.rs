//! Ticket based login against the upstream API.

use std::fmt;

use log::info;
use reqwest::Client;
use serde::Deserialize;

use crate::error::AuthError;

pub const TICKET_PATH: &str = "/api2/json/access/ticket";

/// Authentication context attached to every outbound call.
///
/// Established once at startup and never mutated afterwards, so it is
/// shared between request handlers behind an `Arc` without locking.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    ticket: String,
    csrf_token: String,
}

impl SessionContext {
    pub fn new(ticket: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            csrf_token: csrf_token.into(),
        }
    }

    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Value for the `Cookie` header.
    pub fn cookie(&self) -> String {
        format!("PVEAuthCookie={}", self.ticket)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("ticket", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct TicketEnvelope {
    data: Option<TicketData>,
}

#[derive(Deserialize)]
struct TicketData {
    ticket: Option<String>,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: Option<String>,
}

/// Logs in with form-encoded credentials and returns the session context.
///
/// One shot: there is no retry, and the caller is expected to abort the
/// process on failure.
pub async fn establish(
    client: &Client,
    endpoint: &str,
    username: &str,
    password: &str,
) -> Result<SessionContext, AuthError> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), TICKET_PATH);
    info!("Logging in to {} as {}", url, username);

    let resp = client
        .post(&url)
        .form(&[("username", username), ("password", password)])
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    parse_ticket(&body)
}

fn parse_ticket(body: &str) -> Result<SessionContext, AuthError> {
    let envelope: TicketEnvelope =
        serde_json::from_str(body).map_err(|source| AuthError::Decode {
            source,
            body: body.to_string(),
        })?;
    let data = envelope.data.ok_or(AuthError::MissingField("data"))?;
    let ticket = data.ticket.ok_or(AuthError::MissingField("ticket"))?;
    let csrf_token = data
        .csrf_token
        .ok_or(AuthError::MissingField("CSRFPreventionToken"))?;

    info!("Upstream session established");
    Ok(SessionContext { ticket, csrf_token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticket_and_token() {
        let session = parse_ticket(
            r#"{"data":{"ticket":"PVE:root@pam:ABC","CSRFPreventionToken":"tok","username":"root@pam"}}"#,
        )
        .unwrap();
        assert_eq!(session.ticket(), "PVE:root@pam:ABC");
        assert_eq!(session.csrf_token(), "tok");
        assert_eq!(session.cookie(), "PVEAuthCookie=PVE:root@pam:ABC");
    }

    #[test]
    fn missing_fields_are_reported() {
        assert!(matches!(
            parse_ticket(r#"{"data":null}"#),
            Err(AuthError::MissingField("data"))
        ));
        assert!(matches!(
            parse_ticket(r#"{"data":{"CSRFPreventionToken":"tok"}}"#),
            Err(AuthError::MissingField("ticket"))
        ));
        assert!(matches!(
            parse_ticket(r#"{"data":{"ticket":"t"}}"#),
            Err(AuthError::MissingField("CSRFPreventionToken"))
        ));
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        match parse_ticket("<html>bad gateway</html>") {
            Err(AuthError::Decode { body, .. }) => assert!(body.contains("bad gateway")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn debug_output_hides_credentials() {
        let rendered = format!("{:?}", SessionContext::new("secret-ticket", "secret-token"));
        assert!(!rendered.contains("secret"));
    }
}
