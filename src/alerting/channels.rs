use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::types::ChannelError;

const CHANNEL_TIMEOUT_SECS: u64 = 10;
const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Outbound email capability. Best effort: callers log failures and move on.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_email(&self, to: &str, subject: &str, html_body: &str)
        -> Result<(), ChannelError>;
}

/// Outbound SMS capability. Optional in every deployment.
#[async_trait]
pub trait SmsChannel: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}

/// Stand-in used when credentials are absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledChannel;

#[async_trait]
impl EmailChannel for DisabledChannel {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }
}

#[async_trait]
impl SmsChannel for DisabledChannel {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send_sms(&self, _to: &str, _body: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }
}

fn build_client() -> Result<reqwest::Client, ChannelError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(CHANNEL_TIMEOUT_SECS))
        .build()
        .map_err(|e| ChannelError::InvalidConfig(e.to_string()))
}

fn transport_error(e: reqwest::Error) -> ChannelError {
    if e.is_timeout() {
        ChannelError::Transport(format!("timed out after {}s", CHANNEL_TIMEOUT_SECS))
    } else {
        ChannelError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Rejected {
        status: status.as_u16(),
        body,
    })
}

// ---------------------------------------------------------------------------
// Email over an HTTP relay
// ---------------------------------------------------------------------------

/// Email relay reached with a JSON POST and a bearer token.
pub struct HttpEmailChannel {
    endpoint: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailChannel {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> Result<Self, ChannelError> {
        if endpoint.trim().is_empty() {
            return Err(ChannelError::InvalidConfig("empty email endpoint".into()));
        }
        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl EmailChannel for HttpEmailChannel {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError> {
        let body = EmailRequest {
            from: &self.from,
            to,
            subject,
            html: html_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await
    }
}

// ---------------------------------------------------------------------------
// SMS via Twilio
// ---------------------------------------------------------------------------

pub struct TwilioSmsChannel {
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioSmsChannel {
    pub fn new(account_sid: &str, auth_token: &str, from_number: &str) -> Result<Self, ChannelError> {
        Self::with_base_url(account_sid, auth_token, from_number, TWILIO_API_BASE)
    }

    pub fn with_base_url(
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
        base_url: &str,
    ) -> Result<Self, ChannelError> {
        if account_sid.is_empty() || auth_token.is_empty() {
            return Err(ChannelError::InvalidConfig("missing Twilio credentials".into()));
        }
        Ok(Self {
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client()?,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl SmsChannel for TwilioSmsChannel {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let form = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await
    }
}
