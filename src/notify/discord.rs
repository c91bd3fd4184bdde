// SPDX-License-Identifier: MPL-2.0

use crate::notify::message::Notification;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Embed accent colour
const EMBED_COLOR: u32 = 0xC8_9B_3C;

const IMAGE_NAME: &str = "loot.png";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat api returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// How a send attempt ended when the request itself went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// We may no longer post in the channel
    PermissionDenied,
    /// The channel is gone
    NotFound,
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(
        &self,
        channel_id: &str,
        message: &Notification,
    ) -> Result<DeliveryOutcome, DeliveryError>;
}

/// Posts notifications through the Discord REST API as a bot user.
pub struct DiscordDelivery {
    http: reqwest::Client,
    api: Url,
    token: String,
}

impl DiscordDelivery {
    pub fn new(api_url: &str, token: &str) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            api: Url::parse(api_url)?,
            token: token.to_string(),
        })
    }

    fn channel_url(&self, channel_id: &str, tail: Option<&str>) -> Result<Url, DeliveryError> {
        let mut url = self.api.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty().push("channels").push(channel_id);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Map the statuses that mean "stop using this channel"
    async fn classify(response: reqwest::Response) -> Result<DeliveryOutcome, DeliveryError> {
        match response.status() {
            StatusCode::FORBIDDEN => Ok(DeliveryOutcome::PermissionDenied),
            StatusCode::NOT_FOUND => Ok(DeliveryOutcome::NotFound),
            status if status.is_success() => Ok(DeliveryOutcome::Delivered),
            status => Err(DeliveryError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl Delivery for DiscordDelivery {
    async fn send(
        &self,
        channel_id: &str,
        message: &Notification,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        // Probe first so a revoked channel is caught before we build the upload
        let probe = self
            .authorized(self.http.get(self.channel_url(channel_id, None)?))
            .send()
            .await?;
        let access = Self::classify(probe).await?;
        if access != DeliveryOutcome::Delivered {
            return Ok(access);
        }

        let payload = message_payload(message);
        let request = self.authorized(
            self.http
                .post(self.channel_url(channel_id, Some("messages"))?),
        );
        let request = match &message.image {
            Some(png) => {
                let part = Part::bytes(png.clone())
                    .file_name(IMAGE_NAME)
                    .mime_str("image/png")?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                request.multipart(form)
            }
            None => request.json(&payload),
        };

        Self::classify(request.send().await?).await
    }
}

/// Discord message body with a single embed
fn message_payload(message: &Notification) -> Value {
    let fields: Vec<Value> = message
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();

    let mut embed = json!({
        "title": message.title,
        "color": EMBED_COLOR,
        "fields": fields,
    });
    if let Some(timestamp) = message.timestamp {
        embed["timestamp"] = json!(timestamp.to_rfc3339());
    }
    if message.image.is_some() {
        embed["image"] = json!({ "url": format!("attachment://{IMAGE_NAME}") });
    }

    let mut payload = json!({ "embeds": [embed] });
    if message.image.is_some() {
        payload["attachments"] = json!([{ "id": 0, "filename": IMAGE_NAME }]);
    }
    payload
}
