// src/discord.rs
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::models::summary::{SummaryDocument, SummaryField};
use crate::presenter::{OFFLINE_MARKER, ONLINE_MARKER};
use crate::publisher::{BotUser, ChannelHandle, ChatPlatform, MessageHandle, MessageRef, PlatformError};
use crate::utils::redact_secret;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Upper bound for one API call, from connect until the body is read.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Discord rejects embeds with more fields than this.
pub const MAX_EMBED_FIELDS: usize = 25;

lazy_static! {
    static ref USER_AGENT: String = format!(
        "DiscordBot ({}, {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}

/// [`ChatPlatform`] backed by the Discord REST API.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
    timeout: Duration,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct MessageBody<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    fields: Cow<'a, [SummaryField]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedUrl<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedUrl<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
}

#[derive(Serialize)]
struct EmbedUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct Author {
    id: String,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    id: String,
    channel_id: String,
    author: Author,
}

#[derive(Deserialize)]
struct RateLimited {
    #[serde(default)]
    retry_after: f64,
}

fn snowflake(raw: &str) -> Result<u64, PlatformError> {
    raw.parse()
        .map_err(|_| PlatformError::Decode(format!("invalid snowflake {:?}", raw)))
}

impl Message {
    fn handle(&self) -> Result<MessageHandle, PlatformError> {
        Ok(MessageHandle {
            channel_id: snowflake(&self.channel_id)?,
            message_id: snowflake(&self.id)?,
        })
    }
}

/// Fits the document into one embed. Past the field cap the tail is replaced
/// by a single field saying how many servers were left out.
fn embed_fields(fields: &[SummaryField]) -> Cow<'_, [SummaryField]> {
    if fields.len() <= MAX_EMBED_FIELDS {
        return Cow::Borrowed(fields);
    }

    let (kept, dropped) = fields.split_at(MAX_EMBED_FIELDS - 1);
    let servers = dropped
        .iter()
        .filter(|f| f.name.starts_with(ONLINE_MARKER) || f.name.starts_with(OFFLINE_MARKER))
        .count();
    warn!(
        "Status document has {} fields, {} are replaced by an overflow note",
        fields.len(),
        dropped.len()
    );

    let mut truncated = kept.to_vec();
    truncated.push(SummaryField {
        name: "\u{2026}".to_string(),
        value: if servers > 0 {
            format!("and {} more servers", servers)
        } else {
            format!("and {} more fields", dropped.len())
        },
        inline: false,
    });
    Cow::Owned(truncated)
}

fn message_body(document: &SummaryDocument) -> MessageBody<'_> {
    let fields = embed_fields(&document.fields);

    MessageBody {
        embeds: [Embed {
            title: &document.title,
            description: &document.description,
            color: document.color,
            fields,
            thumbnail: document.thumbnail_url.as_deref().map(|url| EmbedUrl { url }),
            image: document.image_url.as_deref().map(|url| EmbedUrl { url }),
            footer: document.footer.as_deref().map(|text| EmbedFooter { text }),
        }],
    }
}

impl DiscordClient {
    pub fn new(http: Client, api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .timeout(self.timeout)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .header(reqwest::header::USER_AGENT, USER_AGENT.as_str())
    }

    async fn check(&self, response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound),
            StatusCode::FORBIDDEN => Err(PlatformError::Forbidden),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(0.0);
                Err(PlatformError::RateLimited { retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PlatformError::Api {
                    status: status.as_u16(),
                    body: redact_secret(&body, &self.token),
                })
            }
        }
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn current_user(&self) -> Result<BotUser, PlatformError> {
        let response = self.request(reqwest::Method::GET, "/users/@me").send().await?;
        let user: User = self.check(response).await?.json().await?;
        Ok(BotUser {
            id: snowflake(&user.id)?,
            name: user.username,
        })
    }

    async fn resolve_channel(&self, channel_id: u64) -> Result<Option<ChannelHandle>, PlatformError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/channels/{}", channel_id))
            .send()
            .await?;

        let channel: Channel = match self.check(response).await {
            Ok(response) => response.json().await?,
            Err(PlatformError::NotFound) | Err(PlatformError::Forbidden) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(ChannelHandle {
            id: snowflake(&channel.id)?,
            name: channel.name,
        }))
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        document: &SummaryDocument,
    ) -> Result<MessageHandle, PlatformError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/channels/{}/messages", channel.id))
            .json(&message_body(document))
            .send()
            .await?;
        let message: Message = self.check(response).await?.json().await?;
        debug!("Sent message {} to channel {}", message.id, channel.id);
        message.handle()
    }

    async fn edit_message(
        &self,
        message: &MessageHandle,
        document: &SummaryDocument,
    ) -> Result<MessageHandle, PlatformError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/channels/{}/messages/{}", message.channel_id, message.message_id),
            )
            .json(&message_body(document))
            .send()
            .await?;
        let edited: Message = self.check(response).await?.json().await?;
        edited.handle()
    }

    async fn recent_messages(
        &self,
        channel: &ChannelHandle,
        limit: u8,
    ) -> Result<Vec<MessageRef>, PlatformError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/channels/{}/messages", channel.id))
            .query(&[("limit", limit.min(100))])
            .send()
            .await?;
        let messages: Vec<Message> = self.check(response).await?.json().await?;

        messages
            .iter()
            .map(|m| {
                Ok(MessageRef {
                    handle: m.handle()?,
                    author_id: snowflake(&m.author.id)?,
                })
            })
            .collect()
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), PlatformError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/channels/{}/messages/{}", message.channel_id, message.message_id),
            )
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}
