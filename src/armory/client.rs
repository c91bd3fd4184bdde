// SPDX-License-Identifier: MPL-2.0

use crate::armory::types::BossKillRecord;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("armory returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Read side of the armory the poller depends on.
#[async_trait]
pub trait BossKillSource: Send + Sync {
    /// Most recent kills for a guild, newest first.
    async fn latest_boss_kills(
        &self,
        realm_id: u32,
        guild: &str,
    ) -> Result<Vec<BossKillRecord>, ClientError>;

    /// Full kill payload including players and loot.
    async fn boss_kill_detail(
        &self,
        realm_id: u32,
        record_id: &str,
    ) -> Result<BossKillRecord, ClientError>;
}

/// HTTP client for the armory JSON API.
pub struct ArmoryClient {
    http: reqwest::Client,
    base: Url,
}

impl ArmoryClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("bosswatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BossKillSource for ArmoryClient {
    async fn latest_boss_kills(
        &self,
        realm_id: u32,
        guild: &str,
    ) -> Result<Vec<BossKillRecord>, ClientError> {
        let realm = realm_id.to_string();
        let url = self.endpoint(&["guild", &realm, guild, "boss-kills"])?;
        self.get_json(url).await
    }

    async fn boss_kill_detail(
        &self,
        realm_id: u32,
        record_id: &str,
    ) -> Result<BossKillRecord, ClientError> {
        let realm = realm_id.to_string();
        let url = self.endpoint(&["boss-kill", &realm, record_id])?;
        self.get_json(url).await
    }
}

/// Build the public item page that carries the tooltip node.
///
/// `template` holds `{entry}` and `{realm}` placeholders.
pub fn item_page_url(template: &str, item_entry: u32, realm_id: u32) -> String {
    template
        .replace("{entry}", &item_entry.to_string())
        .replace("{realm}", &realm_id.to_string())
}
