use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::models::player::PlayerSnapshot;
use crate::models::tracker::{ClanDetails, ClanMember};
use crate::models::war::{LeagueGroup, WarLogEntry, WarLogPage, WarSnapshot};

pub const DEFAULT_BASE_URL: &str = "https://api.clashofclans.com/v1";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read-only view of the game API used by the change detectors.
///
/// Every call distinguishes "the entity does not exist"
/// ([`FetchError::NotFound`]) from failures worth retrying later.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn fetch_current_war(&self, clan_tag: &str) -> Result<WarSnapshot, FetchError>;

    /// Most recent wars first, as returned by the API.
    async fn fetch_war_log(&self, clan_tag: &str) -> Result<Vec<WarLogEntry>, FetchError>;

    /// Whether the clan currently belongs to an active league group.
    async fn fetch_league_group(&self, clan_tag: &str) -> Result<bool, FetchError>;

    async fn fetch_player(&self, player_tag: &str) -> Result<PlayerSnapshot, FetchError>;

    async fn fetch_clan_members(&self, clan_tag: &str) -> Result<Vec<ClanMember>, FetchError>;
}

/// Races an upstream call against pipeline shutdown.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = fut => result,
    }
}

#[derive(Debug, Clone)]
pub struct CocApiConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub league_group_ttl: Duration,
}

impl CocApiConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            league_group_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct CocApiService {
    client: Client,
    api_token: String,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
    league_cache: Arc<Cache<String, bool>>,
}

impl CocApiService {
    pub fn new(config: CocApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        let league_cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(config.league_group_ttl)
            .build();

        Ok(Self {
            client,
            api_token: config.api_token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries.max(1),
            retry_base_delay: config.retry_base_delay,
            league_cache: Arc::new(league_cache),
        })
    }

    fn encode_tag(tag: &str) -> String {
        urlencoding::encode(tag).into_owned()
    }

    /// GET with bearer auth, retrying rate limits and transient failures.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let err = match self
                .client
                .get(&url)
                .bearer_auth(&self.api_token)
                .header("accept", "application/json")
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(FetchError::from);
                    }

                    match status {
                        StatusCode::NOT_FOUND => return Err(FetchError::NotFound(path.to_string())),
                        StatusCode::FORBIDDEN => {
                            tracing::error!("Game API rejected token for {} (HTTP 403)", path);
                            return Err(FetchError::Forbidden);
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            let retry_after_secs = response
                                .headers()
                                .get(RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                            FetchError::RateLimited { retry_after_secs }
                        }
                        s if s.is_server_error() => {
                            FetchError::Transient(format!("HTTP {} from {}", s, path))
                        }
                        s => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(FetchError::Transient(format!(
                                "Game API error {} for {}: {}",
                                s, path, body
                            )));
                        }
                    }
                }
                Err(e) => FetchError::from(e),
            };

            if attempt >= self.max_retries || !err.is_transient() {
                return Err(err);
            }

            let delay = match &err {
                FetchError::RateLimited { retry_after_secs } => Duration::from_secs(*retry_after_secs),
                _ => self.retry_base_delay * 2u32.saturating_pow(attempt - 1),
            };

            tracing::warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                attempt,
                self.max_retries,
                path,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl UpstreamApi for CocApiService {
    async fn fetch_current_war(&self, clan_tag: &str) -> Result<WarSnapshot, FetchError> {
        tracing::debug!("Fetching current war for {}", clan_tag);
        self.get_json(&format!("/clans/{}/currentwar", Self::encode_tag(clan_tag)))
            .await
    }

    async fn fetch_war_log(&self, clan_tag: &str) -> Result<Vec<WarLogEntry>, FetchError> {
        let page: WarLogPage = self
            .get_json(&format!("/clans/{}/warlog", Self::encode_tag(clan_tag)))
            .await?;
        Ok(page.items)
    }

    async fn fetch_league_group(&self, clan_tag: &str) -> Result<bool, FetchError> {
        if let Some(active) = self.league_cache.get(clan_tag).await {
            tracing::debug!("League group cache hit for {}", clan_tag);
            return Ok(active);
        }

        let group: LeagueGroup = self
            .get_json(&format!(
                "/clans/{}/currentwar/leaguegroup",
                Self::encode_tag(clan_tag)
            ))
            .await?;

        let active = group.is_active();
        self.league_cache.insert(clan_tag.to_string(), active).await;
        Ok(active)
    }

    async fn fetch_player(&self, player_tag: &str) -> Result<PlayerSnapshot, FetchError> {
        self.get_json(&format!("/players/{}", Self::encode_tag(player_tag)))
            .await
    }

    async fn fetch_clan_members(&self, clan_tag: &str) -> Result<Vec<ClanMember>, FetchError> {
        let clan: ClanDetails = self
            .get_json(&format!("/clans/{}", Self::encode_tag(clan_tag)))
            .await?;
        Ok(clan.member_list)
    }
}
