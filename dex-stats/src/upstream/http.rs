use super::{
    Upstream,
    message::{
        AccountDetails, ApiResponse, FallbackMarkPrice, MarkPrice, Page, PnlOverview, PnlResponse,
        Position, SpotAccount, Symbols,
    },
};
use crate::{config::UpstreamConfig, error::FetchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

const POSITIONS_PATH: &[&str] = &["api", "v1", "positions"];
const SYMBOLS_PATH: &[&str] = &["api", "v1", "symbols"];
const ACCOUNTS_PATH: &[&str] = &["api", "v1", "accounts"];
const MARK_PRICES_PATH: &[&str] = &["api", "v1", "mark-prices"];
const PNL_OVERVIEW_PATH: &[&str] = &["api", "pnl", "overview"];

/// Query parameter carrying the pagination cursor.
const CURSOR_PARAM: &str = "cursor";

/// [`Upstream`] backed by the DEX HTTP JSON APIs.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    /// Build a client honouring the configured request timeout.
    pub fn new(config: UpstreamConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| FetchError::Transport {
                url: config.perps_url.to_string(),
                reason: format!("failed to build HTTP client: {error}"),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// GET `url` and decode the JSON body, failing on any non-success HTTP status.
    async fn get_json<T>(&self, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let endpoint = url.to_string();
        debug!(url = %endpoint, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FetchError::Transport {
                url: endpoint.clone(),
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint,
                status: status.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::Transport {
                url: endpoint.clone(),
                reason: error.to_string(),
            })?;

        serde_json::from_slice(&body).map_err(|error| FetchError::Decode {
            url: endpoint,
            reason: error.to_string(),
        })
    }

    /// GET `url` and unwrap the standard `{code, data}` envelope.
    async fn get_data<T>(&self, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let endpoint = url.to_string();
        self.get_json::<ApiResponse<T>>(url)
            .await?
            .into_data(&endpoint)
    }
}

/// Append `segments` to the path of `base`, percent-encoding each one.
fn join_path(base: &Url, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::Transport {
            url: base.to_string(),
            reason: "base URL cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn positions_page(&self, cursor: Option<&str>) -> Result<Page<Vec<Position>>, FetchError> {
        let mut url = join_path(&self.config.perps_url, POSITIONS_PATH)?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair(CURSOR_PARAM, cursor);
        }

        let endpoint = url.to_string();
        self.get_json::<ApiResponse<Vec<Position>>>(url)
            .await?
            .into_page(&endpoint)
    }

    async fn symbols(&self) -> Result<Symbols, FetchError> {
        self.get_data(join_path(&self.config.perps_url, SYMBOLS_PATH)?)
            .await
    }

    async fn account_details(&self, user_id: &str) -> Result<AccountDetails, FetchError> {
        let mut url = join_path(&self.config.perps_url, ACCOUNTS_PATH)?;
        url = join_path(&url, &[user_id])?;
        self.get_data(url).await
    }

    async fn spot_balance(&self, user_id: &str) -> Result<SpotAccount, FetchError> {
        let mut url = join_path(&self.config.spot_url, ACCOUNTS_PATH)?;
        url = join_path(&url, &[user_id, "balances"])?;
        self.get_data(url).await
    }

    async fn mark_prices(&self) -> Result<Vec<MarkPrice>, FetchError> {
        self.get_data(join_path(&self.config.perps_url, MARK_PRICES_PATH)?)
            .await
    }

    async fn fallback_mark_prices(&self) -> Result<Vec<FallbackMarkPrice>, FetchError> {
        self.get_data(join_path(&self.config.fallback_url, MARK_PRICES_PATH)?)
            .await
    }

    async fn pnl_overview(&self, user_id: &str) -> Result<PnlOverview, FetchError> {
        let mut url = join_path(&self.config.pnl_url, PNL_OVERVIEW_PATH)?;
        url = join_path(&url, &[user_id])?;

        let endpoint = url.to_string();
        self.get_json::<PnlResponse>(url).await?.into_data(&endpoint)
    }
}
