//! Clients for the Tendermint RPC of a node and the Cosmos SDK REST API
//! ("LCD") of its chain.
use std::result::Result;
use std::time::Duration;

use reqwest::Url;
use tmtop_common::reply::{self, lcd};

mod builder;
mod error;
mod metrics;

pub use error::RpcError;

/// Page size used when fetching the validator set.
const VALIDATORS_PER_PAGE: u32 = 100;

#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait::async_trait]
pub trait ClientApi {
    async fn consensus_state(&self) -> Result<reply::ConsensusState, RpcError>;

    /// The complete validator set at `height`, in proposer priority order.
    async fn validators(&self, height: u64) -> Result<Vec<reply::TendermintValidator>, RpcError>;

    async fn status(&self) -> Result<reply::Status, RpcError>;

    /// The block at `height`, or the latest one.
    async fn block(&self, height: Option<u64>) -> Result<reply::Block, RpcError>;
}

#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait::async_trait]
pub trait LcdApi {
    /// All validators known to the staking module, bonded or not.
    async fn staking_validators(&self) -> Result<Vec<lcd::StakingValidator>, RpcError>;

    async fn current_upgrade_plan(&self) -> Result<Option<lcd::Plan>, RpcError>;
}

/// Tendermint RPC client.
///
/// Retries timeouts, connection failures, rate limiting and server errors up
/// to three times, waiting 1, 2 and 4 seconds. JSON-RPC errors are returned
/// immediately.
#[derive(Debug, Clone)]
pub struct Client {
    /// This client is internally refcounted
    inner: reqwest::Client,
    rpc_host: Url,
    retry: bool,
}

impl Client {
    pub fn new(rpc_host: Url, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            inner: http_client(&rpc_host, timeout)?,
            rpc_host,
            retry: true,
        })
    }

    #[cfg(test)]
    pub fn disable_retry_for_tests(self) -> Self {
        Self {
            retry: false,
            ..self
        }
    }

    fn request(&self) -> builder::Request<'_, builder::stage::Method> {
        builder::Request::builder(&self.inner, self.rpc_host.clone())
    }
}

#[async_trait::async_trait]
impl ClientApi for Client {
    #[tracing::instrument(skip(self))]
    async fn consensus_state(&self) -> Result<reply::ConsensusState, RpcError> {
        self.request()
            .consensus_state()
            .retry(self.retry)
            .get_json_rpc()
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn validators(&self, height: u64) -> Result<Vec<reply::TendermintValidator>, RpcError> {
        let mut validators = Vec::new();

        for page in 1u32.. {
            let reply: reply::ValidatorsPage = self
                .request()
                .validators()
                .height(height)
                .param("page", &page.to_string())
                .param("per_page", &VALIDATORS_PER_PAGE.to_string())
                .retry(self.retry)
                .get_json_rpc()
                .await?;

            let received = reply.validators.len();
            validators.extend(reply.validators);

            tracing::trace!(page, received, total=%reply.total, "Fetched validators page");

            if received == 0 || validators.len() as u64 >= reply.total {
                break;
            }
        }

        Ok(validators)
    }

    #[tracing::instrument(skip(self))]
    async fn status(&self) -> Result<reply::Status, RpcError> {
        self.request()
            .status()
            .retry(self.retry)
            .get_json_rpc()
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn block(&self, height: Option<u64>) -> Result<reply::Block, RpcError> {
        let request = self.request().block();
        let request = match height {
            Some(height) => request.height(height),
            None => request,
        };

        request.retry(self.retry).get_json_rpc().await
    }
}

/// Cosmos SDK REST client, with the same retry behaviour as [Client].
#[derive(Debug, Clone)]
pub struct LcdClient {
    inner: reqwest::Client,
    lcd_host: Url,
    retry: bool,
}

impl LcdClient {
    pub fn new(lcd_host: Url, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            inner: http_client(&lcd_host, timeout)?,
            lcd_host,
            retry: true,
        })
    }

    #[cfg(test)]
    pub fn disable_retry_for_tests(self) -> Self {
        Self {
            retry: false,
            ..self
        }
    }

    fn request(&self) -> builder::Request<'_, builder::stage::Method> {
        builder::Request::builder(&self.inner, self.lcd_host.clone())
    }
}

#[async_trait::async_trait]
impl LcdApi for LcdClient {
    #[tracing::instrument(skip(self))]
    async fn staking_validators(&self) -> Result<Vec<lcd::StakingValidator>, RpcError> {
        let mut validators = Vec::new();
        let mut next_key: Option<String> = None;

        loop {
            let request = self.request().staking_validators();
            let request = match &next_key {
                Some(key) => request.param("pagination.key", key),
                None => request,
            };

            let reply: lcd::StakingValidators = request.retry(self.retry).get_json().await?;
            validators.extend(reply.validators);

            next_key = reply
                .pagination
                .and_then(|p| p.next_key)
                .filter(|key| !key.is_empty());
            if next_key.is_none() {
                break;
            }
        }

        Ok(validators)
    }

    #[tracing::instrument(skip(self))]
    async fn current_upgrade_plan(&self) -> Result<Option<lcd::Plan>, RpcError> {
        let reply: lcd::CurrentPlan = self
            .request()
            .current_upgrade_plan()
            .retry(self.retry)
            .get_json()
            .await?;

        Ok(reply.plan)
    }
}

fn http_client(base: &Url, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    anyhow::ensure!(!base.cannot_be_a_base(), "Invalid base URL {base}");

    metrics::register();

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(tmtop_common::consts::USER_AGENT)
        .build()?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use pretty_assertions_sorted::assert_eq;
    use serde_json::{json, Value};

    use super::*;

    const CONSENSUS_STATE: &str = include_str!("../../common/fixtures/consensus_state.json");
    const STAKING_VALIDATORS: &str = include_str!("../../common/fixtures/staking_validators.json");

    fn envelope(result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": -1, "result": result })
    }

    fn client(server: &MockServer) -> Client {
        Client::new(server.base_url().parse().unwrap(), Duration::from_secs(5))
            .unwrap()
            .disable_retry_for_tests()
    }

    fn lcd_client(server: &MockServer) -> LcdClient {
        LcdClient::new(server.base_url().parse().unwrap(), Duration::from_secs(5))
            .unwrap()
            .disable_retry_for_tests()
    }

    fn validator(i: usize) -> Value {
        json!({
            "address": format!("{i:040X}"),
            "pub_key": { "type": "tendermint/PubKeyEd25519", "value": "" },
            "voting_power": (i + 1).to_string(),
            "proposer_priority": "0",
        })
    }

    fn validators_page(range: std::ops::Range<usize>, total: usize) -> Value {
        let validators = range.map(validator).collect::<Vec<_>>();
        envelope(json!({
            "block_height": "120045",
            "count": validators.len().to_string(),
            "total": total.to_string(),
            "validators": validators,
        }))
    }

    #[tokio::test]
    async fn consensus_state() {
        let server = MockServer::start_async().await;
        let body: Value = serde_json::from_str(CONSENSUS_STATE).unwrap();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/consensus_state");
            then.status(200).json_body(envelope(body));
        });

        let reply = client(&server).consensus_state().await.unwrap();

        mock.assert();
        assert_eq!(reply.round_state.height_round_step, "120045/2/3");
        assert_eq!(reply.round_state.height_vote_set[0].prevotes.len(), 4);
    }

    #[tokio::test]
    async fn validators_are_paginated() {
        let server = MockServer::start_async().await;
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/validators")
                .query_param("height", "120045")
                .query_param("page", "1")
                .query_param("per_page", "100");
            then.status(200).json_body(validators_page(0..100, 150));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/validators")
                .query_param("height", "120045")
                .query_param("page", "2")
                .query_param("per_page", "100");
            then.status(200).json_body(validators_page(100..150, 150));
        });

        let validators = client(&server).validators(120045).await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(validators.len(), 150);
        assert_eq!(validators[0].voting_power, "1");
        assert_eq!(validators[149].voting_power, "150");
        assert_eq!(validators[120].address.to_string(), format!("{:040X}", 120));
    }

    #[tokio::test]
    async fn empty_page_ends_pagination() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/validators");
            then.status(200).json_body(validators_page(0..0, 4));
        });

        let validators = client(&server).validators(1).await.unwrap();

        mock.assert_hits(1);
        assert!(validators.is_empty());
    }

    #[tokio::test]
    async fn json_rpc_error() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/block").query_param("height", "99999999");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": -1,
                "error": {
                    "code": -32603,
                    "message": "Internal error",
                    "data": "height 99999999 must be less than or equal to the current blockchain height 120045"
                }
            }));
        });

        // Not retried even with retries enabled.
        let client = Client::new(server.base_url().parse().unwrap(), Duration::from_secs(5)).unwrap();
        let error = client.block(Some(99999999)).await.unwrap_err();

        mock.assert_hits(1);
        assert_matches!(error, RpcError::JsonRpc { code: -32603, message, .. } => assert_eq!(message, "Internal error"));
    }

    #[tokio::test]
    async fn reply_without_result() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/status");
            then.status(200).json_body(json!({ "jsonrpc": "2.0", "id": -1 }));
        });

        let error = client(&server).status().await.unwrap_err();

        assert_matches!(error, RpcError::InvalidResponse(_));
    }

    #[tokio::test]
    async fn status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/status");
            then.status(200).json_body(envelope(json!({
                "node_info": {
                    "network": "cosmoshub-4",
                    "version": "0.37.2",
                    "moniker": "quokka-sentry",
                },
                "sync_info": {
                    "latest_block_height": "120045",
                    "latest_block_time": "2023-07-03T12:00:00.5Z",
                    "catching_up": false,
                },
            })));
        });

        let status = client(&server).status().await.unwrap();

        assert_eq!(status.node_info.network, "cosmoshub-4");
        assert_eq!(status.sync_info.latest_block_height, 120045);
    }

    #[tokio::test]
    async fn latest_block_has_no_height_param() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/block").query_param_exists("height");
            then.status(500);
        });
        let latest = server.mock(|when, then| {
            when.method(GET).path("/block");
            then.status(200).json_body(envelope(json!({
                "block": {
                    "header": { "height": "120045", "time": "2023-07-03T12:00:00Z" }
                }
            })));
        });

        let block = client(&server).block(None).await.unwrap();

        mock.assert_hits(0);
        latest.assert();
        assert_eq!(block.block.header.height, 120045);
    }

    #[tokio::test]
    async fn user_agent() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/status")
                .header("user-agent", tmtop_common::consts::USER_AGENT);
            then.status(200).json_body(json!({ "jsonrpc": "2.0", "id": -1 }));
        });

        let _ = client(&server).status().await;

        mock.assert();
        assert!(tmtop_common::consts::USER_AGENT.starts_with("tmtop/"));
    }

    #[tokio::test]
    async fn staking_validators_are_paginated() {
        let server = MockServer::start_async().await;
        let mut first_page: Value = serde_json::from_str(STAKING_VALIDATORS).unwrap();
        first_page["pagination"]["next_key"] = json!("FPoXbDBs+Z3a/Aa==");

        // Mocks are matched in creation order.
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/cosmos/staking/v1beta1/validators")
                .query_param("pagination.key", "FPoXbDBs+Z3a/Aa==");
            then.status(200).json_body(json!({
                "validators": [],
                "pagination": { "next_key": null, "total": "0" },
            }));
        });
        let first = server.mock(|when, then| {
            when.method(GET).path("/cosmos/staking/v1beta1/validators");
            then.status(200).json_body(first_page);
        });

        let validators = lcd_client(&server).staking_validators().await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(validators.len(), 3);
        assert_eq!(validators[1].description.moniker, "Wombat");
    }

    #[tokio::test]
    async fn no_upgrade_planned() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/cosmos/upgrade/v1beta1/current_plan");
            then.status(200).json_body(json!({ "plan": null }));
        });

        let plan = lcd_client(&server).current_upgrade_plan().await.unwrap();

        assert_eq!(plan, None);
    }

    #[tokio::test]
    async fn lcd_http_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/cosmos/upgrade/v1beta1/current_plan");
            then.status(501).json_body(json!({ "code": 12, "message": "Not Implemented" }));
        });

        let error = lcd_client(&server).current_upgrade_plan().await.unwrap_err();

        assert_matches!(error, RpcError::Reqwest(e) => assert_eq!(e.status(), Some(reqwest::StatusCode::NOT_IMPLEMENTED)));
    }

    #[test]
    fn base_url_must_support_paths() {
        let url: Url = "mailto:ops@example.com".parse().unwrap();
        assert!(Client::new(url, Duration::from_secs(1)).is_err());
    }
}
