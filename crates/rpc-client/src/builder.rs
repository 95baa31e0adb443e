//! Provides a builder API for creating and sending node requests.
//!
//! This builder utilises a type state builder pattern with generics to only
//! allow valid operations at each stage of the build process. Each stage is
//! consumed to generate the next stage and the final stage executes the query.
//!
//!   1. [Init](stage::Init) which provides the entry point of the
//!      [builder](Request).
//!   2. [Method](stage::Method) where you select the API method.
//!   3. [Params](stage::Params) where you add query parameters and select the
//!      retry behavior.
//!   4. [Final](stage::Final) where you select how the reply is decoded, which
//!      is then executed.
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tmtop_common::reply::JsonRpcError;

use crate::metrics::{with_metrics, RequestMetadata};
use crate::RpcError;

/// A node request builder.
pub struct Request<'a, S: RequestState> {
    state: S,
    url: reqwest::Url,
    client: &'a reqwest::Client,
}

pub mod stage {
    use crate::metrics::RequestMetadata;

    /// Provides the [builder](super::Request::builder) entry-point.
    #[allow(dead_code)]
    pub struct Init;

    /// Select the API method to call, see [METHODS](super::Request::METHODS).
    pub struct Method;

    /// Specify the request parameters:
    /// - [height](super::Request::height)
    /// - [param](super::Request::param) (allows adding custom (name, value)
    ///   parameter)
    ///
    /// and then specify the [retry behavior](super::Request::retry).
    pub struct Params {
        pub meta: RequestMetadata,
    }

    /// Send the request and decode the reply:
    /// - [get_json_rpc](super::Request::get_json_rpc) for Tendermint RPC
    /// - [get_json](super::Request::get_json) for the Cosmos SDK REST API
    pub struct Final {
        pub meta: RequestMetadata,
        pub retry: bool,
    }

    impl super::RequestState for Init {}
    impl super::RequestState for Method {}
    impl super::RequestState for Params {}
    impl super::RequestState for Final {}
}

impl<'a> Request<'a, stage::Init> {
    /// Initialize a [Request] builder.
    pub fn builder(client: &'a reqwest::Client, url: reqwest::Url) -> Request<'a, stage::Method> {
        Request {
            url,
            client,
            state: stage::Method,
        }
    }
}

/// Generates one method per `name => path` pair, plus a const slice
/// `METHODS` of all names which is used to register metrics per method.
macro_rules! methods {
    ($($name:ident => $path:literal),+ $(,)?) => {
        pub const METHODS: &'static [&'static str] = &[$(stringify!($name)),+];

        $(
            pub fn $name(self) -> Request<'a, stage::Params> {
                self.method(stringify!($name), $path)
            }
        )+
    };
}

impl<'a> Request<'a, stage::Method> {
    methods!(
        consensus_state => "consensus_state",
        validators => "validators",
        status => "status",
        block => "block",
        staking_validators => "cosmos/staking/v1beta1/validators",
        current_upgrade_plan => "cosmos/upgrade/v1beta1/current_plan",
    );

    /// Appends the method's path to the request url.
    fn method(mut self, method: &'static str, path: &str) -> Request<'a, stage::Params> {
        self.url
            .path_segments_mut()
            .expect("Base URL is valid")
            .pop_if_empty()
            .extend(path.split('/'));

        Request {
            url: self.url,
            client: self.client,
            state: stage::Params {
                meta: RequestMetadata::new(method),
            },
        }
    }
}

impl<'a> Request<'a, stage::Params> {
    pub fn height(self, height: u64) -> Self {
        self.param("height", &height.to_string())
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request retry behavior.
    pub fn retry(self, retry: bool) -> Request<'a, stage::Final> {
        Request {
            url: self.url,
            client: self.client,
            state: stage::Final {
                meta: self.state.meta,
                retry,
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Encoding {
    JsonRpc,
    Plain,
}

impl Request<'_, stage::Final> {
    /// Sends a `GET` request and unwraps the `result` of the JSON-RPC reply
    /// into `T`.
    pub async fn get_json_rpc<T>(self) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        self.get(Encoding::JsonRpc).await
    }

    /// Sends a `GET` request and parses the reply body into `T`.
    pub async fn get_json<T>(self) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        self.get(Encoding::Plain).await
    }

    async fn get<T>(self, encoding: Encoding) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        async fn send_request<T: DeserializeOwned>(
            url: reqwest::Url,
            client: &reqwest::Client,
            meta: RequestMetadata,
            encoding: Encoding,
        ) -> Result<T, RpcError> {
            with_metrics(meta, async move {
                tracing::trace!(%url, "Fetching data from node");
                let response = client.get(url).send().await?;
                match encoding {
                    Encoding::JsonRpc => parse_json_rpc::<T>(response).await,
                    Encoding::Plain => parse::<T>(response).await,
                }
            })
            .await
        }

        match self.state.retry {
            false => send_request(self.url, self.client, self.state.meta, encoding).await,
            true => {
                retry0(
                    || send_request(self.url.clone(), self.client, self.state.meta, encoding),
                    retry_condition,
                )
                .await
            }
        }
    }
}

#[derive(Deserialize)]
struct JsonRpcReply<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

async fn parse<T>(response: reqwest::Response) -> Result<T, RpcError>
where
    T: DeserializeOwned,
{
    let response = response.error_for_status()?;
    let response = response.json::<T>().await?;
    Ok(response)
}

async fn parse_json_rpc<T>(response: reqwest::Response) -> Result<T, RpcError>
where
    T: DeserializeOwned,
{
    // Tendermint reports some errors with a 500 status, but the body still
    // holds a JSON-RPC error object
    if let Some(status_error) = response.error_for_status_ref().err() {
        let body = response.text().await.unwrap_or_default();
        if let Ok(JsonRpcReply {
            error: Some(error), ..
        }) = serde_json::from_str::<JsonRpcReply<IgnoredAny>>(&body)
        {
            return Err(error.into());
        }
        return Err(status_error.into());
    }

    match response.json::<JsonRpcReply<T>>().await? {
        JsonRpcReply {
            error: Some(error), ..
        } => Err(error.into()),
        JsonRpcReply {
            result: Some(result),
            ..
        } => Ok(result),
        JsonRpcReply { .. } => Err(RpcError::InvalidResponse(
            "reply has neither result nor error".to_owned(),
        )),
    }
}

pub trait RequestState {}

/// Wrapper function to allow retrying node queries in an exponential manner.
async fn retry0<T, Fut, FutureFactory, Ret>(
    future_factory: FutureFactory,
    retry_condition: Ret,
) -> Result<T, RpcError>
where
    Fut: futures::Future<Output = Result<T, RpcError>>,
    FutureFactory: FnMut() -> Fut,
    Ret: FnMut(&RpcError) -> bool,
{
    use std::num::NonZeroU64;

    use tmtop_retry::Retry;

    const DOUBLING: NonZeroU64 = match NonZeroU64::new(2) {
        Some(base) => base,
        None => unreachable!(),
    };

    Retry::exponential(future_factory, DOUBLING)
        .max_delay(std::time::Duration::from_secs(10))
        .max_num_retries(3)
        .when(retry_condition)
        .await
}

/// Determines if an error is retryable or not.
fn retry_condition(e: &RpcError) -> bool {
    use reqwest::StatusCode;
    use tracing::{debug, info, warn};

    match e {
        RpcError::Reqwest(e) => {
            if e.is_timeout() {
                info!(reason=?e, "Request timed out, retrying. Try increasing the request timeout by using the `--request-timeout` CLI option.");
                true
            } else if e.is_connect() || e.is_body() {
                info!(reason=?e, "Request failed, retrying");
                true
            } else if let Some(status) = e.status() {
                match status {
                    StatusCode::TOO_MANY_REQUESTS => {
                        debug!(reason=?e, "Request failed, retrying");
                        true
                    }
                    status if status.is_server_error() => {
                        warn!(reason=?e, "Request failed, retrying");
                        true
                    }
                    _ => false,
                }
            } else {
                false
            }
        }
        RpcError::JsonRpc { .. } | RpcError::InvalidResponse(_) => false,
    }
}
