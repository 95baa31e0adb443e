use tmtop_common::reply::JsonRpcError;

/// Failure to fetch or decode a node reply.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The node answered with a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<String>,
    },
    /// The reply carried neither a `result` nor an `error`.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<JsonRpcError> for RpcError {
    fn from(e: JsonRpcError) -> Self {
        Self::JsonRpc {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}
