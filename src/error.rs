use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// 启动期致命错误，不会进入请求处理流程
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no upstreams configured")]
    EmptyUpstreams,
    #[error("invalid upstream address {address:?}: {reason}")]
    InvalidUpstream { address: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no upstream available among {members} members")]
    Exhausted { members: usize },
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream {address} did not respond within {after:?}")]
    Timeout { address: String, after: Duration },
    #[error("upstream {address} unreachable")]
    Unreachable {
        address: String,
        #[source]
        source: reqwest::Error,
    },
}

/// 单个请求的失败，在 Dispatcher 边界转换为合成响应
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Selection(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Forward(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let msg = match &self {
            DispatchError::Selection(_) => "no upstream available".to_string(),
            DispatchError::Forward(
                ForwardError::Unreachable { address, .. } | ForwardError::Timeout { address, .. },
            ) => format!("upstream unreachable: {}", address),
        };
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            msg,
        )
            .into_response()
    }
}
