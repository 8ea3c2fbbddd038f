use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, Response, Uri},
};
use reqwest::{Client, Url};

use crate::error::{ConfigurationError, ForwardError};
use crate::load_balancer::Upstream;

// 逐跳头，不向上下游透传
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP 反向代理上游
#[derive(Debug)]
pub struct HttpUpstream {
    address: Url,
    alive: AtomicBool,
    client: Client,
    /// 只约束到响应头返回为止，响应体的流式传输不受限
    header_timeout: Duration,
}

impl HttpUpstream {
    pub fn parse(
        address: &str,
        client: Client,
        header_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidUpstream {
            address: address.to_string(),
            reason,
        };

        let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self {
            address: url,
            alive: AtomicBool::new(true),
            client,
            header_timeout,
        })
    }

    /// 目标地址：上游的 scheme/host/port，路径拼接，query 合并
    fn target_url(&self, uri: &Uri) -> Url {
        let mut target = self.address.clone();
        target.set_path(&join_path(self.address.path(), uri.path()));

        let query = [self.address.query(), uri.query()]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect::<Vec<_>>()
            .join("&");
        target.set_query((!query.is_empty()).then_some(query.as_str()));
        target
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn address(&self) -> &str {
        self.address.as_str()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    async fn forward(&self, req: Request) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = req.into_parts();
        let target = self.target_url(&parts.uri);

        // 转发头；Host 交给客户端按上游地址重写
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer.ip());
        }

        // 请求体原样流式转发，不做缓冲和大小限制
        let send = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send();

        let resp = tokio::time::timeout(self.header_timeout, send)
            .await
            .map_err(|_| ForwardError::Timeout {
                address: self.address.to_string(),
                after: self.header_timeout,
            })?
            .map_err(|source| ForwardError::Unreachable {
                address: self.address.to_string(),
                source,
            })?;

        // 透传上游响应，body 以流的方式返回
        let status = resp.status();
        let mut headers = resp.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection 中列出的头同样是逐跳的
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert(name, v);
    }
}
