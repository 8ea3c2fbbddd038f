pub mod http_upstream;
pub mod round_robin;

use std::sync::Arc;

use axum::{async_trait, body::Body, extract::Request, http::Response};
use reqwest::{redirect, Client};

use crate::config::Settings;
use crate::error::{ConfigurationError, ForwardError};

pub use http_upstream::HttpUpstream;
pub use round_robin::UpstreamPool;

/// 一个可以转发请求的后端。目前只有 HTTP 反向代理一种实现。
#[async_trait]
pub trait Upstream: Send + Sync {
    fn address(&self) -> &str;

    fn is_alive(&self) -> bool;

    /// 健康检查写入入口，请求处理路径只读。目前只有测试调用。
    #[allow(dead_code)]
    fn set_alive(&self, alive: bool);

    async fn forward(&self, req: Request) -> Result<Response<Body>, ForwardError>;
}

/// 所有上游共用一个客户端，连接池由 reqwest 管理。
/// 不设整体 timeout，否则会截断仍在传输的响应体。
pub fn http_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .connect_timeout(settings.connect_timeout())
        .build()
}

/// 按配置顺序构建上游池；地址非法或列表为空时直接失败
pub fn build_pool(
    settings: &Settings,
    client: Client,
) -> Result<UpstreamPool<dyn Upstream>, ConfigurationError> {
    let mut members: Vec<Arc<dyn Upstream>> = Vec::with_capacity(settings.upstreams.len());
    for address in &settings.upstreams {
        let upstream = HttpUpstream::parse(address, client.clone(), settings.request_timeout())?;
        members.push(Arc::new(upstream));
    }
    UpstreamPool::new(members)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// 测试用上游：不访问网络，直接返回自己的地址
    pub struct StaticUpstream {
        address: String,
        alive: AtomicBool,
    }

    impl StaticUpstream {
        pub fn new(address: &str) -> Self {
            Self {
                address: address.to_string(),
                alive: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Upstream for StaticUpstream {
        fn address(&self) -> &str {
            &self.address
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Acquire)
        }

        fn set_alive(&self, alive: bool) {
            self.alive.store(alive, Ordering::Release);
        }

        async fn forward(&self, _req: Request) -> Result<Response<Body>, ForwardError> {
            Ok(Response::new(Body::from(self.address.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(upstreams: &[&str]) -> Settings {
        Settings {
            listen_port: "0".to_string(),
            bind_host: "127.0.0.1".to_string(),
            upstreams: upstreams.iter().map(|u| u.to_string()).collect(),
            request_timeout_secs: None,
            connect_timeout_secs: None,
            metrics_bind: None,
        }
    }

    #[test]
    fn test_build_pool_keeps_order() {
        let s = settings(&["http://localhost:30000", "https://example.com/api"]);
        let pool = build_pool(&s, http_client(&s).unwrap()).unwrap();

        let addrs: Vec<&str> = pool.members().iter().map(|u| u.address()).collect();
        assert_eq!(addrs, vec!["http://localhost:30000/", "https://example.com/api"]);
    }

    #[test]
    fn test_build_pool_empty() {
        let s = settings(&[]);
        let err = build_pool(&s, http_client(&s).unwrap()).err().unwrap();
        assert!(matches!(err, ConfigurationError::EmptyUpstreams));
    }

    #[test]
    fn test_build_pool_malformed() {
        let s = settings(&["http://localhost:30000", "not a url"]);
        let err = build_pool(&s, http_client(&s).unwrap()).err().unwrap();
        assert!(matches!(err, ConfigurationError::InvalidUpstream { .. }));
    }
}
