use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::Request,
    http::Response,
    response::IntoResponse,
    Extension,
    Router,
};
use tracing::{error, info, warn};

use crate::error::DispatchError;
use crate::load_balancer::{Upstream, UpstreamPool};
use crate::metrics;

/// 请求分发入口：从池中选出上游并交给它转发
pub struct Dispatcher {
    listen_port: String,
    pool: UpstreamPool<dyn Upstream>,
}

impl Dispatcher {
    pub fn new(listen_port: String, pool: UpstreamPool<dyn Upstream>) -> Self {
        Self { listen_port, pool }
    }

    pub fn listen_port(&self) -> &str {
        &self.listen_port
    }

    pub fn pool(&self) -> &UpstreamPool<dyn Upstream> {
        &self.pool
    }

    pub async fn handle(&self, req: Request) -> Response<Body> {
        let upstream = match self.pool.select() {
            Ok(upstream) => upstream,
            Err(err) => {
                warn!("Rejecting {} {}: {}", req.method(), req.uri(), err);
                metrics::UNAVAILABLE.inc();
                return DispatchError::from(err).into_response();
            }
        };

        info!("forwarding request to address {:?}", upstream.address());

        let start = Instant::now();
        let response = match upstream.forward(req).await {
            Ok(resp) => resp,
            Err(err) => {
                error!(error = &err as &(dyn std::error::Error + 'static), "Proxy error");
                DispatchError::from(err).into_response()
            }
        };
        metrics::observe(upstream.address(), response.status(), start.elapsed());
        response
    }
}

// 代理服务路由：所有方法、所有路径都交给 Dispatcher
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(Extension(dispatcher))
}

// 代理处理器
async fn proxy_handler(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    req: Request,
) -> Response<Body> {
    dispatcher.handle(req).await
}
