use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use std::net::SocketAddr;
use std::sync::Arc;

mod config;
mod error;
mod load_balancer;
mod metrics;
mod proxy;

use crate::config::Settings;
use crate::proxy::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志：若无 RUST_LOG 则默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();
    // 加载环境配置
    let settings = config::load_settings()?;
    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    // 配置错误必须在监听端口之前暴露
    let client = load_balancer::http_client(&settings)?;
    let pool = load_balancer::build_pool(&settings, client)?;
    let dispatcher = Arc::new(Dispatcher::new(settings.listen_port.clone(), pool));
    tracing::info!("Balancing across {} upstreams", dispatcher.pool().len());
    for upstream in dispatcher.pool().members() {
        tracing::info!("Registered upstream {}", upstream.address());
    }

    if let Some(bind) = &settings.metrics_bind {
        let listener = TcpListener::bind(bind).await?;
        tracing::info!("Metrics listening on http://{}/metrics", listener.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, metrics::router()).await {
                tracing::error!("Metrics server error: {}", err);
            }
        });
    }

    let app = proxy::router(dispatcher.clone());

    // 启动服务（带客户端地址信息，用于 X-Forwarded-For）
    let listener = TcpListener::bind(settings.listen_addr()).await?;
    tracing::info!(
        "The server is serving requests at http://{} (port {})",
        listener.local_addr()?,
        dispatcher.listen_port()
    );

    let make_svc = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_svc)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    #[tokio::test]
    async fn test_empty_upstreams_fail_before_listening() {
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let settings = Settings {
            listen_port: port.to_string(),
            bind_host: "127.0.0.1".to_string(),
            upstreams: vec![],
            request_timeout_secs: None,
            connect_timeout_secs: None,
            metrics_bind: None,
        };

        let err = run(settings).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::EmptyUpstreams)
        ));

        // 端口从未被占用
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_upstream_fails_startup() {
        let settings = Settings {
            listen_port: "0".to_string(),
            bind_host: "127.0.0.1".to_string(),
            upstreams: vec!["http://localhost:30000".to_string(), "::nope".to_string()],
            request_timeout_secs: None,
            connect_timeout_secs: None,
            metrics_bind: None,
        };

        let err = run(settings).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::InvalidUpstream { .. })
        ));
    }
}
