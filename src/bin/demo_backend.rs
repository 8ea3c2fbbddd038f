use axum::{extract::Request, Json, Router};
use serde_json::{json, Value};

// 本地试用负载均衡的演示后端：DEMO_NAME / DEMO_PORT 控制名字和端口
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let name = std::env::var("DEMO_NAME").unwrap_or_else(|_| "demo".to_string());
    let port: u16 = std::env::var("DEMO_PORT")
        .ok()
        .map(|p| p.parse::<u16>())
        .transpose()?
        .unwrap_or(30000);

    let service = name.clone();
    let app = Router::new().fallback(move |req: Request| {
        let name = service.clone();
        async move { describe(&name, req) }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Service {} listening on http://{}", name, listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

fn describe(name: &str, req: Request) -> Json<Value> {
    let header = |n: &str| {
        req.headers()
            .get(n)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "service": name,
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "query": req.uri().query(),
        "host": header("host"),
        "x_forwarded_for": header("x-forwarded-for"),
        "message": format!("Service {} - {}", name, req.uri().path()),
    }))
}
