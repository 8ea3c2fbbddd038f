use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use config::builder::DefaultState;
use config::ConfigBuilder;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_listen_port")]
    pub listen_port: String,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// 上游地址列表，顺序即轮询顺序
    #[serde(default)]
    pub upstreams: Vec<String>,
    /// 等待上游响应头的上限，响应体流式传输不计入
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// 独立的 /metrics 监听地址，不配置则不开启
    pub metrics_bind: Option<String>,
}

fn default_listen_port() -> String {
    "9002".to_string()
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

impl Settings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.listen_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(10))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(3))
    }
}

pub fn load_settings() -> Result<Settings, config::ConfigError> {
    // also load .env
    dotenvy::dotenv().ok();
    let c = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(environment(None));
    build_settings(c)
}

// UPSTREAMS 按逗号拆成列表；source 为 None 时读取进程环境变量
fn environment(source: Option<HashMap<String, String>>) -> config::Environment {
    config::Environment::default()
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("upstreams")
        .source(source)
}

fn build_settings(builder: ConfigBuilder<DefaultState>) -> Result<Settings, config::ConfigError> {
    builder.build()?.try_deserialize::<Settings>()
}
