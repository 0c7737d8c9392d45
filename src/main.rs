pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod lease_pool;
pub mod logging;
pub mod util;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load();
    if cfg.show_help {
        println!("{}", config::USAGE);
        return Ok(());
    }

    init_tracing(&cfg);
    for w in &cfg.warnings {
        tracing::warn!("{w}");
    }

    // 凭证加载失败直接退出：不允许带着部分凭证对外服务。
    let registry = credential::CredentialSet::load(&cfg.keys_file)
        .await
        .with_context(|| format!("加载凭证文件 {} 失败", cfg.keys_file.display()))?;
    if registry.is_empty() {
        tracing::warn!("凭证文件为空，所有借出请求都将返回 204");
    }
    tracing::info!("Keys loaded: {} 个凭证", registry.len());

    let pool = Arc::new(lease_pool::LeasePool::seed(
        cfg.services.iter().cloned(),
        Arc::new(registry),
    ));
    for service in pool.services() {
        tracing::info!(
            "service \"{service}\" 初始化完成，bullets: {}",
            pool.available(service).unwrap_or(0)
        );
    }

    let state = Arc::new(gateway::keys::KeysState {
        pool,
        log_level: cfg.log_level(),
    });
    let app = gateway::routes(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));

    tracing::info!("Start listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定监听端口失败")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;

    Ok(())
}

fn init_tracing(cfg: &config::Config) {
    // DEBUG=off 关闭全部输出；否则依赖库默认 warn，本项目至少 info，
    // 以免环境中预设的 RUST_LOG=warn 把借出/归还日志过滤掉。
    let filter = if cfg.log_level() == logging::LogLevel::Off {
        EnvFilter::new("off")
    } else {
        let env = std::env::var("RUST_LOG").unwrap_or_default();
        let env = env.trim();
        if env.is_empty() {
            EnvFilter::new("warn,keylease=info")
        } else if env.contains("keylease") {
            EnvFilter::new(env)
        } else {
            EnvFilter::new(format!("{env},keylease=info"))
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("收到退出信号，准备关闭服务...");
}
