use thiserror::Error as ThisError;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod app_config;
mod static_files;

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
#[derive(Debug, ThisError)]
enum Error {
    #[error("app shell server failed to bind with io error: {0}")]
    IO(#[from] std::io::Error),
    #[error("app shell server failed to load config from {DEFAULT_CONFIG_PATH}, Config Error {0}")]
    Confg(#[from] config::ConfigError),
}
type Result<T> = std::result::Result<T, Error>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("app_shell_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let conf = app_config::AppConfig::load(DEFAULT_CONFIG_PATH)?;
    let host_port = conf.http_config.connection_string();
    let listener = tokio::net::TcpListener::bind(&host_port).await?;

    info!(
        "Successfully bound server to {host_port}, serving {}",
        conf.static_config.dist_dir
    );

    axum::serve(listener, static_files::router(&conf.static_config)).await?;
    Ok(())
}
