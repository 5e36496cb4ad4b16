use config::{Config, ConfigError, File};

use serde::{Deserialize, Serialize};

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HTTPConfig {
    pub host: String,
    pub port: u16,
}

impl HTTPConfig {
    pub fn connection_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub dist_dir: String,
    /// Path prefix the app is deployed under, without a trailing slash.
    #[serde(default)]
    pub public_url: String,
}

impl StaticConfig {
    /// Scope a worker served from `public_url` may claim.
    pub fn worker_scope(&self) -> String {
        format!("{}/", self.public_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub http_config: HTTPConfig,
    pub static_config: StaticConfig,
}

impl AppConfig {
    pub fn load(path_str: &str) -> Result<Self, ConfigError> {
        let mut conf = Config::default();
        let conf_file = File::new(path_str, config::FileFormat::Toml);
        conf.merge(conf_file)?;
        let mut app_config = AppConfig {
            http_config: conf.get::<HTTPConfig>("http")?,
            static_config: conf.get::<StaticConfig>("static_files")?,
        };
        app_config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(app_config)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("APP_SHELL_SERVER_HOST") {
            info!("getting server host from env: {host}");
            self.http_config.host = host;
        } else {
            info!("getting server host from file");
        }
        if let Some(port) = lookup("APP_SHELL_SERVER_PORT") {
            info!("getting server port from env: {port}");
            self.http_config.port = port.parse::<u16>().map_err(|_| {
                ConfigError::Message(format!("Failed to parse server port {port}"))
            })?;
        }
        if let Some(dist_dir) = lookup("APP_SHELL_DIST_DIR") {
            info!("serving {dist_dir} from env");
            self.static_config.dist_dir = dist_dir;
        }
        self.static_config.public_url = self
            .static_config
            .public_url
            .trim_end_matches('/')
            .to_string();
        Ok(())
    }
}
