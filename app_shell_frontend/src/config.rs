use std::str::FromStr;

use url::Url;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
    Test,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            "test" => Ok(Mode::Test),
            other => Err(Error::Mode(other.to_string())),
        }
    }
}

/// Deployment settings baked in when the front-end is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub public_url: String,
    pub mode: Mode,
}

impl DeploymentConfig {
    pub fn new(public_url: &str, mode: Mode) -> Self {
        DeploymentConfig {
            public_url: public_url.trim_end_matches('/').to_string(),
            mode,
        }
    }

    /// Reads `PUBLIC_URL` and `APP_SHELL_MODE` from the build environment.
    /// Without an explicit mode, release builds count as production.
    pub fn from_build_env() -> Self {
        let default_mode = if cfg!(debug_assertions) {
            Mode::Development
        } else {
            Mode::Production
        };
        let mode = match option_env!("APP_SHELL_MODE").map(Mode::from_str) {
            Some(Ok(mode)) => mode,
            Some(Err(err)) => {
                log::warn!("{err}, falling back to {default_mode:?}");
                default_mode
            }
            None => default_mode,
        };
        DeploymentConfig::new(option_env!("PUBLIC_URL").unwrap_or(""), mode)
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }

    /// The public base path resolved against the current page.
    pub fn resolve_public_url(&self, page: &Url) -> Result<Url, Error> {
        Ok(page.join(&self.public_url)?)
    }

    pub fn asset_url(&self, file: &str) -> String {
        format!("{}/{file}", self.public_url)
    }
}
