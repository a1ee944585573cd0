use crate::config::ClientConfig;
use std::path::PathBuf;

#[derive(Clone, Debug, Default)]
pub struct GlobalArgs {
    pub api_base_url: Option<String>,
    pub store_dir: Option<PathBuf>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_base_url: Option<String>, store_dir: Option<PathBuf>) -> Self {
        Self {
            api_base_url,
            store_dir,
        }
    }

    /// Environment and build-time config with the command line on top.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::load();
        if let Some(url) = &self.api_base_url {
            config = config.with_api_base_url(url.clone());
        }
        if let Some(dir) = &self.store_dir {
            config = config.with_store_dir(dir.clone());
        }
        config
    }
}

/// `$XDG_CONFIG_HOME/tripkey`, falling back to `$HOME/.config/tripkey`.
#[must_use]
pub fn default_store_dir() -> Option<PathBuf> {
    let non_empty = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());

    non_empty("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map(|base| base.join(env!("CARGO_PKG_NAME")))
}
