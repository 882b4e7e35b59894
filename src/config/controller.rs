use {crate::Result, serde::Deserialize};

///
/// Settings applied to every controller built from a [`crate::Config`].
///
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Memoize resolved middleware chains per route and scope.
    /// When disabled every request resolves its chain again, which is only
    /// useful while debugging registration order. Enabled by default.
    #[serde(default = "ControllerConfig::default_cache_chains")]
    pub cache_chains: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_chains: Self::default_cache_chains(),
        }
    }
}

impl ControllerConfig {
    fn default_cache_chains() -> bool {
        true
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
