use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use toml::Value;

/// Config structs loaded from one named TOML section, falling back to defaults when the
/// section is absent.
pub trait Config: DeserializeOwned + Default {
    const SECTION: &'static str;

    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("invalid [{}] section", Self::SECTION)),
            None => {
                warn!("config section [{}] not found, using defaults", Self::SECTION);
                Ok(Self::default())
            }
        }
    }

    /// Parse a whole TOML document and load this struct's section from it.
    fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let table: toml::Table = toml::from_str(text).context("cannot parse config")?;
        Self::from_section(table.get(Self::SECTION))
    }
}
