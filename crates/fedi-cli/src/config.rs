//! `fedi.toml`: the endpoint settings plus the operator identity.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use fedi_sdk::ClientConfig;
use fedi_types::{Account, AccountMetadata, Hash};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub client: ClientConfig,
    #[serde(default)]
    pub operator: Option<OperatorConfig>,
}

/// The account moderation commands act as.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorConfig {
    pub handle: String,
    /// Actor IRI on the endpoint
    pub iri: String,
    #[serde(default)]
    pub oauth_token: Option<String>,
    /// PKCS#8 PEM private key, relative to the config file
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl CliConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid configuration")
    }

    /// Load `path`; a missing file means defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(operator) = config.operator.as_mut() {
            if let (Some(key), Some(dir)) = (operator.key_file.as_mut(), path.parent()) {
                if key.is_relative() {
                    *key = dir.join(&*key);
                }
            }
        }
        Ok(config)
    }

    /// The operator as a logged-in account.
    pub fn operator(&self) -> anyhow::Result<Account> {
        let Some(operator) = &self.operator else {
            bail!("no [operator] section in the configuration");
        };
        operator.account()
    }
}

impl OperatorConfig {
    pub fn account(&self) -> anyhow::Result<Account> {
        if self.iri.is_empty() {
            bail!("operator {} has no actor IRI", self.handle);
        }
        let key = match &self.key_file {
            Some(path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("reading key {}", path.display()))?;
                Some(fedi_crypto::key_material_from_pem(&pem)?)
            }
            None => None,
        };
        let oauth_token = self.oauth_token.clone().filter(|t| !t.is_empty());
        if key.is_none() && oauth_token.is_none() {
            bail!("operator {} needs an oauth_token or a key_file", self.handle);
        }
        Ok(Account {
            hash: Hash::from_iri(&self.iri),
            handle: self.handle.clone(),
            metadata: AccountMetadata {
                id: Some(self.iri.clone()),
                oauth_token,
                key,
                ..AccountMetadata::default()
            },
            ..Account::default()
        })
    }
}
