//! Repository identity and per-repository configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::unit::SourceUnit;

/// Repository configuration file, looked up at the repository root.
pub const CONFIG_FILE: &str = "srcgraph.toml";

/// Canonical repository identity, e.g. `github.com/joyent/node`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RepoUri(String);

impl RepoUri {
    pub fn new(uri: impl Into<String>) -> Self {
        RepoUri(uri.into())
    }

    /// Derive the canonical URI from a clone URL.
    ///
    /// Scheme, userinfo, query, fragment, trailing slashes and a `.git`
    /// suffix are dropped and the host is lowercased, so every spelling of
    /// one repository's URL yields the same URI. scp-style
    /// `git@host:owner/repo` URLs are understood.
    pub fn from_clone_url(clone_url: &str) -> Self {
        let url = clone_url.trim();
        let url = url.split(['?', '#']).next().unwrap_or_default();

        let rest = match url.find("://") {
            Some(idx) => url[idx + 3..].to_string(),
            None => match url.split_once(':') {
                Some((host, path)) if !host.contains('/') => format!("{host}/{path}"),
                _ => url.to_string(),
            },
        };

        let (authority, path) = rest.split_once('/').unwrap_or((rest.as_str(), ""));
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host)
            .to_ascii_lowercase();

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');

        if path.is_empty() {
            RepoUri(host)
        } else {
            RepoUri(format!("{host}/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RepoUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape of `srcgraph.toml`.
#[derive(Debug, Default, Deserialize)]
struct RepoConfigFile {
    uri: Option<String>,
    clone_url: Option<String>,
    #[serde(default)]
    toolchains: BTreeMap<String, toml::Value>,
}

/// A repository under analysis. Immutable for the duration of one run.
#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    pub uri: RepoUri,
    pub clone_url: Option<String>,
    /// Units discovered by the scanners, in discovery order.
    pub source_units: Vec<Arc<dyn SourceUnit>>,
    /// Free-form per-toolchain settings (`[toolchains.<name>]`).
    pub toolchains: BTreeMap<String, Value>,
}

impl RepoConfig {
    pub fn new(uri: RepoUri) -> Self {
        RepoConfig {
            uri,
            ..Default::default()
        }
    }

    /// Load configuration for the repository rooted at `root`.
    ///
    /// Without a config file, or without `uri` in it, the URI comes from the
    /// clone URL, then from the directory name.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let file = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text).map_err(|source| CoreError::Config {
                path: path.clone(),
                source,
            })?
        } else {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            RepoConfigFile::default()
        };

        let uri = match (&file.uri, &file.clone_url) {
            (Some(uri), _) => RepoUri::new(uri.clone()),
            (None, Some(clone_url)) => RepoUri::from_clone_url(clone_url),
            (None, None) => {
                let dir = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
                RepoUri::new(
                    dir.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                )
            }
        };

        let toolchains = file
            .toolchains
            .into_iter()
            .map(|(name, value)| -> Result<(String, Value)> {
                Ok((name, serde_json::to_value(value)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(RepoConfig {
            uri,
            clone_url: file.clone_url,
            source_units: Vec::new(),
            toolchains,
        })
    }

    pub fn with_units(mut self, units: Vec<Arc<dyn SourceUnit>>) -> Self {
        self.source_units = units;
        self
    }

    /// Typed settings for one toolchain, if configured.
    pub fn toolchain_config<T: DeserializeOwned>(&self, toolchain: &str) -> Result<Option<T>> {
        self.toolchains
            .get(toolchain)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(CoreError::from)
    }
}
