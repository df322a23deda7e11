//! Raw and resolved dependency records

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::repo::RepoUri;

/// A toolchain-specific dependency payload, tagged by its target type.
///
/// The resolver registered for [`TARGET_TYPE`](Self::TARGET_TYPE) owns the
/// decoding of payloads carrying that tag.
pub trait DependencyTarget: Serialize + DeserializeOwned {
    const TARGET_TYPE: &'static str;
}

/// An unresolved dependency as emitted by a lister.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawDependency {
    #[serde(default)]
    pub from_unit: String,
    #[serde(default)]
    pub from_unit_type: String,
    #[serde(default)]
    pub from_file: String,
    pub target_type: String,
    #[serde(default)]
    pub target: Value,
}

impl RawDependency {
    pub fn new<T: DependencyTarget>(target: &T) -> Result<Self> {
        Ok(RawDependency {
            from_unit: String::new(),
            from_unit_type: String::new(),
            from_file: String::new(),
            target_type: T::TARGET_TYPE.to_string(),
            target: serde_json::to_value(target)?,
        })
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.from_file = file.into();
        self
    }

    /// Fill in the originating unit unless the lister already did.
    pub fn with_origin(mut self, unit: &str, unit_type: &str) -> Self {
        if self.from_unit.is_empty() {
            self.from_unit = unit.to_string();
        }
        if self.from_unit_type.is_empty() {
            self.from_unit_type = unit_type.to_string();
        }
        self
    }

    /// Decode the payload as `T`, checking the tag first.
    pub fn decode_target<T: DependencyTarget>(&self) -> Result<T> {
        if self.target_type != T::TARGET_TYPE {
            return Err(CoreError::TargetTypeMismatch {
                expected: T::TARGET_TYPE,
                found: self.target_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.target.clone())?)
    }
}

/// Where a raw dependency points, as determined by a resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedTarget {
    /// Only field the target repository's identity can be derived from; the
    /// unit name alone is ambiguous across VCS schemes.
    #[serde(rename = "ToRepoCloneURL")]
    pub to_repo_clone_url: String,
    pub to_unit: String,
    pub to_unit_type: String,
    #[serde(default)]
    pub to_version_string: String,
    #[serde(default)]
    pub to_rev_spec: String,
}

/// Outcome of resolving one raw dependency.
///
/// Serialized as the target object, or `null` when unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ResolvedTarget>", into = "Option<ResolvedTarget>")]
pub enum Resolution {
    Resolved(ResolvedTarget),
    /// Recognized, but intentionally produces no edge.
    #[default]
    Unresolved,
}

impl Resolution {
    pub fn target(&self) -> Option<&ResolvedTarget> {
        match self {
            Resolution::Resolved(target) => Some(target),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

impl From<Option<ResolvedTarget>> for Resolution {
    fn from(target: Option<ResolvedTarget>) -> Self {
        target.map_or(Resolution::Unresolved, Resolution::Resolved)
    }
}

impl From<Resolution> for Option<ResolvedTarget> {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Resolved(target) => Some(target),
            Resolution::Unresolved => None,
        }
    }
}

/// A directed cross-repository dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedDep {
    pub from_repo: RepoUri,
    pub from_unit: String,
    pub from_unit_type: String,
    pub to_repo: RepoUri,
    pub to_unit: String,
    pub to_unit_type: String,
    pub to_version_string: String,
    pub to_rev_spec: String,
}

impl ResolvedDep {
    /// Combine the owning repository, the originating unit and a target.
    pub fn new(from_repo: &RepoUri, raw: &RawDependency, target: ResolvedTarget) -> Result<Self> {
        if target.to_repo_clone_url.trim().is_empty() {
            return Err(CoreError::MissingCloneUrl {
                from_unit: raw.from_unit.clone(),
                from_unit_type: raw.from_unit_type.clone(),
                target_type: raw.target_type.clone(),
            });
        }

        Ok(ResolvedDep {
            from_repo: from_repo.clone(),
            from_unit: raw.from_unit.clone(),
            from_unit_type: raw.from_unit_type.clone(),
            to_repo: RepoUri::from_clone_url(&target.to_repo_clone_url),
            to_unit: target.to_unit,
            to_unit_type: target.to_unit_type,
            to_version_string: target.to_version_string,
            to_rev_spec: target.to_rev_spec,
        })
    }
}
