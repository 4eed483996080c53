//! Chart profile types
//!
//! A profile is a chart published in a Helm repository that carries the
//! profile discovery annotation. Profiles are rebuilt from the repository
//! index on every refresh.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::key::ObjectKey;

/// An installable chart and the versions the repository offers for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartProfile {
    /// Chart name
    pub name: String,

    /// Description of the newest version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Home URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Icon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Source URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Supported Kubernetes version range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    /// Repository the profile was discovered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ObjectKey>,

    /// Available versions, newest first
    #[serde(default)]
    pub available_versions: Vec<String>,
}

impl ChartProfile {
    /// References to every available version of this chart
    pub fn references(&self) -> impl Iterator<Item = ChartReference> + '_ {
        self.available_versions
            .iter()
            .map(|v| ChartReference::new(&self.name, v))
    }

    /// The newest available version
    pub fn latest_version(&self) -> Option<&str> {
        self.available_versions.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single version of a chart
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChartReference {
    pub chart: String,
    pub version: String,
}

impl ChartReference {
    pub fn new(chart: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ChartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.chart, self.version)
    }
}

/// Sort version strings newest first
///
/// Valid semver versions come first in descending order; anything that does
/// not parse follows in lexical order.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| match (Version::parse(a).ok(), Version::parse(b).ok()) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}
