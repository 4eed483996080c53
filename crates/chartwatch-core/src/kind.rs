//! Resource kind identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(group, version, kind)` triple identifying a class of Kubernetes resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKind {
    /// Build from an `apiVersion` / `kind` pair
    ///
    /// - "apps/v1" -> group="apps", version="v1"
    /// - "v1" -> group="", version="v1" (core API)
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// The `apiVersion` string this kind is served under
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Composite key used for de-duplication: `apiVersion_kind`
    pub fn id(&self) -> String {
        format!("{}_{}", self.api_version(), self.kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_version() {
        let kind = ResourceKind::from_api_version("apps/v1", "Deployment");
        assert_eq!(kind.group, "apps");
        assert_eq!(kind.version, "v1");
        assert_eq!(kind.kind, "Deployment");

        let core = ResourceKind::from_api_version("v1", "ConfigMap");
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");
        assert_eq!(core.api_version(), "v1");
    }

    #[test]
    fn test_dotted_groups() {
        let kind = ResourceKind::from_api_version("networking.k8s.io/v1", "Ingress");
        assert_eq!(kind.group, "networking.k8s.io");
        assert_eq!(kind.api_version(), "networking.k8s.io/v1");
        assert_eq!(kind.id(), "networking.k8s.io/v1_Ingress");
        assert_eq!(kind.to_string(), "networking.k8s.io/v1/Ingress");
    }
}
