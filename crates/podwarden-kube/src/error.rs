//! Error types for the kube crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while sweeping pods or generating manifests.
#[derive(Error, Debug)]
pub enum KubeError {
    /// Kubernetes API or connectivity error.
    #[error("Kubernetes API error: {0}")]
    Transport(#[from] kube::Error),

    /// Pod not found in the cluster.
    #[error("Pod not found: {namespace}/{name}")]
    PodNotFound {
        /// Name of the missing pod.
        name: String,
        /// Namespace that was searched.
        namespace: String,
    },

    /// The pod template or override could not be resolved.
    #[error("Template error: {0}")]
    Template(String),

    /// YAML serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// JSON conversion of a manifest failed.
    #[error("Manifest conversion error: {0}")]
    Conversion(#[from] serde_json::Error),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Invalid DAG definition.
    #[error("Invalid dag definition: {0}")]
    Definition(#[from] podwarden_core::CoreError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KubeError {
    /// Check if this error is retriable.
    ///
    /// Connectivity failures, throttling, and server-side errors are
    /// retriable; client errors such as 401, 403, or 404 are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(kube::Error::Api(response)) => {
                response.code == 429 || response.code >= 500
            }
            Self::Transport(
                kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::HttpError(_),
            ) => true,
            _ => false,
        }
    }

    /// Check if this error means the target no longer exists.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PodNotFound { .. })
    }
}

/// A specialized Result type for kube operations.
pub type Result<T> = std::result::Result<T, KubeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> KubeError {
        KubeError::Transport(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn server_errors_are_retriable() {
        assert!(api_error(500).is_retriable());
        assert!(api_error(503).is_retriable());
        assert!(api_error(429).is_retriable());
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!api_error(401).is_retriable());
        assert!(!api_error(403).is_retriable());
        assert!(!api_error(404).is_retriable());
        assert!(!KubeError::Template("bad".into()).is_retriable());
    }

    #[test]
    fn not_found_is_distinguishable() {
        let err = KubeError::PodNotFound {
            name: "p".into(),
            namespace: "ns".into(),
        };
        assert!(err.is_not_found());
        assert!(!api_error(404).is_not_found());
        assert_eq!(err.to_string(), "Pod not found: ns/p");
    }
}
