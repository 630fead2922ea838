pub mod bootstrap;
pub mod launcher;
pub mod options;
pub mod probe;

use thiserror::Error;

pub use bootstrap::ClusterSessionBootstrap;
pub use launcher::{LocalClusterSession, PtyLauncher, SessionLauncher};
pub use options::ClusterConnectionOptions;
pub use probe::{CapabilityProbe, KubectlProbe, ProbeError, ProbeVerdict};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid token")]
    InvalidToken,
    #[error("start local cluster session failed: {0}")]
    LaunchFailure(String),
}
