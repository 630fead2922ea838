use crate::cluster::ClusterError;
use crate::cluster::launcher::{LocalClusterSession, PtyLauncher, SessionLauncher, isolated_command};
use crate::cluster::options::ClusterConnectionOptions;
use crate::cluster::probe::{CapabilityProbe, KubectlProbe, ProbeVerdict};
use crate::crypto::TokenCipher;
use crate::pty::{SpawnConfig, WindowSize};
use std::sync::Arc;
use tracing::{error, info};

/// Validates a cluster credential and, only when it checks out, starts an
/// isolated local session seeded with the connection environment.
pub struct ClusterSessionBootstrap {
    options: ClusterConnectionOptions,
    probe: Arc<dyn CapabilityProbe>,
    launcher: Arc<dyn SessionLauncher>,
    cipher: Arc<TokenCipher>,
    banner: String,
}

impl ClusterSessionBootstrap {
    pub fn new(options: ClusterConnectionOptions, cipher: Arc<TokenCipher>) -> Self {
        Self {
            options,
            probe: Arc::new(KubectlProbe::default()),
            launcher: Arc::new(PtyLauncher),
            cipher,
            banner: String::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn CapabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn SessionLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// True when the cluster gave a definitive answer for the token, allowed
    /// or denied. Any failure to get one counts as invalid.
    pub async fn validate_token(&self) -> bool {
        match self.probe.probe(&self.options).await {
            Ok(verdict) => {
                info!(
                    target = "gangway::cluster",
                    server = %self.options.cluster_server,
                    can_get_pods = verdict == ProbeVerdict::Allowed,
                    "cluster token check succeeded"
                );
                true
            }
            Err(err) => {
                error!(
                    target = "gangway::cluster",
                    server = %self.options.cluster_server,
                    error = %err,
                    "cluster token check failed"
                );
                false
            }
        }
    }

    pub async fn connect(&self, size: WindowSize) -> Result<LocalClusterSession, ClusterError> {
        if !self.validate_token().await {
            return Err(ClusterError::InvalidToken);
        }

        let script = self.options.init_script.to_string_lossy();
        let command = isolated_command(&script)
            .envs(self.options.session_env(&self.cipher, &self.banner));
        let session = self
            .launcher
            .launch(SpawnConfig::new(command, size))
            .map_err(|err| {
                error!(
                    target = "gangway::cluster",
                    script = %script,
                    error = %format!("{err:#}"),
                    "start local cluster session failed"
                );
                ClusterError::LaunchFailure(format!("{err:#}"))
            })?;

        info!(
            target = "gangway::cluster",
            server = %self.options.cluster_server,
            pid = ?session.pid(),
            cols = size.cols,
            rows = size.rows,
            "connected to cluster server"
        );
        Ok(session)
    }

    /// Liveness belongs to the child process; there is nothing to ping.
    pub fn keep_alive(&self) -> Result<(), ClusterError> {
        Ok(())
    }
}
