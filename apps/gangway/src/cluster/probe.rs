use crate::cluster::options::ClusterConnectionOptions;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeVerdict {
    Allowed,
    Denied,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run capability probe: {0}")]
    Spawn(#[from] io::Error),
    #[error("capability probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("inconclusive capability probe output: {0}")]
    Inconclusive(String),
}

/// Asks the cluster whether the supplied credential can do anything at all.
/// Either verdict proves the token authenticated.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn probe(&self, options: &ClusterConnectionOptions) -> Result<ProbeVerdict, ProbeError>;
}

/// Runs `kubectl auth can-i get pods` against the cluster.
#[derive(Clone, Debug)]
pub struct KubectlProbe {
    program: PathBuf,
    timeout: Duration,
}

impl Default for KubectlProbe {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(options: &ClusterConnectionOptions) -> Vec<String> {
        vec![
            format!(
                "--insecure-skip-tls-verify={}",
                options.skip_tls_verify_flag()
            ),
            format!("--token={}", options.token),
            format!("--server={}", options.cluster_server),
            "auth".into(),
            "can-i".into(),
            "get".into(),
            "pods".into(),
        ]
    }
}

#[async_trait]
impl CapabilityProbe for KubectlProbe {
    async fn probe(&self, options: &ClusterConnectionOptions) -> Result<ProbeVerdict, ProbeError> {
        let mut command = Command::new(&self.program);
        command
            .args(Self::args(options))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        // `can-i` exits non-zero for "no", so the exit status says nothing
        // about whether the token authenticated.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(verdict) = parse_can_i(&stdout) {
            return Ok(verdict);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}{}", stdout, stderr);
        Err(ProbeError::Inconclusive(combined.trim().to_string()))
    }
}

pub fn parse_can_i(output: &str) -> Option<ProbeVerdict> {
    match output.trim().to_ascii_lowercase().as_str() {
        "yes" => Some(ProbeVerdict::Allowed),
        "no" => Some(ProbeVerdict::Denied),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn parses_definitive_answers() {
        assert_eq!(parse_can_i("yes\n"), Some(ProbeVerdict::Allowed));
        assert_eq!(parse_can_i("  No "), Some(ProbeVerdict::Denied));
    }

    #[test]
    fn rejects_error_output() {
        assert_eq!(
            parse_can_i("error: You must be logged in to the server (Unauthorized)"),
            None
        );
        assert_eq!(parse_can_i(""), None);
    }

    #[test]
    fn args_pass_token_and_server_as_separate_arguments() {
        let options = ClusterConnectionOptions::new()
            .with_token("abc; rm -rf /")
            .with_cluster_server("https://10.0.0.7:6443")
            .with_skip_tls_verify(false);
        let args = KubectlProbe::args(&options);
        assert_eq!(args[0], "--insecure-skip-tls-verify=false");
        assert_eq!(args[1], "--token=abc; rm -rf /");
        assert_eq!(args[2], "--server=https://10.0.0.7:6443");
        assert_eq!(&args[3..], ["auth", "can-i", "get", "pods"]);
    }

    const ETXTBSY: i32 = 26;

    fn fake_kubectl(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("kubectl");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // A freshly written script can briefly report ETXTBSY while another test
    // thread is forking.
    async fn run(
        kubectl: &KubectlProbe,
        options: &ClusterConnectionOptions,
    ) -> Result<ProbeVerdict, ProbeError> {
        for _ in 0..5 {
            match kubectl.probe(options).await {
                Err(ProbeError::Spawn(err)) if err.raw_os_error() == Some(ETXTBSY) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                other => return other,
            }
        }
        kubectl.probe(options).await
    }

    fn cluster_options() -> ClusterConnectionOptions {
        ClusterConnectionOptions::new()
            .with_token("good-token")
            .with_cluster_server("https://10.0.0.7:6443")
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn yes_answer_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = fake_kubectl(
            &dir,
            r#"if [ "$1 $2 $3" = "--insecure-skip-tls-verify=true --token=good-token --server=https://10.0.0.7:6443" ] \
   && [ "$4 $5 $6 $7" = "auth can-i get pods" ]; then
  echo yes
  exit 0
fi
echo "unexpected arguments: $*" >&2
exit 2"#,
        );

        let verdict = run(&KubectlProbe::new(kubectl), &cluster_options()).await;

        assert_eq!(verdict.unwrap(), ProbeVerdict::Allowed);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn no_answer_with_failing_exit_status_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = fake_kubectl(&dir, "echo no\nexit 1");

        let verdict = run(&KubectlProbe::new(kubectl), &cluster_options()).await;

        assert_eq!(verdict.unwrap(), ProbeVerdict::Denied);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn unauthorized_token_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = fake_kubectl(
            &dir,
            "echo 'error: You must be logged in to the server (Unauthorized)' >&2\nexit 1",
        );

        let err = run(&KubectlProbe::new(kubectl), &cluster_options())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ProbeError::Inconclusive(ref output) if output.contains("(Unauthorized)")),
            "unexpected error: {err:?}"
        );
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn hung_kubectl_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = KubectlProbe::new(fake_kubectl(&dir, "exec sleep 5"))
            .with_timeout(Duration::from_millis(200));

        let err = run(&kubectl, &cluster_options()).await.unwrap_err();

        assert!(matches!(err, ProbeError::Timeout(limit) if limit == Duration::from_millis(200)));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn missing_binary_is_a_spawn_error() {
        let probe = KubectlProbe::new("/nonexistent/gangway-kubectl");
        let err = probe
            .probe(&ClusterConnectionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Spawn(_)));
    }
}
