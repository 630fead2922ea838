use crate::crypto::TokenCipher;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::error;

pub const DEFAULT_CLUSTER_SERVER: &str = "https://127.0.0.1:8443";
pub const INIT_SCRIPT_NAME: &str = "init-kubectl.sh";

pub const ENV_USER: &str = "KUBECTL_USER";
pub const ENV_CLUSTER: &str = "KUBECTL_CLUSTER";
pub const ENV_SKIP_TLS_VERIFY: &str = "KUBECTL_INSECURE_SKIP_TLS_VERIFY";
pub const ENV_ENCRYPTED_TOKEN: &str = "K8S_ENCRYPTED_TOKEN";
pub const ENV_WELCOME_BANNER: &str = "WELCOME_BANNER";

/// Everything needed to reach one cluster as one principal.
#[derive(Clone)]
pub struct ClusterConnectionOptions {
    pub cluster_server: String,
    pub username: String,
    pub token: String,
    pub skip_tls_verify: bool,
    pub extra_env: BTreeMap<String, String>,
    pub init_script: PathBuf,
}

impl Default for ClusterConnectionOptions {
    fn default() -> Self {
        let init_script = env::current_dir()
            .map(|dir| dir.join(INIT_SCRIPT_NAME))
            .unwrap_or_else(|_| PathBuf::from(INIT_SCRIPT_NAME));
        Self {
            cluster_server: DEFAULT_CLUSTER_SERVER.to_string(),
            username: env::var("USER").unwrap_or_default(),
            token: String::new(),
            skip_tls_verify: true,
            extra_env: BTreeMap::new(),
            init_script,
        }
    }
}

impl fmt::Debug for ClusterConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnectionOptions")
            .field("cluster_server", &self.cluster_server)
            .field("username", &self.username)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("extra_env", &self.extra_env.keys().collect::<Vec<_>>())
            .field("init_script", &self.init_script)
            .finish()
    }
}

impl ClusterConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_cluster_server(mut self, server: impl Into<String>) -> Self {
        self.cluster_server = server.into();
        self
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn with_extra_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra_env = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    pub fn with_init_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_script = path.into();
        self
    }

    pub fn skip_tls_verify_flag(&self) -> &'static str {
        if self.skip_tls_verify { "true" } else { "false" }
    }

    /// Environment block for the cluster session initializer. The token is
    /// sealed with `cipher`; if that fails it is passed through in cleartext.
    pub fn session_env(&self, cipher: &TokenCipher, banner: &str) -> Vec<(String, String)> {
        let token = match cipher.encrypt(&self.token) {
            Ok(sealed) => sealed,
            Err(err) => {
                error!(
                    target = "gangway::cluster",
                    error = %err,
                    "encrypt cluster token failed; passing it unencrypted"
                );
                self.token.clone()
            }
        };

        let mut vars = vec![
            (ENV_USER.to_string(), self.username.clone()),
            (ENV_CLUSTER.to_string(), self.cluster_server.clone()),
            (
                ENV_SKIP_TLS_VERIFY.to_string(),
                self.skip_tls_verify_flag().to_string(),
            ),
            (ENV_ENCRYPTED_TOKEN.to_string(), token),
            (ENV_WELCOME_BANNER.to_string(), banner.to_string()),
        ];
        vars.extend(
            self.extra_env
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(String, String)], key: &str) -> Option<&'a str> {
        vars.iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn defaults_target_local_cluster_without_tls_verification() {
        let options = ClusterConnectionOptions::default();
        assert_eq!(options.cluster_server, DEFAULT_CLUSTER_SERVER);
        assert!(options.skip_tls_verify);
        assert!(options.token.is_empty());
        assert!(options.extra_env.is_empty());
        assert!(options.init_script.ends_with(INIT_SCRIPT_NAME));
    }

    #[test]
    fn session_env_seals_token_and_appends_extras() {
        let cipher = TokenCipher::new("process-secret");
        let options = ClusterConnectionOptions::new()
            .with_username("ops")
            .with_cluster_server("https://10.0.0.7:6443")
            .with_token("kube-token")
            .with_skip_tls_verify(false)
            .with_extra_env([("KUBECONFIG_NS", "payments")]);

        let vars = options.session_env(&cipher, "welcome aboard");

        assert_eq!(lookup(&vars, ENV_USER), Some("ops"));
        assert_eq!(lookup(&vars, ENV_CLUSTER), Some("https://10.0.0.7:6443"));
        assert_eq!(lookup(&vars, ENV_SKIP_TLS_VERIFY), Some("false"));
        assert_eq!(lookup(&vars, ENV_WELCOME_BANNER), Some("welcome aboard"));
        assert_eq!(lookup(&vars, "KUBECONFIG_NS"), Some("payments"));

        let sealed = lookup(&vars, ENV_ENCRYPTED_TOKEN).unwrap();
        assert_ne!(sealed, "kube-token");
        assert_eq!(cipher.decrypt(sealed).unwrap(), "kube-token");
    }

    #[test]
    fn session_env_falls_back_to_cleartext_without_key() {
        let options = ClusterConnectionOptions::new().with_token("kube-token");
        let vars = options.session_env(&TokenCipher::disabled(), "");
        assert_eq!(lookup(&vars, ENV_ENCRYPTED_TOKEN), Some("kube-token"));
        assert_eq!(lookup(&vars, ENV_SKIP_TLS_VERIFY), Some("true"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let options = ClusterConnectionOptions::new().with_token("super-secret");
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
