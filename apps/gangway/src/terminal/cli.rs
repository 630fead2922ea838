use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::cluster::options::DEFAULT_CLUSTER_SERVER;
use crate::confirm::TargetKind;
use crate::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "gangway",
    about = "Gate connections behind reviewer approval and open isolated kubectl sessions",
    author,
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "GANGWAY_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "GANGWAY_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check whether a connection needs approval and wait for the decision
    Confirm(ConfirmArgs),
    /// Validate a cluster token and open an isolated kubectl session
    Kube(KubeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfirmArgs {
    #[arg(long = "user-id", value_name = "ID", help = "Requesting user id")]
    pub user_id: String,

    #[arg(long = "system-user-id", value_name = "ID")]
    pub system_user_id: String,

    #[arg(long = "system-username", value_name = "NAME")]
    pub system_username: String,

    #[arg(long = "target-kind", value_enum, default_value_t = TargetKind::Asset)]
    pub target_kind: TargetKind,

    #[arg(long = "target-id", value_name = "ID")]
    pub target_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct KubeArgs {
    #[arg(
        long,
        env = "KUBECTL_CLUSTER",
        default_value = DEFAULT_CLUSTER_SERVER,
        help = "Cluster API server URL"
    )]
    pub server: String,

    #[arg(
        long,
        env = "GANGWAY_KUBE_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the cluster"
    )]
    pub token: String,

    #[arg(long, help = "Principal name exported to the session (defaults to $USER)")]
    pub username: Option<String>,

    #[arg(long = "verify-tls", help = "Verify the cluster's TLS certificate")]
    pub verify_tls: bool,

    #[arg(
        long = "env",
        value_name = "KEY=VALUE",
        value_parser = parse_env_pair,
        help = "Extra environment variable for the session (repeatable)"
    )]
    pub env: Vec<(String, String)>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_confirm_arguments() {
        let cli = Cli::try_parse_from([
            "gangway",
            "confirm",
            "--user-id",
            "u-1",
            "--system-user-id",
            "su-1",
            "--system-username",
            "root",
            "--target-kind",
            "application",
            "--target-id",
            "app-9",
        ])
        .unwrap();

        let Command::Confirm(args) = cli.command else {
            panic!("expected confirm subcommand");
        };
        assert_eq!(args.target_kind, TargetKind::Application);
        assert_eq!(args.target_id, "app-9");
        assert_eq!(cli.logging.level, LogLevel::Warn);
    }

    #[test]
    fn parses_repeated_env_pairs() {
        let cli = Cli::try_parse_from([
            "gangway",
            "--log-level",
            "debug",
            "kube",
            "--server",
            "https://10.0.0.7:6443",
            "--token",
            "t0k3n",
            "--env",
            "TEAM=payments",
            "--env",
            "QUERY=a=b",
        ])
        .unwrap();

        let Command::Kube(args) = cli.command else {
            panic!("expected kube subcommand");
        };
        assert!(!args.verify_tls);
        assert_eq!(
            args.env,
            vec![
                ("TEAM".to_string(), "payments".to_string()),
                ("QUERY".to_string(), "a=b".to_string()),
            ]
        );
        assert_eq!(cli.logging.level, LogLevel::Debug);
    }

    #[test]
    fn rejects_env_without_separator() {
        assert!(parse_env_pair("TEAM").is_err());
        assert!(parse_env_pair("=value").is_err());
    }
}
