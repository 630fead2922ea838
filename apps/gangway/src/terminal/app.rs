use crate::cluster::{ClusterConnectionOptions, ClusterSessionBootstrap, KubectlProbe, LocalClusterSession};
use crate::config::GatewayConfig;
use crate::confirm::{
    ConfirmationGate, ConfirmationOutcome, ConfirmationRequest, HttpConfirmationBackend, SystemUser,
};
use crate::crypto::TokenCipher;
use crate::pty::PtyWriter;
use crate::terminal::cli::{Cli, Command, ConfirmArgs, KubeArgs};
use crate::terminal::error::CliError;
use crate::terminal::tty::{RawModeGuard, detect_terminal_size};
use std::io::{IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EXIT_REJECTED: u8 = 3;
const EXIT_CANCELLED: u8 = 130;
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

pub async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = GatewayConfig::from_env()?;
    debug!(target: "gangway::cli", config = ?config, "loaded configuration");

    match cli.command {
        Command::Confirm(args) => confirm(&config, args).await,
        Command::Kube(args) => kube(&config, args).await,
    }
}

async fn confirm(config: &GatewayConfig, args: ConfirmArgs) -> Result<ExitCode, CliError> {
    let request = ConfirmationRequest::builder()
        .user(args.user_id)
        .system_user(SystemUser::new(args.system_user_id, args.system_username))
        .target_kind(args.target_kind)
        .target_id(args.target_id)
        .build()?;
    let backend =
        HttpConfirmationBackend::new(config.backend_url.clone(), config.access_token.clone())?;
    let mut gate =
        ConfirmationGate::new(request, Arc::new(backend)).with_poll_interval(config.poll_interval);

    if !gate.check_required().await? {
        println!("no confirmation required");
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        target: "gangway::cli",
        details = %gate.request().synopsis(),
        poll_interval = ?gate.poll_interval(),
        "waiting for confirmation"
    );
    println!("waiting for approval: {}", gate.ticket_url());
    let reviewers = gate.reviewers();
    if !reviewers.is_empty() {
        println!("reviewers: {}", reviewers.join(", "));
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(target: "gangway::cli", "interrupt received; cancelling confirmation");
                cancel.cancel();
            }
        })
    };
    let outcome = gate.wait(&cancel).await;
    interrupt.abort();

    println!("confirmation {outcome}");
    Ok(match outcome {
        ConfirmationOutcome::Approved { .. } => ExitCode::SUCCESS,
        ConfirmationOutcome::Rejected { .. } => ExitCode::from(EXIT_REJECTED),
        ConfirmationOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
    })
}

async fn kube(config: &GatewayConfig, args: KubeArgs) -> Result<ExitCode, CliError> {
    let mut options = ClusterConnectionOptions::new()
        .with_cluster_server(args.server)
        .with_token(args.token)
        .with_skip_tls_verify(!args.verify_tls)
        .with_extra_env(args.env);
    if let Some(username) = args.username {
        options = options.with_username(username);
    }
    if let Some(script) = &config.init_script {
        options = options.with_init_script(script.clone());
    }

    let cipher = TokenCipher::new(config.cipher_key.as_deref().unwrap_or_default());
    if !cipher.is_configured() {
        warn!(
            target: "gangway::cli",
            "GANGWAY_CIPHER_KEY not set; the session receives the token in clear text"
        );
    }
    let bootstrap = ClusterSessionBootstrap::new(options, Arc::new(cipher))
        .with_probe(Arc::new(KubectlProbe::new(config.kubectl_bin.clone())))
        .with_banner(config.kubectl_banner.clone());

    let session = bootstrap.connect(detect_terminal_size()).await?;
    bootstrap.keep_alive()?;
    let code = relay(session).await?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}

/// Pipes the local terminal to the session until the child exits and returns
/// its exit code.
async fn relay(session: LocalClusterSession) -> Result<u32, CliError> {
    let _raw = RawModeGuard::new(std::io::stdin().is_terminal());

    let reader = session.reader();
    let output = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Ok(Some(chunk)) = reader.read_chunk().await {
            if stdout.write_all(&chunk).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });
    spawn_stdin_forwarder(session.writer())?;

    let mut winch = signal(SignalKind::window_change())?;
    let status = {
        let wait = session.wait();
        tokio::pin!(wait);
        loop {
            tokio::select! {
                status = &mut wait => break status,
                Some(()) = winch.recv() => {
                    let size = detect_terminal_size();
                    if let Err(err) = session.resize(size) {
                        warn!(target: "gangway::cli", error = %format!("{err:#}"), "resize session failed");
                    }
                }
            }
        }
    };

    let _ = tokio::time::timeout(OUTPUT_DRAIN, output).await;
    session.terminate();
    status.map_err(|err| CliError::Runtime(format!("{err:#}")))
}

// Blocking stdin reads cannot be cancelled; the forwarder thread is detached
// and ends with the process.
fn spawn_stdin_forwarder(writer: PtyWriter) -> Result<(), CliError> {
    thread::Builder::new()
        .name("gangway-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if writer.write(&buffer[..n]).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        })?;
    Ok(())
}
