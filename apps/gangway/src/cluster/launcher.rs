use crate::pty::{Command, PtyProcess, PtyReader, PtyWriter, SpawnConfig, WindowSize};
use anyhow::Result;
use std::fmt;

/// Launches the isolated local process that hosts a cluster session.
pub trait SessionLauncher: Send + Sync {
    fn launch(&self, config: SpawnConfig) -> Result<LocalClusterSession>;
}

/// Spawns the session inside a pseudo terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct PtyLauncher;

impl SessionLauncher for PtyLauncher {
    fn launch(&self, config: SpawnConfig) -> Result<LocalClusterSession> {
        let (process, reader, writer) = PtyProcess::spawn(config)?;
        Ok(LocalClusterSession::new(process, reader, writer))
    }
}

/// Wraps the initializer script so it runs as pid 1 of a fresh pid namespace
/// with its own /proc mount.
pub fn isolated_command(init_script: &str) -> Command {
    Command::new("unshare").args(["--fork", "--pid", "--mount-proc", init_script])
}

/// A live cluster session. Owns the child process until it is terminated or
/// the handle is dropped.
pub struct LocalClusterSession {
    process: PtyProcess,
    reader: PtyReader,
    writer: PtyWriter,
}

impl fmt::Debug for LocalClusterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClusterSession")
            .field("pid", &self.process.pid())
            .finish()
    }
}

impl LocalClusterSession {
    pub fn new(process: PtyProcess, reader: PtyReader, writer: PtyWriter) -> Self {
        Self {
            process,
            reader,
            writer,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn reader(&self) -> PtyReader {
        self.reader.clone()
    }

    pub fn writer(&self) -> PtyWriter {
        self.writer.clone()
    }

    pub fn resize(&self, size: WindowSize) -> Result<()> {
        self.process.resize(size)
    }

    pub async fn wait(&self) -> Result<u32> {
        self.process.wait().await
    }

    pub fn terminate(self) {
        self.process.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_command_runs_script_under_unshare() {
        let command = isolated_command("/opt/gangway/init-kubectl.sh");
        assert_eq!(command.program, "unshare");
        assert_eq!(
            command.args,
            vec!["--fork", "--pid", "--mount-proc", "/opt/gangway/init-kubectl.sh"]
        );
    }
}
