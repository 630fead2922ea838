use anyhow::{Context, Result, anyhow};
use portable_pty::{Child, CommandBuilder, MasterPty, PtyPair, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

#[derive(Clone, Debug)]
pub struct SpawnConfig {
    pub command: Command,
    pub size: WindowSize,
}

impl SpawnConfig {
    pub fn new(command: Command, size: WindowSize) -> Self {
        Self { command, size }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A child process attached to the slave side of a pseudo terminal. The child
/// is killed when the process handle is shut down or dropped.
pub struct PtyProcess {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>,
    pid: Option<u32>,
}

impl PtyProcess {
    pub fn spawn(config: SpawnConfig) -> Result<(Self, PtyReader, PtyWriter)> {
        let mut pair = open_pair(config.size)?;
        let child = spawn_child(&mut pair, &config.command)?;
        let pid = child.process_id();
        let master = pair.master;
        let reader = master.try_clone_reader().context("clone PTY reader")?;
        let writer = master.take_writer().context("take PTY writer")?;

        let process = Self {
            master: Arc::new(Mutex::new(master)),
            child: Arc::new(Mutex::new(Some(child))),
            pid,
        };

        Ok((process, PtyReader::new(reader), PtyWriter::new(writer)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the child to exit and returns its exit code.
    pub async fn wait(&self) -> Result<u32> {
        let child = self.child.clone();
        task::spawn_blocking(move || {
            let mut guard = lock(&child);
            match guard.as_mut() {
                Some(child) => Ok(child.wait().context("wait for PTY child")?.exit_code()),
                None => Err(anyhow!("PTY child already shut down")),
            }
        })
        .await
        .context("join child wait task")?
    }

    pub fn shutdown(&self) {
        let mut guard = lock(&self.child);
        if let Some(mut child) = guard.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    pub fn resize(&self, size: WindowSize) -> Result<()> {
        let master = lock(&self.master);
        master.resize(pty_size(size)).context("resize PTY")
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
pub struct PtyReader {
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
}

impl PtyReader {
    const CHUNK: usize = 4096;

    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }

    /// Reads the next chunk of output; `None` once the child side closes.
    pub async fn read_chunk(&self) -> Result<Option<Vec<u8>>> {
        let reader = self.reader.clone();
        task::spawn_blocking(move || {
            let mut guard = lock(&reader);
            let mut buffer = vec![0u8; Self::CHUNK];
            loop {
                match guard.read(&mut buffer) {
                    Ok(0) => return Ok(None),
                    Ok(n) => {
                        buffer.truncate(n);
                        return Ok(Some(buffer));
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO on the master once the slave is closed.
                    Err(err) if err.raw_os_error() == Some(5) => return Ok(None),
                    Err(err) => return Err(err.into()),
                }
            }
        })
        .await
        .context("join PTY read task")?
    }
}

#[derive(Clone)]
pub struct PtyWriter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyWriter {
    fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = lock(&self.writer);
        guard.write_all(bytes).context("write to PTY")?;
        guard.flush().context("flush PTY writer")?;
        Ok(())
    }
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn open_pair(size: WindowSize) -> Result<PtyPair> {
    native_pty_system()
        .openpty(pty_size(size))
        .context("open PTY pair")
}

fn spawn_child(pair: &mut PtyPair, command: &Command) -> Result<Box<dyn Child + Send + Sync>> {
    let mut cmd = CommandBuilder::new(&command.program);
    for arg in &command.args {
        cmd.arg(arg);
    }
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    pair.slave
        .spawn_command(cmd)
        .with_context(|| format!("spawn PTY child '{}'", command.program))
}
