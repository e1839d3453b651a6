//! External program invocation.
//!
//! Every subprocess the backup run needs (transfer, compression, package
//! exports) is described as an [`ExternalCommand`] and executed through a
//! [`CommandRunner`]. Runs are synchronous with no timeout; the exit status
//! is the only signal consumed. Output is passed through as it arrives.

use crate::error::SnapbakError;
use crate::Result;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

/// Chunks in flight between the pipe readers and the sink
const PENDING_CHUNKS: usize = 64;
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    /// Redirect stdout into this file instead of passing it through
    pub stdout_file: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdout_file: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdout_to(mut self, file: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(file.into());
        self
    }

    /// Shell-like rendering for messages and logs
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        if let Some(ref file) = self.stdout_file {
            rendered.push_str(" > ");
            rendered.push_str(&file.display().to_string());
        }
        rendered
    }
}

pub trait CommandRunner {
    /// Run `command` to completion and return its exit status.
    ///
    /// Combined stdout and stderr (stdout only when not redirected) is
    /// written to `sink` in the order it is produced.
    fn run(&mut self, command: &ExternalCommand, sink: &mut dyn Write) -> Result<i32>;
}

/// Run a command and turn a non-zero status into [`SnapbakError::CommandFailed`]
pub fn run_checked(
    runner: &mut dyn CommandRunner,
    command: &ExternalCommand,
    sink: &mut dyn Write,
) -> Result<()> {
    match runner.run(command, sink)? {
        0 => Ok(()),
        code => Err(SnapbakError::CommandFailed {
            command: command.display(),
            code,
        }),
    }
}

/// Runs commands as real child processes, echoing their output to the terminal
#[derive(Debug, Clone)]
pub struct SystemRunner {
    pub echo: bool,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self { echo: true }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &ExternalCommand, sink: &mut dyn Write) -> Result<i32> {
        tracing::debug!(command = %command.display(), "running external command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = command.current_dir {
            cmd.current_dir(dir);
        }
        if let Some(ref file) = command.stdout_file {
            cmd.stdout(Stdio::from(File::create(resolve(command, file))?));
        }

        let mut child = cmd.spawn().map_err(|source| SnapbakError::CommandSpawn {
            command: command.display(),
            source,
        })?;

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(PENDING_CHUNKS);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward(stderr, tx.clone()));
        }
        drop(tx);

        // Keep draining after a sink failure so the child never blocks on a full pipe
        let mut sink_error: Option<io::Error> = None;
        let mut terminal = io::stdout();
        for chunk in rx {
            if self.echo {
                let _ = terminal.write_all(&chunk);
                let _ = terminal.flush();
            }
            if sink_error.is_none() {
                if let Err(e) = sink.write_all(&chunk) {
                    sink_error = Some(e);
                }
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait()?;
        if let Some(e) = sink_error {
            return Err(e.into());
        }
        sink.flush()?;

        let code = status.code().unwrap_or(1);
        tracing::debug!(command = %command.program, code, "external command finished");
        Ok(code)
    }
}

/// Copy a child pipe into the channel chunk by chunk until it closes
fn forward<R>(mut pipe: R, tx: mpsc::SyncSender<Vec<u8>>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

/// Relative redirect targets are interpreted against the command's working directory
fn resolve(command: &ExternalCommand, file: &Path) -> PathBuf {
    match command.current_dir {
        Some(ref dir) if file.is_relative() => dir.join(file),
        _ => file.to_path_buf(),
    }
}
