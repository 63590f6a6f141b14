// SSH会话管理
use crate::relay::RemoteShell;
use crate::ssh::SshClient;
use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use ssh2::{Channel, Session};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const READ_BUFFER: usize = 8192;

type SharedChannel = Arc<Mutex<Channel>>;

impl SshClient {
    /// Requests an interactive shell and starts copying its output to the
    /// local stdout/stderr. Returns the write half and the session handle.
    pub fn open_shell(self) -> Result<(ShellInput, ShellSession)> {
        let mut channel = self
            .session
            .channel_session()
            .context("Failed to open SSH channel")?;
        channel.shell().context("Failed to request shell")?;

        // libssh2 会话不能被并发阻塞调用，之后改为非阻塞轮询
        self.session.set_blocking(false);

        let channel = Arc::new(Mutex::new(channel));
        let pump = OutputPump::spawn(Arc::clone(&channel))?;

        let input = ShellInput {
            channel: Arc::clone(&channel),
        };
        let session = ShellSession {
            session: self.session,
            channel,
            pump: Some(pump),
        };
        Ok((input, session))
    }
}

fn lock(channel: &SharedChannel) -> io::Result<MutexGuard<'_, Channel>> {
    channel
        .lock()
        .map_err(|_| io::Error::new(ErrorKind::Other, "SSH channel lock poisoned"))
}

/// Write half of the remote shell.
pub struct ShellInput {
    channel: SharedChannel,
}

impl Write for ShellInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let result = lock(&self.channel)?.write(buf);
            match result {
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            let result = lock(&self.channel)?.flush();
            match result {
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                other => return other,
            }
        }
    }
}

struct OutputPump {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl OutputPump {
    fn spawn(mut channel: SharedChannel) -> Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("ssh-output".into())
            .spawn(move || relay_output(&mut channel, &mut io::stdout(), &mut io::stderr(), &stopped))
            .context("Failed to start output relay thread")?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        let _ = self.stop.try_send(());
        if self.handle.join().is_err() {
            log::error!("Output relay thread panicked");
        }
    }
}

/// Remote stdout/stderr as seen by the output pump. Reads never block.
trait ShellOutput {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn eof(&mut self) -> io::Result<bool>;
}

impl ShellOutput for SharedChannel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_available(&mut *lock(self)?, buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_available(&mut lock(self)?.stderr(), buf)
    }

    fn eof(&mut self) -> io::Result<bool> {
        Ok(lock(self)?.eof())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Drained {
    Data,
    Idle,
    Eof,
}

/// Copies remote output until EOF, an error, or a stop request. A stop
/// request is honoured after at most one buffer per stream, even while the
/// remote keeps producing output.
fn relay_output<S, O, E>(source: &mut S, out: &mut O, err: &mut E, stopped: &Receiver<()>)
where
    S: ShellOutput,
    O: Write,
    E: Write,
{
    loop {
        let stop_requested = match drain_once(source, out, err) {
            Ok(Drained::Eof) => {
                log::debug!("Remote shell reached EOF");
                return;
            }
            Ok(Drained::Data) => !matches!(stopped.try_recv(), Err(TryRecvError::Empty)),
            // 空闲时等待，同时响应停止信号
            Ok(Drained::Idle) => !matches!(
                stopped.recv_timeout(POLL_INTERVAL),
                Err(RecvTimeoutError::Timeout)
            ),
            Err(e) => {
                log::error!("Relaying remote output failed: {}", e);
                return;
            }
        };
        if stop_requested {
            return;
        }
    }
}

/// One read from each stream.
fn drain_once<S, O, E>(source: &mut S, out: &mut O, err: &mut E) -> io::Result<Drained>
where
    S: ShellOutput,
    O: Write,
    E: Write,
{
    let mut buf = [0u8; READ_BUFFER];
    let mut drained = Drained::Idle;

    let n = source.read_stdout(&mut buf)?;
    if n > 0 {
        out.write_all(&buf[..n])?;
        out.flush()?;
        drained = Drained::Data;
    }
    let n = source.read_stderr(&mut buf)?;
    if n > 0 {
        err.write_all(&buf[..n])?;
        err.flush()?;
        drained = Drained::Data;
    }

    if drained == Drained::Idle && source.eof()? {
        return Ok(Drained::Eof);
    }
    Ok(drained)
}

fn read_available<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match reader.read(buf) {
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

/// Owns the remote shell until it is closed and waited for.
pub struct ShellSession {
    session: Session,
    channel: SharedChannel,
    pump: Option<OutputPump>,
}

impl RemoteShell for ShellSession {
    fn close(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.session.set_blocking(true);
        if let Err(e) = lock(&self.channel)?.close() {
            log::debug!("Closing SSH channel failed: {}", e);
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        let status = {
            let mut channel = lock(&self.channel)?;
            channel.wait_close().context("Failed waiting for remote shell")?;
            channel.exit_status().context("Failed to read exit status")?
        };
        if let Err(e) = self.session.disconnect(None, "bye", None) {
            log::debug!("Disconnect failed: {}", e);
        }
        if status != 0 {
            return Err(RelayError::RemoteExit(status).into());
        }
        Ok(())
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
    }
}
