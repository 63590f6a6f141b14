// 命令转发主循环
pub mod producer;

use crate::utils::error::RelayError;
use anyhow::Result;
use crossbeam_channel::{bounded, never, select, Receiver};
use std::fmt;
use std::io::{BufRead, Write};

/// Injected once per run, alongside whatever the user types first.
pub const STARTUP_COMMAND: &str = "alias ll='ls -lahtr'";

/// The session half the relay tears down when input ends.
pub trait RemoteShell {
    fn close(&mut self) -> Result<()>;
    /// Blocks until the remote side has exited.
    fn wait(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `exit` or `bye` was typed.
    Exit,
    /// Local input closed without a sentinel.
    EndOfInput,
    InputError(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exit => f.write_str("exit"),
            Termination::EndOfInput => f.write_str("EOF"),
            Termination::InputError(reason) => f.write_str(reason),
        }
    }
}

enum Event {
    Command(String),
    CommandsClosed,
    Startup(Option<String>),
    Terminate(Termination),
}

/// Serializes every write into the remote shell through one loop.
pub struct SessionRelay<W, S> {
    input: W,
    session: S,
}

impl<W: Write, S: RemoteShell> SessionRelay<W, S> {
    pub fn new(input: W, session: S) -> Self {
        Self { input, session }
    }

    /// Relays lines from `source` until termination, then closes and waits
    /// for the session. `prompt` receives the `>> ` marker before each read.
    pub fn run<R, P>(mut self, source: R, prompt: P) -> Result<Termination>
    where
        R: BufRead + Send + 'static,
        P: Write + Send + 'static,
    {
        let (command_tx, command_rx) = bounded::<String>(0);
        let (termination_tx, termination_rx) = bounded::<Termination>(0);
        let (startup_tx, startup_rx) = bounded::<String>(0);

        producer::spawn_commands(source, prompt, command_tx, termination_tx)?;
        producer::spawn_startup(STARTUP_COMMAND.to_string(), startup_tx)?;

        let mut commands = command_rx;
        let mut startup: Receiver<String> = startup_rx.clone();
        let mut startup_written = false;

        loop {
            let event = select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => Event::Command(command),
                    Err(_) => Event::CommandsClosed,
                },
                recv(startup) -> msg => Event::Startup(msg.ok()),
                recv(termination_rx) -> msg => {
                    Event::Terminate(msg.unwrap_or(Termination::EndOfInput))
                },
            };

            match event {
                Event::Command(command) => self.write_command(&command)?,
                Event::CommandsClosed => commands = never(),
                Event::Startup(command) => {
                    if let Some(command) = command {
                        self.write_command(&command)?;
                        startup_written = true;
                    }
                    startup = never();
                }
                Event::Terminate(reason) => {
                    // 启动命令每次运行必须写入一次
                    if !startup_written {
                        if let Ok(command) = startup_rx.recv() {
                            self.write_command(&command)?;
                        }
                    }
                    println!("Closing connection... {}", reason);
                    self.session.close()?;
                    self.session.wait()?;
                    return Ok(reason);
                }
            }
        }
    }

    fn write_command(&mut self, command: &str) -> Result<()> {
        log::debug!("-> {}", command);
        writeln!(self.input, "{}", command)
            .and_then(|_| self.input.flush())
            .map_err(RelayError::Write)?;
        Ok(())
    }
}
