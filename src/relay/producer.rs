// 事件生产者
use super::Termination;
use crossbeam_channel::Sender;
use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};

pub const PROMPT: &str = ">> ";

fn is_exit(line: &str) -> bool {
    line == "exit" || line == "bye"
}

/// Reads command lines until a sentinel, an error or end of input, and
/// reports exactly one [`Termination`] before stopping.
pub fn spawn_commands<R, P>(
    source: R,
    mut prompt: P,
    commands: Sender<String>,
    termination: Sender<Termination>,
) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
    P: Write + Send + 'static,
{
    thread::Builder::new()
        .name("command-producer".into())
        .spawn(move || {
            let mut lines = source.lines();
            loop {
                // 提示符写失败不影响转发
                let _ = prompt.write_all(PROMPT.as_bytes()).and_then(|_| prompt.flush());

                let signal = match lines.next() {
                    Some(Ok(line)) if is_exit(&line) => Termination::Exit,
                    Some(Ok(line)) => {
                        if commands.send(line).is_err() {
                            return;
                        }
                        continue;
                    }
                    Some(Err(e)) => Termination::InputError(e.to_string()),
                    None => Termination::EndOfInput,
                };
                log::debug!("Command producer stopping: {}", signal);
                let _ = termination.send(signal);
                return;
            }
        })
}

/// Sends a single command once, racing whatever the command producer sends.
pub fn spawn_startup(command: String, commands: Sender<String>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("startup-producer".into())
        .spawn(move || {
            let _ = commands.send(command);
        })
}
