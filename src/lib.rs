// 库文件，导出模块
pub mod cli;
pub mod config;
pub mod credentials;
pub mod relay;
pub mod ssh;
pub mod utils;

use anyhow::Result;
use config::SessionConfig;
use relay::{SessionRelay, Termination};
use ssh::SshClient;
use std::io::{self, BufReader};
use utils::error::RelayError;

/// Connects, relays stdin to the remote shell until `exit`/`bye` or end of
/// input, then tears the session down.
pub fn run(config: SessionConfig) -> Result<()> {
    println!("Connecting to {}@{}...", config.user, config.host);
    let client = SshClient::connect(&config)?;
    println!("Connected...");

    let (input, session) = client.open_shell()?;
    let relay = SessionRelay::new(input, session);

    match relay.run(BufReader::new(io::stdin()), io::stdout())? {
        Termination::InputError(reason) => Err(RelayError::Input(reason).into()),
        Termination::Exit | Termination::EndOfInput => Ok(()),
    }
}
