// SSH模块入口
pub mod client;
pub mod session;

pub use client::SshClient;
pub use session::{ShellInput, ShellSession};
