use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Required -host option")]
    MissingHost,

    #[error("Could not find host configuration for {host} host")]
    HostNotFound { host: String },

    #[error("Cannot read credential file {}: {source}", path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid credential file {}: {message}", path.display())]
    CredentialParse { path: PathBuf, message: String },

    #[error("Cannot determine home directory")]
    HomeDirUnavailable,

    #[error("Missing {field} for host {host}")]
    MissingCredentials { host: String, field: &'static str },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Host key for {host} does not match the known_hosts entry")]
    HostKeyMismatch { host: String },

    #[error("Host {host} is not present in {}", known_hosts.display())]
    UnknownHostKey { host: String, known_hosts: PathBuf },

    #[error("Failed to write to remote shell: {0}")]
    Write(#[source] std::io::Error),

    #[error("Reading local input failed: {0}")]
    Input(String),

    #[error("Remote shell exited with status {0}")]
    RemoteExit(i32),
}
