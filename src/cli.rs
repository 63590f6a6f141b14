// 命令行参数解析
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Long options that may also be written Go style with a single dash (`-host`).
const LONG_FLAGS: &[&str] = &[
    "host",
    "user",
    "pwd",
    "file",
    "ciphers",
    "strict-host-key",
    "known-hosts",
    "verbose",
    "help",
    "version",
];

#[derive(Parser, Debug)]
#[command(name = "ssh-relay")]
#[command(about = "Relay typed commands to an interactive remote shell over SSH")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Remote host as hostname[:port], or an alias from the credential file
    #[arg(long, allow_hyphen_values = true)]
    pub host: Option<String>,

    /// SSH username
    #[arg(long, allow_hyphen_values = true)]
    pub user: Option<String>,

    /// SSH password
    #[arg(long = "pwd", allow_hyphen_values = true)]
    pub password: Option<String>,

    /// Additional client ciphers, comma separated
    #[arg(short = 'c', long = "ciphers", default_value = "", allow_hyphen_values = true)]
    pub ciphers: String,

    /// File with hosts and passwords, used when -user or -pwd is missing
    #[arg(long, allow_hyphen_values = true)]
    pub file: Option<PathBuf>,

    /// Verify the server host key against known_hosts
    #[arg(long)]
    pub strict_host_key: bool,

    /// known_hosts file used with --strict-host-key
    #[arg(long, requires = "strict_host_key", allow_hyphen_values = true)]
    pub known_hosts: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parses process arguments, accepting `-host` as well as `--host`.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }
}

/// Long options that consume the following argument as their value.
const VALUE_FLAGS: &[&str] = &["host", "user", "pwd", "file", "ciphers", "known-hosts"];

/// Rewrites single-dash long options (`-host x`, `-host=x`) into the double-dash
/// form clap understands. Like Go's `flag`, the argument after a value-taking
/// option is its value and is passed through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut value_pending = false;
    let mut normalized = Vec::new();
    for arg in args.into_iter().map(Into::into) {
        if std::mem::take(&mut value_pending) {
            normalized.push(arg);
            continue;
        }
        let Some(s) = arg.to_str() else {
            normalized.push(arg);
            continue;
        };
        value_pending = takes_next_value(s);
        if is_single_dash_long(s) {
            normalized.push(OsString::from(format!("-{}", s)));
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

fn takes_next_value(arg: &str) -> bool {
    if arg == "-c" {
        return true;
    }
    let name = arg.trim_start_matches('-');
    arg.starts_with('-') && !name.contains('=') && VALUE_FLAGS.contains(&name)
}

fn is_single_dash_long(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.starts_with('-') {
        return false;
    }
    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    LONG_FLAGS.contains(&name)
}
