// 配置管理
use crate::cli::Cli;
use crate::credentials::CredentialStore;
use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use dialoguer::Password;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 22;
const DEFAULT_CREDENTIAL_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Always `hostname:port`.
    pub host: String,
    pub user: String,
    pub password: String,
    /// Ciphers appended after the transport defaults, in the order given.
    pub ciphers: Vec<String>,
    pub host_key_policy: HostKeyPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Any server key is accepted.
    AcceptAny,
    /// The server key must be listed in this known_hosts file.
    KnownHosts(PathBuf),
}

impl SessionConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = Self::resolve(cli, |path| {
            println!(
                "Using {} to resolve credentials for {} host",
                path.display(),
                cli.host.as_deref().unwrap_or_default()
            );
            CredentialStore::load(path)
        })?;

        if config.password.is_empty() {
            config.password = Password::new()
                .with_prompt(format!("Enter password for {}@{}", config.user, config.host))
                .interact()
                .context("Failed to read password")?;
        }

        Ok(config)
    }

    /// Builds the config from parsed flags. `load_store` is only invoked when
    /// the user or the password was not given on the command line.
    pub fn resolve<F>(cli: &Cli, load_store: F) -> Result<Self, RelayError>
    where
        F: FnOnce(&Path) -> Result<CredentialStore, RelayError>,
    {
        let host = cli
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(RelayError::MissingHost)?;

        let mut host = host.to_string();
        let mut user = cli.user.clone().unwrap_or_default();
        let mut password = cli.password.clone().unwrap_or_default();

        if user.is_empty() || password.is_empty() {
            let path = match &cli.file {
                Some(path) => path.clone(),
                None => default_credential_file()?,
            };
            let store = load_store(&path)?;
            let record = store.lookup(&host)?;
            log::debug!("Host {} resolved to {} via {}", host, record.host, path.display());

            if user.is_empty() {
                user = record.user.clone();
            }
            if password.is_empty() {
                password = record.pass.clone();
            }
            host = record.host.clone();
        }

        if user.is_empty() {
            return Err(RelayError::MissingCredentials { host, field: "user" });
        }

        let host_key_policy = if cli.strict_host_key {
            let path = match &cli.known_hosts {
                Some(path) => path.clone(),
                None => default_known_hosts()?,
            };
            HostKeyPolicy::KnownHosts(path)
        } else {
            HostKeyPolicy::AcceptAny
        };

        Ok(SessionConfig {
            host: normalize_host(&host),
            user,
            password,
            ciphers: parse_ciphers(&cli.ciphers),
            host_key_policy,
        })
    }

    /// Host name without the port, as written in known_hosts.
    pub fn host_name(&self) -> &str {
        self.host.rsplit_once(':').map_or(&self.host, |(name, _)| name)
    }

    pub fn port(&self) -> u16 {
        self.host
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }
}

/// Appends the default SSH port unless one is already present.
pub fn normalize_host(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_PORT)
    }
}

/// Splits a comma separated cipher list, trimming each entry.
pub fn parse_ciphers(flag: &str) -> Vec<String> {
    flag.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

fn default_credential_file() -> Result<PathBuf, RelayError> {
    home_dir().map(|home| home.join(DEFAULT_CREDENTIAL_FILE))
}

fn default_known_hosts() -> Result<PathBuf, RelayError> {
    home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

fn home_dir() -> Result<PathBuf, RelayError> {
    home::home_dir().ok_or(RelayError::HomeDirUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::normalize_args;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ssh-relay"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(normalize_args(argv)).unwrap()
    }

    fn store(content: &str) -> CredentialStore {
        CredentialStore::parse("hosts.json", content).unwrap()
    }

    fn no_store(_: &Path) -> Result<CredentialStore, RelayError> {
        panic!("credential store must not be consulted")
    }

    const STORE: &str = r#"[
        {"host": "10.1.2.3", "user": "alice", "pass": "wonderland", "alias": ["myalias"]},
        {"host": "legacy.example.org:2022", "user": "ops", "pass": "0ps"}
    ]"#;

    #[test]
    fn explicit_credentials_skip_the_store() {
        let cfg = SessionConfig::resolve(
            &cli(&["-host", "example.com", "-user", "bob", "-pwd", "secret"]),
            no_store,
        )
        .unwrap();
        assert_eq!(cfg.host, "example.com:22");
        assert_eq!(cfg.user, "bob");
        assert_eq!(cfg.password, "secret");
        assert!(cfg.ciphers.is_empty());
        assert_eq!(cfg.host_key_policy, HostKeyPolicy::AcceptAny);
    }

    #[test]
    fn alias_resolves_through_the_store() {
        let cfg = SessionConfig::resolve(&cli(&["-host", "myalias", "-file", "/etc/hosts.json"]), |path| {
            assert_eq!(path, Path::new("/etc/hosts.json"));
            Ok(store(STORE))
        })
        .unwrap();
        assert_eq!(cfg.host, "10.1.2.3:22");
        assert_eq!(cfg.user, "alice");
        assert_eq!(cfg.password, "wonderland");
    }

    #[test]
    fn explicit_user_wins_over_the_record() {
        let cfg = SessionConfig::resolve(&cli(&["-host", "legacy", "-user", "root"]), |_| {
            Ok(store(STORE))
        })
        .unwrap();
        assert_eq!(cfg.host, "legacy.example.org:2022");
        assert_eq!(cfg.user, "root");
        assert_eq!(cfg.password, "0ps");
        assert_eq!(cfg.port(), 2022);
        assert_eq!(cfg.host_name(), "legacy.example.org");
    }

    #[test]
    fn unknown_host_is_a_configuration_error() {
        let err = SessionConfig::resolve(&cli(&["-host", "unknownhost", "-file", "x.json"]), |_| {
            Ok(store(STORE))
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find host configuration for unknownhost host"
        );
    }

    #[test]
    fn missing_or_blank_host_is_rejected() {
        let err = SessionConfig::resolve(&cli(&["-user", "u", "-pwd", "p"]), no_store).unwrap_err();
        assert!(matches!(err, RelayError::MissingHost));

        let err = SessionConfig::resolve(&cli(&["-host", "  ", "-user", "u", "-pwd", "p"]), no_store)
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingHost));
    }

    #[test]
    fn store_errors_propagate() {
        let err = SessionConfig::resolve(&cli(&["-host", "h", "-file", "broken.json"]), |path| {
            CredentialStore::parse(path, "not json")
        })
        .unwrap_err();
        assert!(matches!(err, RelayError::CredentialParse { .. }));
    }

    #[test]
    fn strict_host_key_uses_given_known_hosts() {
        let cfg = SessionConfig::resolve(
            &cli(&[
                "-host", "h", "-user", "u", "-pwd", "p", "-strict-host-key", "-known-hosts", "/tmp/kh",
            ]),
            no_store,
        )
        .unwrap();
        assert_eq!(cfg.host_key_policy, HostKeyPolicy::KnownHosts(PathBuf::from("/tmp/kh")));
    }

    #[test]
    fn record_without_user_is_rejected() {
        let err = SessionConfig::resolve(&cli(&["-host", "h", "-file", "hosts.json"]), |_| {
            Ok(store(r#"[{"host": "h", "user": "", "pass": "p"}]"#))
        })
        .unwrap_err();
        assert!(matches!(
            err,
            RelayError::MissingCredentials { field: "user", ref host } if host == "h"
        ));
    }

    #[test]
    fn missing_home_is_not_reported_as_a_credential_file() {
        let err = RelayError::HomeDirUnavailable;
        assert_eq!(err.to_string(), "Cannot determine home directory");
        assert!(!err.to_string().contains("credential file"));
    }

    #[test]
    fn port_is_kept_when_present() {
        assert_eq!(normalize_host("example.com"), "example.com:22");
        assert_eq!(normalize_host("example.com:2222"), "example.com:2222");
    }

    #[test]
    fn ciphers_are_split_and_trimmed_in_order() {
        assert_eq!(
            parse_ciphers(" aes128-cbc,aes256-ctr ,  3des-cbc"),
            vec!["aes128-cbc", "aes256-ctr", "3des-cbc"]
        );
        assert!(parse_ciphers("").is_empty());
        assert_eq!(parse_ciphers("aes128-ctr,,"), vec!["aes128-ctr"]);
    }
}
