// SSH客户端封装
use crate::config::{HostKeyPolicy, SessionConfig};
use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use ssh2::{CheckResult, KeyboardInteractivePrompt, KnownHostFileKind, MethodType, Prompt, Session};
use std::net::TcpStream;

/// Appended to the transport defaults so older servers can still negotiate.
pub const LEGACY_CIPHER: &str = "3des-cbc";

pub struct SshClient {
    pub session: Session,
}

impl SshClient {
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let tcp = TcpStream::connect(&config.host)
            .with_context(|| format!("Failed to connect to SSH server {}", config.host))?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);

        let defaults = session
            .supported_algs(MethodType::CryptCs)
            .context("Failed to query supported ciphers")?;
        let ciphers = cipher_preferences(&defaults, &config.ciphers);
        println!("Client ciphers {:?}", ciphers);

        let prefs = ciphers.join(",");
        session
            .method_pref(MethodType::CryptCs, &prefs)
            .context("Failed to set client-to-server ciphers")?;
        session
            .method_pref(MethodType::CryptSc, &prefs)
            .context("Failed to set server-to-client ciphers")?;

        session.handshake().context("SSH handshake failed")?;

        verify_host_key(&session, config)?;
        authenticate(&session, config)?;

        if !session.authenticated() {
            return Err(RelayError::AuthenticationFailed.into());
        }

        Ok(SshClient { session })
    }
}

/// Transport defaults, then the legacy cipher, then the user's extra ciphers.
pub fn cipher_preferences<S: AsRef<str>>(defaults: &[S], extra: &[String]) -> Vec<String> {
    defaults
        .iter()
        .map(|c| c.as_ref().to_string())
        .chain(std::iter::once(LEGACY_CIPHER.to_string()))
        .chain(extra.iter().cloned())
        .collect()
}

fn verify_host_key(session: &Session, config: &SessionConfig) -> Result<()> {
    let known_hosts = match &config.host_key_policy {
        HostKeyPolicy::AcceptAny => {
            log::warn!("Host key verification is disabled for {}", config.host);
            return Ok(());
        }
        HostKeyPolicy::KnownHosts(path) => path,
    };

    let (key, _) = session
        .host_key()
        .context("Server did not present a host key")?;

    let mut hosts = session.known_hosts().context("Failed to initialise known_hosts")?;
    hosts
        .read_file(known_hosts, KnownHostFileKind::OpenSSH)
        .with_context(|| format!("Failed to read {}", known_hosts.display()))?;

    let host = config.host_name().to_string();
    match hosts.check_port(&host, config.port(), key) {
        CheckResult::Match => {
            log::debug!("Host key for {} matches {}", host, known_hosts.display());
            Ok(())
        }
        CheckResult::Mismatch => Err(RelayError::HostKeyMismatch { host }.into()),
        CheckResult::NotFound | CheckResult::Failure => Err(RelayError::UnknownHostKey {
            host,
            known_hosts: known_hosts.clone(),
        }
        .into()),
    }
}

fn authenticate(session: &Session, config: &SessionConfig) -> Result<()> {
    let methods = session
        .auth_methods(&config.user)
        .context("Failed to query authentication methods")?
        .to_string();
    log::debug!("Server offers authentication methods: {}", methods);

    let offers = |name: &str| methods.split(',').any(|m| m == name);

    if offers("keyboard-interactive") || !offers("password") {
        let mut prompter = PasswordPrompter::new(&config.password);
        session
            .userauth_keyboard_interactive(&config.user, &mut prompter)
            .context("Keyboard-interactive authentication failed")?;
    } else {
        session
            .userauth_password(&config.user, &config.password)
            .context("Password authentication failed")?;
    }
    Ok(())
}

/// Answers every keyboard-interactive prompt with the password, whatever it asks.
pub struct PasswordPrompter<'a> {
    password: &'a str,
}

impl<'a> PasswordPrompter<'a> {
    pub fn new(password: &'a str) -> Self {
        Self { password }
    }
}

impl KeyboardInteractivePrompt for PasswordPrompter<'_> {
    fn prompt<'b>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'b>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn legacy_cipher_follows_defaults_and_precedes_overrides() {
        let defaults = ["aes128-ctr", "aes256-ctr"];
        let extra = vec!["aes128-cbc".to_string(), "blowfish-cbc".to_string()];
        assert_eq!(
            cipher_preferences(&defaults, &extra),
            vec!["aes128-ctr", "aes256-ctr", "3des-cbc", "aes128-cbc", "blowfish-cbc"]
        );
    }

    #[test]
    fn no_overrides_still_adds_legacy_cipher() {
        let defaults = ["chacha20-poly1305@openssh.com"];
        assert_eq!(
            cipher_preferences(&defaults, &[]),
            vec!["chacha20-poly1305@openssh.com", "3des-cbc"]
        );
    }

    #[test]
    fn prompter_answers_every_prompt_with_password() {
        let prompts = [
            Prompt { text: Cow::Borrowed("Password: "), echo: false },
            Prompt { text: Cow::Borrowed("Verification code: "), echo: true },
        ];
        let mut prompter = PasswordPrompter::new("hunter2");
        let answers = prompter.prompt("bob", "", &prompts);
        assert_eq!(answers, vec!["hunter2", "hunter2"]);

        assert!(prompter.prompt("bob", "", &[]).is_empty());
    }
}
