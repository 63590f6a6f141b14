// 凭据文件解析与查找
use crate::utils::error::RelayError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One entry of the credential store.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub host: String,
    pub user: String,
    pub pass: String,
    #[serde(default)]
    pub alias: Vec<String>,
}

impl CredentialRecord {
    /// Substring match against the host, or exact match against an alias.
    pub fn matches(&self, host_or_alias: &str) -> bool {
        self.host.contains(host_or_alias) || self.alias.iter().any(|a| a == host_or_alias)
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    records: Vec<CredentialRecord>,
}

impl CredentialStore {
    /// Reads the store once. JSON record lists and `<host> <user> <password>`
    /// line files are both accepted.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RelayError::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse<P: AsRef<Path>>(path: P, content: &str) -> Result<Self, RelayError> {
        let path = path.as_ref().to_path_buf();
        let is_json = path.extension().is_some_and(|ext| ext == "json")
            || content.trim_start().starts_with('[');

        let records: Vec<CredentialRecord> = if is_json {
            serde_json::from_str(content).map_err(|e| RelayError::CredentialParse {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            parse_lines(content).map_err(|message| RelayError::CredentialParse {
                path: path.clone(),
                message,
            })?
        };

        log::debug!("Loaded {} credential records from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// First matching record wins.
    pub fn lookup(&self, host_or_alias: &str) -> Result<&CredentialRecord, RelayError> {
        self.records
            .iter()
            .find(|record| record.matches(host_or_alias))
            .ok_or_else(|| RelayError::HostNotFound {
                host: host_or_alias.to_string(),
            })
    }
}

fn parse_lines(content: &str) -> Result<Vec<CredentialRecord>, String> {
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [host, user, pass] => records.push(CredentialRecord {
                host: host.to_string(),
                user: user.to_string(),
                pass: pass.to_string(),
                alias: Vec::new(),
            }),
            _ => {
                return Err(format!(
                    "line {}: expected `<host> <user> <password>`, found {} fields",
                    index + 1,
                    fields.len()
                ))
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_STORE: &str = r#"[
        {"host": "db01.internal:22", "user": "postgres", "pass": "pg", "alias": ["db"]},
        {"host": "web01.internal", "user": "deploy", "pass": "d3ploy", "alias": ["web", "www"]},
        {"host": "web02.internal", "user": "other", "pass": "x"}
    ]"#;

    #[test]
    fn json_lookup_by_substring_and_alias() {
        let store = CredentialStore::parse("hosts.json", JSON_STORE).unwrap();
        assert_eq!(store.records.len(), 3);

        assert_eq!(store.lookup("db01").unwrap().user, "postgres");
        assert_eq!(store.lookup("www").unwrap().host, "web01.internal");
        // "web0" matches both web hosts, the first one wins
        assert_eq!(store.lookup("web0").unwrap().user, "deploy");
    }

    #[test]
    fn alias_must_match_exactly() {
        let store = CredentialStore::parse("hosts.json", JSON_STORE).unwrap();
        let err = store.lookup("ww").unwrap_err();
        assert!(matches!(err, RelayError::HostNotFound { ref host } if host == "ww"));
        assert_eq!(
            err.to_string(),
            "Could not find host configuration for ww host"
        );
    }

    #[test]
    fn line_format() {
        let content = "# host user password\n\nrouter1 admin s3cret\n10.0.0.5   root   toor\n";
        let store = CredentialStore::parse("hosts.txt", content).unwrap();
        assert_eq!(store.records.len(), 2);
        let record = store.lookup("10.0.0").unwrap();
        assert_eq!(record.user, "root");
        assert_eq!(record.pass, "toor");
        assert!(record.alias.is_empty());
    }

    #[test]
    fn json_detected_without_extension() {
        let store = CredentialStore::parse("hosts", JSON_STORE).unwrap();
        assert_eq!(store.lookup("db").unwrap().pass, "pg");
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = CredentialStore::parse("hosts.txt", "a b c\nonly-two fields\n").unwrap_err();
        match err {
            RelayError::CredentialParse { message, .. } => assert!(message.starts_with("line 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = CredentialStore::parse("hosts.json", "{not json").unwrap_err();
        assert!(matches!(err, RelayError::CredentialParse { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = CredentialStore::load("/nonexistent/ssh-relay/hosts.json").unwrap_err();
        assert!(matches!(err, RelayError::CredentialFile { .. }));
    }
}
