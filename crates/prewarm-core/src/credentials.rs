//! Registry credentials
//!
//! Credentials are given either inline as `user:password` or as the path to
//! a YAML file of the form:
//!
//! ```yaml
//! scc:
//!   username: user
//!   password: pass
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Username/password pair passed to registries and external tools
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read credentials from an existing file path, or parse them inline
    pub fn read(credentials_or_file: &str) -> Result<Self> {
        let path = Path::new(credentials_or_file);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Self::parse(credentials_or_file)
        }
    }

    /// Parse `user:password`
    pub fn parse(creds: &str) -> Result<Self> {
        match creds.split_once(':') {
            Some((user, pass)) if !user.is_empty() => Ok(Self::new(user, pass)),
            _ => Err(Error::credentials(
                "expected user:password or a credentials file",
            )),
        }
    }

    /// Read credentials from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::credentials(format!("failed reading {}: {}", path.display(), e))
        })?;
        let file: CredentialsFile = serde_yaml_ng::from_str(&content).map_err(|e| {
            Error::credentials(format!("failed reading {}: {}", path.display(), e))
        })?;
        Ok(Self::new(file.scc.username, file.scc.password))
    }

    /// Form expected by `--creds`-style command line flags
    pub fn to_arg(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    scc: CredentialsEntry,
}

#[derive(Debug, Deserialize)]
struct CredentialsEntry {
    username: String,
    password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_inline() {
        let creds = Credentials::read("user:secret").unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password, "secret");
        assert_eq!(creds.to_arg(), "user:secret");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Credentials::parse("nocolon"),
            Err(Error::Credentials { .. })
        ));
        assert!(Credentials::parse(":pass").is_err());
    }

    #[test]
    fn test_read_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("creds.yaml");
        std::fs::write(&path, "scc:\n  username: joe\n  password: pw\n").unwrap();

        let creds = Credentials::read(path.to_str().unwrap()).unwrap();
        assert_eq!(creds, Credentials::new("joe", "pw"));
    }

    #[test]
    fn test_read_from_broken_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("creds.yaml");
        std::fs::write(&path, "other: {}\n").unwrap();

        assert!(matches!(
            Credentials::read(path.to_str().unwrap()),
            Err(Error::Credentials { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let out = format!("{:?}", Credentials::new("joe", "hunter2"));
        assert!(!out.contains("hunter2"));
    }
}
