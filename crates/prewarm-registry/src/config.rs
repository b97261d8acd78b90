//! Distribution registry configuration
//!
//! Serialized to the `config.yml` the registry image reads at startup. Only
//! the parts needed to run as a pull-through cache are modelled.

use prewarm_core::{Credentials, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Storage location inside the registry container
pub const CONTAINER_STORAGE_DIR: &str = "/var/lib/registry";

/// Config file location inside the registry container
pub const CONTAINER_CONFIG_PATH: &str = "/etc/docker/registry/config.yml";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionConfig {
    pub version: String,
    pub log: LogSection,
    pub storage: StorageSection,
    pub http: HttpSection,
    pub proxy: ProxySection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSection {
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSection {
    pub cache: BTreeMap<String, String>,
    pub filesystem: FilesystemStorage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilesystemStorage {
    pub rootdirectory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpSection {
    pub addr: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxySection {
    pub remoteurl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl DistributionConfig {
    /// Pull-through cache of `remote` listening on `port`
    pub fn proxy_for(remote: &str, port: u16, credentials: Option<&Credentials>) -> Self {
        let remoteurl = if remote.contains("://") {
            remote.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", remote.trim_end_matches('/'))
        };

        Self {
            version: "0.1".to_string(),
            log: LogSection {
                fields: BTreeMap::from([("service".to_string(), "registry".to_string())]),
            },
            storage: StorageSection {
                cache: BTreeMap::from([("blobdescriptor".to_string(), "inmemory".to_string())]),
                filesystem: FilesystemStorage {
                    rootdirectory: CONTAINER_STORAGE_DIR.to_string(),
                },
            },
            http: HttpSection {
                addr: format!(":{}", port),
                headers: BTreeMap::from([(
                    "X-Content-Type-Options".to_string(),
                    vec!["nosniff".to_string()],
                )]),
            },
            proxy: ProxySection {
                remoteurl,
                username: credentials.map(|c| c.username.clone()),
                password: credentials.map(|c| c.password.clone()),
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}
