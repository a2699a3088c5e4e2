//! Kafka/ClickHouse wire-level configuration structs and the read-only
//! config store abstraction components use to fetch their own
//! sub-configuration. The pipeline/schema store itself (Postgres-backed in
//! a full deployment) is an external collaborator; this crate only defines
//! the read-only seam components call through.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::duration::GoDuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-CASE")]
pub enum SaslMechanism {
    Plain,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512")]
    ScramSha512,
    #[serde(rename = "GSSAPI")]
    GssApi,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KerberosConfig {
    pub principal: String,
    pub keytab_path: String,
    pub realm: String,
    pub krb5_config_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub ca_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaAuthConfig {
    pub security_protocol: SecurityProtocol,
    pub sasl_mechanism: Option<SaslMechanism>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub kerberos: Option<KerberosConfig>,
    pub tls: Option<TlsConfig>,
}

impl Default for KafkaAuthConfig {
    fn default() -> Self {
        Self {
            security_protocol: SecurityProtocol::Plaintext,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            kerberos: None,
            tls: None,
        }
    }
}

impl KafkaAuthConfig {
    /// Translates this config into the `rdkafka::ClientConfig` key/value
    /// pairs librdkafka expects (`security.protocol`, `sasl.mechanism`,
    /// `sasl.username`/`sasl.password`, `sasl.kerberos.*`, `ssl.*`).
    pub fn as_client_config_entries(&self) -> HashMap<String, String> {
        let mut entries = HashMap::new();
        let protocol = match self.security_protocol {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        };
        entries.insert("security.protocol".to_string(), protocol.to_string());

        if let Some(mechanism) = self.sasl_mechanism {
            let mechanism_str = match mechanism {
                SaslMechanism::Plain => "PLAIN",
                SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
                SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
                SaslMechanism::GssApi => "GSSAPI",
            };
            entries.insert("sasl.mechanism".to_string(), mechanism_str.to_string());
        }
        if let Some(u) = &self.sasl_username {
            entries.insert("sasl.username".to_string(), u.clone());
        }
        if let Some(p) = &self.sasl_password {
            entries.insert("sasl.password".to_string(), p.clone());
        }
        if let Some(krb) = &self.kerberos {
            entries.insert("sasl.kerberos.principal".to_string(), krb.principal.clone());
            entries.insert("sasl.kerberos.keytab".to_string(), krb.keytab_path.clone());
            entries.insert("sasl.kerberos.service.name".to_string(), "kafka".to_string());
            // realm/krb5 config are applied via the process environment
            // (KRB5_CONFIG) rather than a librdkafka client-config key.
            let _ = &krb.realm;
            let _ = &krb.krb5_config_path;
        }
        if let Some(tls) = &self.tls {
            if let Some(ca) = &tls.ca_path {
                entries.insert("ssl.ca.location".to_string(), ca.clone());
            }
            if let Some(cert) = &tls.client_cert_path {
                entries.insert("ssl.certificate.location".to_string(), cert.clone());
            }
            if let Some(key) = &tls.client_key_path {
                entries.insert("ssl.key.location".to_string(), key.clone());
            }
        }
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialOffset {
    Earliest,
    Latest,
}

impl Default for InitialOffset {
    fn default() -> Self {
        InitialOffset::Earliest
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConsumerConfig {
    pub brokers: String,
    pub topic: String,
    #[serde(default)]
    pub auth: KafkaAuthConfig,
    #[serde(default)]
    pub initial_offset: InitialOffset,
    pub poll_timeout: GoDuration,
    pub fetch_max_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConnConfig {
    pub host: String,
    pub native_port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub skip_cert_check: bool,
    #[serde(default)]
    pub async_insert_wait: bool,
}

/// Read-only access to a component's own sub-configuration, keyed by
/// pipeline id and component source id. Backed by Postgres in a full
/// deployment; this crate ships a file-backed implementation for tests and
/// the demo CLI role.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_raw(&self, pipeline_id: &str, source_id: &str) -> anyhow::Result<serde_json::Value>;
}

/// Fetches and deserializes one component's sub-configuration. A free
/// function rather than a generic trait method so `ConfigStore` stays
/// object-safe (`Arc<dyn ConfigStore>` is how components receive it).
pub async fn get_config<T: serde::de::DeserializeOwned>(
    store: &(dyn ConfigStore),
    pipeline_id: &str,
    source_id: &str,
) -> anyhow::Result<T> {
    let raw = store.get_raw(pipeline_id, source_id).await?;
    Ok(serde_json::from_value(raw)?)
}

/// YAML-file-backed `ConfigStore`, keyed `"<pipeline_id>/<source_id>"`.
/// Intended for local development, the `demo` CLI role, and tests — not a
/// substitute for the pipeline store's real Postgres backing.
pub struct FileConfigStore {
    entries: HashMap<String, serde_json::Value>,
}

impl FileConfigStore {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let entries: HashMap<String, serde_json::Value> = serde_yaml::from_str(yaml)?;
        Ok(Self { entries })
    }

    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    fn key(pipeline_id: &str, source_id: &str) -> String {
        format!("{}/{}", pipeline_id, source_id)
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get_raw(&self, pipeline_id: &str, source_id: &str) -> anyhow::Result<serde_json::Value> {
        let key = Self::key(pipeline_id, source_id);
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no config for {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_maps_sasl_ssl_scram_to_client_config_entries() {
        let auth = KafkaAuthConfig {
            security_protocol: SecurityProtocol::SaslSsl,
            sasl_mechanism: Some(SaslMechanism::ScramSha512),
            sasl_username: Some("user".to_string()),
            sasl_password: Some("pass".to_string()),
            kerberos: None,
            tls: Some(TlsConfig {
                ca_path: Some("/etc/ca.pem".to_string()),
                ..Default::default()
            }),
        };
        let entries = auth.as_client_config_entries();
        assert_eq!(entries.get("security.protocol").unwrap(), "sasl_ssl");
        assert_eq!(entries.get("sasl.mechanism").unwrap(), "SCRAM-SHA-512");
        assert_eq!(entries.get("sasl.username").unwrap(), "user");
        assert_eq!(entries.get("ssl.ca.location").unwrap(), "/etc/ca.pem");
    }

    #[tokio::test]
    async fn file_config_store_looks_up_by_pipeline_and_source_id() {
        let yaml = r#"
"p1/orders-source":
  brokers: "localhost:9092"
  topic: "orders.v1"
  poll_timeout: 1.0
  fetch_max_messages: 500
"#;
        let store = FileConfigStore::from_yaml_str(yaml).unwrap();
        let cfg: KafkaConsumerConfig = get_config(&store, "p1", "orders-source").await.unwrap();
        assert_eq!(cfg.topic, "orders.v1");
        assert_eq!(cfg.fetch_max_messages, 500);
    }
}
