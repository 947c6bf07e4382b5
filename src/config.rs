//! Connection configuration and DSN formatting.

use std::collections::HashMap;

use url::Url;

use crate::error::Error;

pub(crate) const DEFAULT_SOURCE: &str = "presto-go-client";

pub(crate) const KERBEROS_ENABLED_CONFIG: &str = "KerberosEnabled";
pub(crate) const KERBEROS_KEYTAB_PATH_CONFIG: &str = "KerberosKeytabPath";
pub(crate) const KERBEROS_PRINCIPAL_CONFIG: &str = "KerberosPrincipal";
pub(crate) const KERBEROS_REALM_CONFIG: &str = "KerberosRealm";
pub(crate) const KERBEROS_CONFIG_PATH_CONFIG: &str = "KerberosConfigPath";
pub(crate) const SSL_CERT_PATH_CONFIG: &str = "SSLCertPath";
pub(crate) const SSL_CERT_CONFIG: &str = "SSLCert";

/// A configuration that can be encoded to a DSN string.
///
/// The DSN is a URL of the form
/// `scheme://[user[:password]@]host[:port]?key=value&…` with `http` or
/// `https` as the scheme.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// URI of the Presto coordinator, e.g. `http://user@localhost:8080`.
    pub server_uri: String,
    /// Source of the connection (optional).
    pub source: Option<String>,
    /// Initial catalog (optional).
    pub catalog: Option<String>,
    /// Initial schema (optional).
    pub schema: Option<String>,
    /// Session properties (optional).
    pub session_properties: HashMap<String, String>,
    /// Extra credentials (optional).
    pub extra_credentials: HashMap<String, String>,
    /// Name of a client registered with
    /// [`register_custom_client`](crate::register_custom_client) (optional).
    pub custom_client_name: Option<String>,
    /// Whether to authenticate with Kerberos via SPNEGO.
    pub kerberos_enabled: bool,
    /// Kerberos keytab path (optional).
    pub kerberos_keytab_path: Option<String>,
    /// Kerberos principal used to authenticate to the KDC (optional).
    pub kerberos_principal: Option<String>,
    /// The Kerberos realm (optional).
    pub kerberos_realm: Option<String>,
    /// The krb5 config path (optional).
    pub kerberos_config_path: Option<String>,
    /// Path of a root CA certificate for TLS verification (optional).
    pub ssl_cert_path: Option<String>,
    /// Inline PEM root CA certificate for TLS verification (optional).
    pub ssl_cert: Option<String>,
}

impl Config {
    /// Returns a DSN string from the configuration.
    pub fn format_dsn(&self) -> Result<String, Error> {
        let mut server_url = Url::parse(&self.server_uri)
            .map_err(|e| Error::Config(format!("malformed server URI: {}", e)))?;
        let is_ssl = server_url.scheme() == "https";

        let custom_client = self.custom_client_name.as_deref().unwrap_or("");
        let ssl_cert_path = self.ssl_cert_path.as_deref().unwrap_or("");
        let ssl_cert = self.ssl_cert.as_deref().unwrap_or("");

        if !custom_client.is_empty() && (!ssl_cert.is_empty() || !ssl_cert_path.is_empty()) {
            return Err(Error::Config(
                "a custom client cannot be specified together with a custom SSL certificate"
                    .to_string(),
            ));
        }

        let mut query: Vec<(String, String)> = Vec::new();
        query.push((
            "source".to_string(),
            self.source
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        ));

        if !ssl_cert_path.is_empty() {
            if !is_ssl {
                return Err(Error::Config(
                    "SSL must be enabled to specify a custom SSL certificate file".to_string(),
                ));
            }
            if !ssl_cert.is_empty() {
                return Err(Error::Config(
                    "a custom SSL certificate file cannot be specified together with a \
                     certificate string"
                        .to_string(),
                ));
            }
            query.push((SSL_CERT_PATH_CONFIG.to_string(), ssl_cert_path.to_string()));
        }

        if !ssl_cert.is_empty() {
            if !is_ssl {
                return Err(Error::Config(
                    "SSL must be enabled to specify a custom SSL certificate".to_string(),
                ));
            }
            query.push((SSL_CERT_CONFIG.to_string(), ssl_cert.to_string()));
        }

        if self.kerberos_enabled {
            if !is_ssl {
                return Err(Error::Config(
                    "SSL must be enabled for a secure environment".to_string(),
                ));
            }
            query.push((KERBEROS_ENABLED_CONFIG.to_string(), "true".to_string()));
            for (key, value) in [
                (KERBEROS_KEYTAB_PATH_CONFIG, &self.kerberos_keytab_path),
                (KERBEROS_PRINCIPAL_CONFIG, &self.kerberos_principal),
                (KERBEROS_REALM_CONFIG, &self.kerberos_realm),
                (KERBEROS_CONFIG_PATH_CONFIG, &self.kerberos_config_path),
            ] {
                query.push((key.to_string(), value.clone().unwrap_or_default()));
            }
        }

        let session_properties = join_sorted(&self.session_properties);
        let extra_credentials = join_sorted(&self.extra_credentials);
        for (key, value) in [
            ("catalog", self.catalog.as_deref().unwrap_or("")),
            ("schema", self.schema.as_deref().unwrap_or("")),
            ("session_properties", session_properties.as_str()),
            ("extra_credentials", extra_credentials.as_str()),
            ("custom_client", custom_client),
        ] {
            if !value.is_empty() {
                query.push((key.to_string(), value.to_string()));
            }
        }

        // Sort for a stable DSN regardless of insertion order.
        query.sort();
        server_url
            .query_pairs_mut()
            .clear()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        Ok(server_url.to_string())
    }
}

/// Joins a property map as a comma-separated `k=v` list, sorted for
/// stability.
fn join_sorted(properties: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    pairs.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_is_applied() {
        let config = Config {
            server_uri: "http://user@localhost:8080".to_string(),
            ..Default::default()
        };
        let dsn = config.format_dsn().unwrap();

        assert!(dsn.contains("source=presto-go-client"), "dsn: {}", dsn);
    }

    #[test]
    fn test_session_properties_are_sorted() {
        let mut session_properties = HashMap::new();
        session_properties.insert("query_priority".to_string(), "1".to_string());
        session_properties.insert("distributed_join".to_string(), "true".to_string());
        let config = Config {
            server_uri: "http://user@localhost:8080".to_string(),
            session_properties,
            ..Default::default()
        };
        let dsn = config.format_dsn().unwrap();

        assert!(
            dsn.contains("session_properties=distributed_join%3Dtrue%2Cquery_priority%3D1"),
            "dsn: {}",
            dsn
        );
    }

    #[test]
    fn test_catalog_and_schema_appear() {
        let config = Config {
            server_uri: "http://user@localhost:8080".to_string(),
            catalog: Some("tpch".to_string()),
            schema: Some("sf1".to_string()),
            ..Default::default()
        };
        let dsn = config.format_dsn().unwrap();

        assert!(dsn.contains("catalog=tpch"));
        assert!(dsn.contains("schema=sf1"));
    }

    #[test]
    fn test_custom_client_conflicts_with_cert() {
        let config = Config {
            server_uri: "https://user@localhost:8443".to_string(),
            custom_client_name: Some("corp".to_string()),
            ssl_cert: Some("PEM".to_string()),
            ..Default::default()
        };

        assert!(matches!(config.format_dsn(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cert_requires_https() {
        let config = Config {
            server_uri: "http://user@localhost:8080".to_string(),
            ssl_cert_path: Some("/etc/ca.pem".to_string()),
            ..Default::default()
        };

        assert!(matches!(config.format_dsn(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cert_forms_are_mutually_exclusive() {
        let config = Config {
            server_uri: "https://user@localhost:8443".to_string(),
            ssl_cert_path: Some("/etc/ca.pem".to_string()),
            ssl_cert: Some("PEM".to_string()),
            ..Default::default()
        };

        assert!(matches!(config.format_dsn(), Err(Error::Config(_))));
    }

    #[test]
    fn test_kerberos_requires_https() {
        let config = Config {
            server_uri: "http://user@localhost:8080".to_string(),
            kerberos_enabled: true,
            ..Default::default()
        };

        assert!(matches!(config.format_dsn(), Err(Error::Config(_))));
    }

    #[test]
    fn test_kerberos_params_are_encoded() {
        let config = Config {
            server_uri: "https://user@localhost:8443".to_string(),
            kerberos_enabled: true,
            kerberos_principal: Some("alice".to_string()),
            kerberos_realm: Some("EXAMPLE.COM".to_string()),
            ..Default::default()
        };
        let dsn = config.format_dsn().unwrap();

        assert!(dsn.contains("KerberosEnabled=true"));
        assert!(dsn.contains("KerberosPrincipal=alice"));
        assert!(dsn.contains("KerberosRealm=EXAMPLE.COM"));
    }
}
