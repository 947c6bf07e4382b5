//! Process-wide registry for caller-supplied HTTP clients.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::Error;

static REGISTRY: Lazy<RwLock<HashMap<String, reqwest::Client>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Associates a client to a key in the driver's registry.
///
/// Register your custom client, then refer to it by name in the DSN:
///
/// ```
/// use std::time::Duration;
///
/// let corp_client = reqwest::Client::builder()
///     .connect_timeout(Duration::from_secs(30))
///     .pool_idle_timeout(Duration::from_secs(90))
///     .build()
///     .unwrap();
/// presto_client::register_custom_client("corp", corp_client).unwrap();
///
/// let dsn = "https://user@localhost:8443?custom_client=corp";
/// ```
///
/// Keys that parse as booleans are reserved and rejected.
pub fn register_custom_client(key: &str, client: reqwest::Client) -> Result<(), Error> {
    if key.parse::<bool>().is_ok() {
        return Err(Error::Config(format!(
            "custom client key {:?} is reserved",
            key
        )));
    }
    REGISTRY.write().insert(key.to_string(), client);
    Ok(())
}

/// Removes the client associated to the key.
pub fn deregister_custom_client(key: &str) {
    REGISTRY.write().remove(key);
}

pub(crate) fn custom_client(key: &str) -> Option<reqwest::Client> {
    REGISTRY.read().get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_keys_are_reserved() {
        assert!(matches!(
            register_custom_client("true", reqwest::Client::new()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            register_custom_client("false", reqwest::Client::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_register_lookup_deregister() {
        register_custom_client("test-roundtrip", reqwest::Client::new()).unwrap();
        assert!(custom_client("test-roundtrip").is_some());

        deregister_custom_client("test-roundtrip");
        assert!(custom_client("test-roundtrip").is_none());
    }

    #[test]
    fn test_unregistered_key_is_absent() {
        assert!(custom_client("never-registered").is_none());
    }
}
