//! Connection-string parsing and initialization options.
//!
//! The crate never opens network connections itself; a driver adapter
//! consumes the parsed [`ConnectionConfig`]. Options passed at init time are
//! filtered against a fixed allow-list so unrecognized keys never leak into
//! a driver.

use serde_json::{Map, Value};

use crate::core::errors::*;

/// Keys recognized in an init-time options document. Everything else is
/// dropped by [`clean_options`].
pub const ALLOWED_OPTION_KEYS: [&str; 7] =
    ["db", "server", "replset", "user", "pass", "auth", "mongos"];

/// Filters an options document down to the recognized keys. A non-document
/// value yields an empty options set.
pub fn clean_options(options: &Value) -> Value {
    let Value::Object(map) = options else {
        return Value::Object(Map::new());
    };

    let mut clean = Map::new();
    for key in ALLOWED_OPTION_KEYS {
        if let Some(value) = map.get(key) {
            clean.insert(key.to_string(), value.clone());
        }
    }

    Value::Object(clean)
}

/// A parsed connection string:
/// `scheme://[user[:pass]@]host[,host...]/[database][?key=value&...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub scheme: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub hosts: Vec<String>,
    pub database: Option<String>,
    pub params: Vec<(String, String)>,
}

impl ConnectionConfig {
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| Error::InvalidConnectionString("missing scheme".to_string()))?;
        if scheme.is_empty() {
            return Err(Error::InvalidConnectionString("missing scheme".to_string()));
        }

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };

        let (credentials, host_part) = match authority.rsplit_once('@') {
            Some((creds, hosts)) => (Some(creds), hosts),
            None => (None, authority),
        };

        let (user, pass) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(creds.to_string()), None),
            },
            None => (None, None),
        };

        let hosts: Vec<String> = host_part
            .split(',')
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(Error::InvalidConnectionString("no hosts".to_string()));
        }

        let (database, query) = match path {
            None => (None, None),
            Some(path) => match path.split_once('?') {
                Some((db, query)) => (non_empty(db), Some(query)),
                None => (non_empty(path), None),
            },
        };

        let mut params = Vec::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    Error::InvalidConnectionString(format!("malformed parameter '{}'", pair))
                })?;
                params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(ConnectionConfig {
            scheme: scheme.to_string(),
            user,
            pass,
            hosts,
            database,
            params,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_options_filters_unknown_keys() {
        let options = json!({
            "user": "max",
            "pass": "payne",
            "poolSize": 20,
            "evil": {"$where": "1"}
        });

        assert_eq!(clean_options(&options), json!({"user": "max", "pass": "payne"}));
        assert_eq!(clean_options(&json!("nope")), json!({}));
    }

    #[test]
    fn test_parse_full_connection_string() {
        let config =
            ConnectionConfig::parse("mongodb://max:payne@h1:27017,h2:27018/app?replicaSet=rs0&ssl=true")
                .unwrap();

        assert_eq!(config.scheme, "mongodb");
        assert_eq!(config.user.as_deref(), Some("max"));
        assert_eq!(config.pass.as_deref(), Some("payne"));
        assert_eq!(config.hosts, vec!["h1:27017", "h2:27018"]);
        assert_eq!(config.database.as_deref(), Some("app"));
        assert_eq!(
            config.params,
            vec![
                ("replicaSet".to_string(), "rs0".to_string()),
                ("ssl".to_string(), "true".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_minimal_connection_string() {
        let config = ConnectionConfig::parse("mongodb://localhost:27017").unwrap();

        assert_eq!(config.hosts, vec!["localhost:27017"]);
        assert!(config.user.is_none());
        assert!(config.database.is_none());
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_strings() {
        assert!(ConnectionConfig::parse("localhost:27017").is_err());
        assert!(ConnectionConfig::parse("://host/db").is_err());
        assert!(ConnectionConfig::parse("mongodb:///db").is_err());
        assert!(ConnectionConfig::parse("mongodb://host/db?broken").is_err());
    }
}
