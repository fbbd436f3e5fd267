use serde::Deserialize;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

/// Connection settings for one database, as supplied by the host binding.
///
/// `endpoints` may name several coordinators of the same deployment; requests
/// are spread across them and fail over to a healthy sibling on connection
/// errors.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub jwt_token: Option<String>,
    /// PEM bundle overriding the trusted TLS roots.
    #[serde(default)]
    pub tls_cert: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl DatabaseConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            username: None,
            password: None,
            jwt_token: None,
            tls_cert: None,
            request_timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_jwt(mut self, token: impl Into<String>) -> Self {
        self.jwt_token = Some(token.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_host_binding_options() {
        let config: DatabaseConfig = serde_json::from_value(serde_json::json!({
            "endpoints": ["http://localhost:8529"],
            "username": "root",
            "password": "test",
        }))
        .unwrap();

        assert_eq!(config.endpoints, vec!["http://localhost:8529"]);
        assert_eq!(config.username.as_deref(), Some("root"));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn rejects_unknown_options() {
        let result: Result<DatabaseConfig, _> = serde_json::from_value(serde_json::json!({
            "endpoints": [],
            "verify": true,
        }));
        assert!(result.is_err());
    }
}
