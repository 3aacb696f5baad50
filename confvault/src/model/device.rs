//! Device records consumed from the inventory.

use std::path::PathBuf;

use secrecy::SecretString;

/// Resolved login for a device. The secret never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub secret: SecretString,
    /// Private key to authenticate with instead of the password.
    pub key_path: Option<PathBuf>,
}

impl Credential {
    pub fn password(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: SecretString::from(secret.into()),
            key_path: None,
        }
    }
}

/// A network device targeted by a job.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Platform name used to pick the CLI driver (e.g. "cisco_iosxe").
    pub platform: String,
    pub credential: Credential,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        platform: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: 22,
            platform: platform.into(),
            credential,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` as shown in logs.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the identity fields a task needs before it can be submitted.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("device id is empty".to_string());
        }
        if self.host.trim().is_empty() {
            return Err("host is empty".to_string());
        }
        if self.port == 0 {
            return Err("port is 0".to_string());
        }
        if self.platform.trim().is_empty() {
            return Err("platform is empty".to_string());
        }
        if self.credential.username.trim().is_empty() {
            return Err("username is empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new("r1", "10.0.0.1", "cisco_iosxe", Credential::password("admin", "hunter2"))
    }

    #[test]
    fn test_valid_device() {
        assert!(device().validate().is_ok());
        assert_eq!(device().target(), "10.0.0.1:22");
    }

    #[test]
    fn test_missing_identity_fields() {
        let mut d = device();
        d.id = " ".into();
        assert!(d.validate().is_err());

        let mut d = device();
        d.host.clear();
        assert!(d.validate().is_err());

        let mut d = device();
        d.platform.clear();
        assert!(d.validate().is_err());

        let mut d = device();
        d.credential.username.clear();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_secret_not_in_debug() {
        let rendered = format!("{:?}", device());
        assert!(!rendered.contains("hunter2"));
    }
}
