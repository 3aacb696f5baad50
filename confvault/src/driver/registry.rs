//! Platform name to driver lookup table.

use std::sync::Arc;

use indexmap::IndexMap;

use super::CliDriver;
use super::ssh::{SshDriver, SshOptions};
use crate::error::PlatformError;
use crate::platform::vendors;

/// Drivers keyed by platform name, built once at startup and shared read-only.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: IndexMap<String, Arc<dyn CliDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            drivers: IndexMap::new(),
        }
    }

    /// Registry holding an SSH driver for every built-in platform.
    pub fn with_builtin(options: SshOptions) -> Result<Self, PlatformError> {
        let mut registry = Self::new();
        for platform in vendors::builtin() {
            registry.register(Arc::new(SshDriver::new(platform, options.clone())?))?;
        }
        Ok(registry)
    }

    /// Register a driver under its platform name.
    pub fn register(&mut self, driver: Arc<dyn CliDriver>) -> Result<(), PlatformError> {
        let name = driver.platform().to_string();
        if self.drivers.contains_key(&name) {
            return Err(PlatformError::AlreadyRegistered { name });
        }
        self.drivers.insert(name, driver);
        Ok(())
    }

    /// Register a driver, replacing any existing one for the same platform.
    pub fn replace(&mut self, driver: Arc<dyn CliDriver>) -> Option<Arc<dyn CliDriver>> {
        self.drivers.insert(driver.platform().to_string(), driver)
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn CliDriver>> {
        self.drivers.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.drivers.contains_key(platform)
    }

    /// Registered platform names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("platforms", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformDefinition;

    #[test]
    fn test_builtin_registry() {
        let registry = DriverRegistry::with_builtin(SshOptions::default()).unwrap();
        assert!(registry.contains("cisco_iosxe"));
        assert!(registry.contains("juniper_junos"));
        assert_eq!(registry.names().next(), Some("linux"));
        assert!(registry.get("unknown_os").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = DriverRegistry::with_builtin(SshOptions::default()).unwrap();
        let linux = SshDriver::new(vendors::linux::platform(), SshOptions::default()).unwrap();
        let err = registry.register(Arc::new(linux)).unwrap_err();
        assert!(matches!(err, PlatformError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_replace_custom_platform() {
        let mut registry = DriverRegistry::with_builtin(SshOptions::default()).unwrap();
        let before = registry.len();
        let custom = PlatformDefinition::new("linux")
            .with_prompt(r"\$\s*$")
            .with_command("running_config", "cat /etc/frr/frr.conf");
        let driver = SshDriver::new(custom, SshOptions::default()).unwrap();

        assert!(registry.replace(Arc::new(driver)).is_some());
        assert_eq!(registry.len(), before);
        let linux = registry.get("linux").unwrap();
        assert_eq!(
            linux
                .command_for(&crate::model::CommandIntent::RunningConfig)
                .as_deref(),
            Some("cat /etc/frr/frr.conf")
        );
    }
}
