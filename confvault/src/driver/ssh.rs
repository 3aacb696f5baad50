//! SSH driver that works with any platform definition.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use regex::bytes::Regex;

use super::response::Response;
use super::{CliDriver, CliSession, SessionTimeouts};
use crate::channel::PtyChannel;
use crate::config::SshSettings;
use crate::error::{DeviceError, PlatformError};
use crate::model::{CommandIntent, Device};
use crate::platform::PlatformDefinition;
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig, SshTransport};

/// SSH options shared by all platforms.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
    pub search_depth: usize,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            search_depth: 1000,
        }
    }
}

impl From<&SshSettings> for SshOptions {
    fn from(settings: &SshSettings) -> Self {
        Self {
            host_key_verification: settings.host_key_verification.clone(),
            known_hosts_path: settings.known_hosts_path.clone(),
            search_depth: settings.search_depth,
        }
    }
}

/// Prompt-driven SSH driver for one platform.
pub struct SshDriver {
    platform: Arc<PlatformDefinition>,
    prompt_pattern: Regex,
    options: SshOptions,
}

impl SshDriver {
    pub fn new(platform: PlatformDefinition, options: SshOptions) -> Result<Self, PlatformError> {
        let prompt_pattern = platform.prompt_pattern()?;
        Ok(Self {
            platform: Arc::new(platform),
            prompt_pattern,
            options,
        })
    }

    fn ssh_config(&self, device: &Device, connect_timeout: Duration) -> SshConfig {
        let credential = &device.credential;
        let auth = match &credential.key_path {
            Some(path) => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: None,
            },
            None => AuthMethod::Password(credential.secret.clone()),
        };

        SshConfig {
            host: device.host.clone(),
            port: device.port,
            username: credential.username.clone(),
            auth,
            connect_timeout,
            terminal_width: self.platform.terminal_width,
            terminal_height: self.platform.terminal_height,
            host_key_verification: self.options.host_key_verification.clone(),
            known_hosts_path: self.options.known_hosts_path.clone(),
        }
    }
}

#[async_trait]
impl CliDriver for SshDriver {
    fn platform(&self) -> &str {
        &self.platform.name
    }

    fn command_for(&self, intent: &CommandIntent) -> Option<String> {
        self.platform.command_for(intent)
    }

    async fn connect(
        &self,
        device: &Device,
        timeouts: SessionTimeouts,
    ) -> Result<Box<dyn CliSession>, DeviceError> {
        let target = device.target();
        let username = device.credential.username.clone();

        let transport = SshTransport::connect(self.ssh_config(device, timeouts.connect))
            .await
            .map_err(|e| e.classify(&target, &username))?;

        let channel = match transport.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e.classify(&target, &username));
            }
        };

        let mut session = SshSession {
            transport,
            channel: PtyChannel::new(channel, self.options.search_depth),
            platform: self.platform.clone(),
            prompt_pattern: self.prompt_pattern.clone(),
            target,
            command_timeout: timeouts.command,
        };

        if let Err(e) = session.prepare(timeouts.connect).await {
            Box::new(session).disconnect().await;
            return Err(e);
        }

        debug!("{}: session ready on {}", self.platform.name, session.target);
        Ok(Box::new(session))
    }
}

/// Open SSH shell session on one device.
pub struct SshSession {
    transport: SshTransport,
    channel: PtyChannel,
    platform: Arc<PlatformDefinition>,
    prompt_pattern: Regex,
    target: String,
    command_timeout: Duration,
}

impl SshSession {
    /// Wait for the login prompt, then run the platform's on-open commands.
    async fn prepare(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        self.channel
            .read_until(&self.prompt_pattern, timeout)
            .await
            .map_err(|e| e.classify(&self.target))?;

        let platform = self.platform.clone();
        for command in &platform.on_open_commands {
            self.run(command).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CliSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<Response, DeviceError> {
        let start = Instant::now();

        self.channel
            .send(command)
            .await
            .map_err(|e| e.classify(&self.target))?;

        let data = self
            .channel
            .read_until(&self.prompt_pattern, self.command_timeout)
            .await
            .map_err(|e| e.classify(&self.target))?;

        let raw = String::from_utf8_lossy(&data);
        let prompt = raw
            .trim_end()
            .rsplit('\n')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let result = self.platform.normalize_output(&raw, command);

        if let Some(pattern) = self.platform.detect_failure(&result) {
            return Err(DeviceError::command(format!(
                "'{}' rejected by {}: output contains '{}'",
                command, self.target, pattern
            )));
        }

        Ok(Response::new(command, result, prompt, start.elapsed()))
    }

    async fn disconnect(self: Box<Self>) {
        let SshSession {
            transport,
            mut channel,
            platform,
            target,
            ..
        } = *self;

        for command in &platform.on_close_commands {
            if let Err(e) = channel.send(command).await {
                debug!("{}: on-close command '{}' failed: {}", target, command, e);
                break;
            }
        }
        channel.clear();

        if let Err(e) = channel.close().await {
            debug!("{}: channel close failed: {}", target, e);
        }
        if let Err(e) = transport.close().await {
            warn!("{}: disconnect failed: {}", target, e);
        }
    }
}
