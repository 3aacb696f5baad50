//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::error::TransportError;

type Result<T> = std::result::Result<T, TransportError>;

/// An authenticated SSH connection to one device.
pub struct SshTransport {
    session: Handle<SshHandler>,
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    ///
    /// The whole sequence (TCP connect, key exchange, authentication) is bounded
    /// by `config.connect_timeout`.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(config))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn establish(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {}", config.target());
        let mut session = client::connect(ssh_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(|e| {
                // Prefer the detailed host key error over russh's generic UnknownKey
                let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
                match (stored, e) {
                    (Some(hk_err), _) => hk_err,
                    (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                        host: config.host.clone(),
                        port: config.port,
                        source,
                    },
                    (None, other) => TransportError::Ssh(other),
                }
            })?;

        Self::authenticate(&mut session, &config).await?;
        debug!("authenticated to {} as '{}'", config.target(), config.username);

        Ok(Self { session, config })
    }

    /// Open a PTY shell channel on this connection.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        let channel = self.session.channel_open_session().await?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await?;

        channel.request_shell(true).await?;

        Ok(channel)
    }

    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session.best_supported_rsa_hash().await?.flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            });
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Verifies the server key against known_hosts per the configured mode.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Why the key was refused, read back by `establish` after the handshake fails.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn verify(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        if self.host_key_verification == HostKeyVerification::Disabled {
            return Ok(());
        }

        let known = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        match known {
            Ok(true) => Ok(()),
            Ok(false) if self.host_key_verification == HostKeyVerification::Strict => {
                Err(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
            Ok(false) => {
                use russh::keys::known_hosts::{learn_known_hosts, learn_known_hosts_path};
                let learned = match &self.known_hosts_path {
                    Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
                    None => learn_known_hosts(&self.host, self.port, key),
                };
                if let Err(e) = learned {
                    warn!("could not record host key for {}: {}", self.host, e);
                }
                Ok(())
            }
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("rejecting host key for {}:{}: {}", self.host, self.port, e);
                if let Ok(mut slot) = self.host_key_error.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}
