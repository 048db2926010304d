//! Extension pour intégrer stmplaylist dans stmconfig
//!
//! Ce module fournit le trait `PlaylistConfigExt` qui construit, à partir
//! de `stmconfig::Config`, les réglages de synchronisation et la passerelle
//! HTTP vers le serveur.
//!
//! # Exemple
//!
//! ```no_run
//! use stmconfig::Config;
//! use stmplaylist::PlaylistConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::in_memory()?;
//! let gateway = config.http_gateway()?;
//! println!("Server: {}", gateway.base_url());
//! # Ok(())
//! # }
//! ```

use crate::gateway::HttpGateway;
use crate::sync::SyncSettings;
use anyhow::Result;
use stmconfig::Config;
use std::time::Duration;

/// Trait d'extension pour la configuration des playlists
pub trait PlaylistConfigExt {
    /// Réglages de synchronisation (période de calme du titre)
    fn sync_settings(&self) -> Result<SyncSettings>;

    /// Passerelle HTTP vers `server_url`, avec timeout et nombre de reprises
    fn http_gateway(&self) -> Result<HttpGateway>;
}

impl PlaylistConfigExt for Config {
    fn sync_settings(&self) -> Result<SyncSettings> {
        Ok(SyncSettings {
            quiet_period: Duration::from_millis(self.get_title_debounce_ms()?),
        })
    }

    fn http_gateway(&self) -> Result<HttpGateway> {
        let timeout = Duration::from_secs(self.get_request_timeout_secs()?);
        let retries = u32::try_from(self.get_request_max_retries()?).unwrap_or(u32::MAX);

        tracing::debug!(
            server = %self.server_url(),
            timeout_secs = timeout.as_secs(),
            retries,
            "Building HTTP gateway"
        );
        Ok(HttpGateway::new(self.server_url())
            .with_timeout(timeout)
            .with_max_retries(retries))
    }
}
