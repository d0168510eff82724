//! mDNS `_hap._tcp` service advertisement.
//!
//! Republished (unregister, short delay, register) whenever `paired`
//! transitions, `config_version` changes, or the listening address
//! changes, grounded in the same stop-then-start pattern AirPlay's own
//! mdns-sd advertiser uses.

use std::collections::HashMap;

use base64::Engine;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use sha2::{Digest, Sha512};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::state::State;
use crate::Config;

const SERVICE_TYPE: &str = "_hap._tcp.local.";

/// A short pause between unregistering the old record and registering the
/// new one, so controllers reliably observe the change rather than racing
/// a stale cached entry.
const REPUBLISH_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

fn setup_hash(setup_id: &str, mac: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(setup_id.as_bytes());
    hasher.update(mac.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(&digest[..4])
}

fn txt_record(config: &Config, state: &State) -> HashMap<String, String> {
    let mut txt = HashMap::new();
    txt.insert("md".to_string(), config.accessory_name.clone());
    txt.insert("pv".to_string(), "1.1".to_string());
    txt.insert("id".to_string(), state.mac.clone());
    txt.insert("c#".to_string(), state.config_version().to_string());
    txt.insert("s#".to_string(), "1".to_string());
    txt.insert("ff".to_string(), "0".to_string());
    txt.insert("ci".to_string(), (u8::from(config.category)).to_string());
    txt.insert("sf".to_string(), if state.paired() { "0" } else { "1" }.to_string());
    txt.insert("sh".to_string(), setup_hash(&state.setup_id, &state.mac));
    txt
}

/// Owns the mDNS daemon connection and the currently-registered service
/// record, if any.
pub struct Advertiser {
    daemon: ServiceDaemon,
    name: String,
    registered: Mutex<Option<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MdnsError {
    #[error("failed to start mDNS daemon: {0}")]
    DaemonInit(String),
    #[error("failed to build service record: {0}")]
    ServiceInfo(String),
}

impl Advertiser {
    /// Starts the mDNS daemon without yet advertising; call [`Advertiser::republish`]
    /// once the driver is ready to accept connections.
    pub fn new(config: &Config, _state: &State) -> std::io::Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| std::io::Error::other(MdnsError::DaemonInit(e.to_string())))?;
        Ok(Self {
            daemon,
            name: config.accessory_name.clone(),
            registered: Mutex::new(None),
        })
    }

    fn build(&self, config: &Config, state: &State) -> Result<ServiceInfo, MdnsError> {
        let host = format!("{}.local.", config.accessory_name.replace(' ', "-"));
        // Empty string asks mdns-sd to resolve the advertised IP itself,
        // the same as the AirPlay advertiser does for its own service.
        ServiceInfo::new(
            SERVICE_TYPE,
            &self.name,
            &host,
            "",
            config.port,
            txt_record(config, state),
        )
        .map_err(|e| MdnsError::ServiceInfo(e.to_string()))
    }

    /// Registers the current `config`/`state` as the advertised record,
    /// unregistering any previous one first.
    pub async fn republish(&self, config: &Config, state: &State) {
        self.unregister().await;
        tokio::time::sleep(REPUBLISH_DELAY).await;

        let info = match self.build(config, state) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "failed to build mDNS service record");
                return;
            }
        };
        let fullname = info.get_fullname().to_string();
        if let Err(e) = self.daemon.register(info) {
            warn!(error = %e, "failed to register mDNS service");
            return;
        }
        *self.registered.lock().await = Some(fullname);
        info!(name = %self.name, "mDNS record published");
    }

    pub async fn unregister(&self) {
        if let Some(fullname) = self.registered.lock().await.take() {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!(error = %e, "failed to unregister mDNS service");
            }
        }
    }
}
