use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::Blake2bHash;

/// Wire protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 2;

// Service bits advertised in VERSION / carried in peer addresses.
pub const SERVICE_NANO: u32 = 1;
pub const SERVICE_LIGHT: u32 = 2;
pub const SERVICE_FULL: u32 = 4;

/// Header hash of the main-network genesis block.
pub const GENESIS_HASH: Blake2bHash = [
    0x26, 0x4a, 0xaf, 0x8a, 0x4f, 0x96, 0x28, 0x28, 0xdb, 0x4d, 0x9c, 0x71, 0x7a, 0xc8, 0xb0,
    0x49, 0x1e, 0xc0, 0xab, 0x27, 0x36, 0xe8, 0x6c, 0x3b, 0x6a, 0x5a, 0x73, 0x8a, 0x6e, 0x13,
    0x77, 0x23,
];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PeerSetting {
    pub host: [u8; 4],
    pub port: u16,
}

/// Immutable network configuration, injected into whatever constructs
/// channels. There is deliberately no global instance of this.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub protocol_version: u32,
    pub services: u32,
    pub genesis_hash: Blake2bHash,
    pub peers: Vec<PeerSetting>,
}

impl Default for NetworkConfig {
    fn default() -> NetworkConfig {
        NetworkConfig {
            protocol_version: PROTOCOL_VERSION,
            services: SERVICE_FULL,
            genesis_hash: GENESIS_HASH,
            peers: vec![],
        }
    }
}

impl NetworkConfig {
    /// Build a config from loaded settings. Missing keys fall back to the
    /// main-network defaults; a malformed genesis hash is rejected rather
    /// than silently joining the wrong network.
    pub fn from_settings(settings: &config::Config) -> NetworkConfig {
        let mut network_config = NetworkConfig::default();

        if let Ok(services) = settings.get::<u32>("network.services") {
            network_config.services = services;
        }
        if let Ok(peers) = settings.get::<Vec<PeerSetting>>("network.peers") {
            network_config.peers = peers;
        }
        match settings.get::<String>("network.genesis_hash") {
            Ok(hex_hash) => {
                let mut genesis_hash: Blake2bHash = [0; 32];
                match hex::decode_to_slice(&hex_hash, &mut genesis_hash as &mut [u8]) {
                    Ok(()) => network_config.genesis_hash = genesis_hash,
                    Err(err) => {
                        warn!("ignoring malformed network.genesis_hash: {}", err);
                    }
                }
            }
            Err(_) => {}
        }

        network_config
    }
}
