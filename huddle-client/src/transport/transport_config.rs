use huddle_core::IceServerConfig;
use huddle_core::utils::default_stun_urls;
use serde::{Deserialize, Serialize};

/// ICE configuration shared by every peer connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: default_stun_urls(),
                username: None,
                credential: None,
            }],
        }
    }
}
