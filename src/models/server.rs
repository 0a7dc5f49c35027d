// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Map name reported for a server that could not be probed.
pub const OFFLINE_MAP: &str = "Offline";

/// Player count reported for a server that could not be probed.
pub const OFFLINE_PLAYERS: i32 = -1;

/// Grouping tag for endpoints (Drift, Touge, Track, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub category: Category,
}

impl EndpointDescriptor {
    pub fn info_url(&self) -> String {
        format!("http://{}:{}/info", self.address, self.port)
    }
}

/// Live state of one endpoint for a single cycle.
///
/// `player_count` is [`OFFLINE_PLAYERS`] exactly when the probe failed; every
/// reachable server reports a count of zero or more.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub descriptor: Arc<EndpointDescriptor>,
    pub map_name: String,
    pub player_count: i32,
    pub max_players: u32,
}

impl ServerStatus {
    pub fn online(
        descriptor: Arc<EndpointDescriptor>,
        map_name: String,
        player_count: u32,
        max_players: u32,
    ) -> Self {
        Self {
            descriptor,
            map_name,
            player_count: i32::try_from(player_count).unwrap_or(i32::MAX),
            max_players,
        }
    }

    pub fn offline(descriptor: Arc<EndpointDescriptor>) -> Self {
        Self {
            descriptor,
            map_name: OFFLINE_MAP.to_string(),
            player_count: OFFLINE_PLAYERS,
            max_players: 0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.player_count >= 0
    }

    /// Players that count towards category and grand totals.
    pub fn counted_players(&self) -> u32 {
        if self.player_count > 0 {
            self.player_count as u32
        } else {
            0
        }
    }

    pub fn player_ratio(&self) -> String {
        if self.is_online() {
            format!("{}/{}", self.player_count, self.max_players)
        } else {
            "0/0".to_string()
        }
    }
}
