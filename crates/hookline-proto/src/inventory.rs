//! Per-broker channel inventory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The channel inventory one broker publishes on `/internal/channels`.
///
/// `ws_channels` lists every channel owned by the broker (minted and
/// attached); `webhook_channels` is the subset with a live tunnel, i.e.
/// the channels that can serve webhooks right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInventory {
    /// Callable address of the broker, e.g. `http://10.0.3.7:8080`.
    pub server_url: String,
    #[serde(default)]
    pub ws_channels: BTreeSet<String>,
    #[serde(default)]
    pub webhook_channels: BTreeSet<String>,
}

impl ChannelInventory {
    /// Creates an empty inventory for the given broker address.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ws_channels: BTreeSet::new(),
            webhook_channels: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_snake_case_keys() {
        let mut inv = ChannelInventory::new("http://10.0.0.1:8080");
        inv.ws_channels.insert("c1".into());
        inv.webhook_channels.insert("c1".into());

        let value = serde_json::to_value(&inv).unwrap();
        assert_eq!(value["server_url"], "http://10.0.0.1:8080");
        assert_eq!(value["ws_channels"], serde_json::json!(["c1"]));
        assert_eq!(value["webhook_channels"], serde_json::json!(["c1"]));
    }

    #[test]
    fn missing_channel_lists_default_to_empty() {
        let inv: ChannelInventory =
            serde_json::from_str(r#"{"server_url":"http://x:1"}"#).unwrap();
        assert!(inv.ws_channels.is_empty());
        assert!(inv.webhook_channels.is_empty());
    }
}
