use serde::{Deserialize, Serialize};

/// Envelope carried on the backend-event relay channel. Deserialized
/// straight off the pub/sub message body; the relay performs no
/// validation beyond this shape, per the relay's "transparent to opaque
/// payloads" contract.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayEnvelope {
    pub event: String,
    pub user_id: Option<i64>,
    pub room_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: String,
    pub correlation_id: Option<String>,
}

/// The fixed set of relay event names the server is willing to forward to
/// clients. Keeping this as a tagged enumeration (rather than a config
/// list) makes extending the relay surface a deliberate code change:
/// unknown events fail `from_event_name` and are discarded with a warning
/// rather than relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayEventKind {
    BalanceUpdated,
    ProfileUpdated,
    GiftCatalogUpdated,
    ModerationSanctionIssued,
    ModerationSanctionLifted,
    SystemAnnouncement,
}

impl RelayEventKind {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "balance.updated" => Some(Self::BalanceUpdated),
            "profile.updated" => Some(Self::ProfileUpdated),
            "gift.catalog_updated" => Some(Self::GiftCatalogUpdated),
            "moderation.sanction_issued" => Some(Self::ModerationSanctionIssued),
            "moderation.sanction_lifted" => Some(Self::ModerationSanctionLifted),
            "system.announcement" => Some(Self::SystemAnnouncement),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_name_is_rejected() {
        assert_eq!(RelayEventKind::from_event_name("totally.unknown"), None);
    }

    #[test]
    fn known_event_name_is_accepted() {
        assert_eq!(
            RelayEventKind::from_event_name("balance.updated"),
            Some(RelayEventKind::BalanceUpdated)
        );
    }
}
