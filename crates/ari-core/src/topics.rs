//! Topic naming

/// Prefix of the topic commands are published on
pub const COMMANDS_PREFIX: &str = "commands";
/// Prefix of the topic command responses arrive on
pub const RESPONSES_PREFIX: &str = "responses";
/// Prefix of the topic dialog events arrive on
pub const EVENTS_PREFIX: &str = "events";

/// Shared topic carrying dialog start signals when none is configured
pub const DEFAULT_START_TOPIC: &str = "ari_start";

/// The three topics owned by one dialog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogTopics {
    pub commands: String,
    pub responses: String,
    pub events: String,
}

impl DialogTopics {
    /// Derive the topics for `dialog_id`. Pure: same id, same names.
    pub fn derive(dialog_id: &str) -> Self {
        Self {
            commands: topic_name(COMMANDS_PREFIX, dialog_id),
            responses: topic_name(RESPONSES_PREFIX, dialog_id),
            events: topic_name(EVENTS_PREFIX, dialog_id),
        }
    }
}

/// `<kind>_<dialog_id>`
pub fn topic_name(kind: &str, dialog_id: &str) -> String {
    [kind, dialog_id].join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_topics() {
        let topics = DialogTopics::derive("abc-123");
        assert_eq!(topics.commands, "commands_abc-123");
        assert_eq!(topics.responses, "responses_abc-123");
        assert_eq!(topics.events, "events_abc-123");
    }
}
