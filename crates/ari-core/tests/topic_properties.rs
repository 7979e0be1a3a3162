//! Property tests for topic derivation and the command wire format

use std::collections::HashSet;

use proptest::prelude::*;

use ariproxy_ari_core::{Command, DialogTopics};

proptest! {
    #[test]
    fn derivation_is_deterministic(dialog_id in "[A-Za-z0-9-]{1,40}") {
        prop_assert_eq!(DialogTopics::derive(&dialog_id), DialogTopics::derive(&dialog_id));
    }

    #[test]
    fn distinct_dialogs_never_share_topics(
        a in "[A-Za-z0-9-]{1,40}",
        b in "[A-Za-z0-9-]{1,40}",
    ) {
        prop_assume!(a != b);
        let first = DialogTopics::derive(&a);
        let second = DialogTopics::derive(&b);

        let names: HashSet<&str> = [
            first.commands.as_str(),
            first.responses.as_str(),
            first.events.as_str(),
            second.commands.as_str(),
            second.responses.as_str(),
            second.events.as_str(),
        ]
        .into_iter()
        .collect();
        prop_assert_eq!(names.len(), 6);
    }

    #[test]
    fn command_survives_the_wire(
        unique_id in "[a-f0-9-]{0,36}",
        url in "/[a-z/]{0,30}",
        method in "(GET|POST|PUT|DELETE)",
        body in ".{0,64}",
    ) {
        let command = Command { unique_id, url, method, body };
        let decoded = Command::decode(&command.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, command);
    }
}
