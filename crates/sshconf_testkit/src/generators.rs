//! Property-based test generators using proptest.

use proptest::prelude::*;
use sshconf_core::{Host, Model, RecordId, Tag};
use uuid::Uuid;

/// Strategy for generating record labels.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating IPv4 addresses.
pub fn address_strategy() -> impl Strategy<Value = String> {
    (1u8..=254, any::<u8>(), any::<u8>(), 1u8..=254)
        .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}"))
}

/// Strategy for generating SSH ports.
pub fn port_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![Just(22u16), 1024u16..=65535]
}

/// Strategy for generating record ids from both id spaces.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop_oneof![
        (1u64..1_000_000).prop_map(RecordId::Remote),
        any::<u128>().prop_map(|bits| RecordId::Local(Uuid::from_u128(bits))),
    ]
}

/// Strategy for generating unsaved hosts with an optional port.
pub fn host_strategy() -> impl Strategy<Value = Host> {
    (label_strategy(), address_strategy(), prop::option::of(port_strategy())).prop_map(
        |(label, address, port)| {
            let mut host = Host::new(&label, &address);
            if let Some(port) = port {
                host.set("port", port);
            }
            host
        },
    )
}

/// Strategy for generating unsaved tags.
pub fn tag_strategy() -> impl Strategy<Value = Tag> {
    label_strategy().prop_map(|label| Tag::new(&label))
}

/// Strategy for generating a batch of unsaved hosts.
pub fn hosts_strategy(max: usize) -> impl Strategy<Value = Vec<Host>> {
    prop::collection::vec(host_strategy(), 0..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn hosts_have_label_and_address(host in host_strategy()) {
            prop_assert!(host.label().is_some());
            prop_assert!(host.address().is_some());
            prop_assert!(host.record().id().is_none());
        }

        #[test]
        fn labels_are_non_empty(label in label_strategy()) {
            prop_assert!(!label.is_empty());
        }
    }
}
