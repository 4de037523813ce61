//! In-memory property registry.
//!
//! Holds at most one entry per composite key, always the entry with the
//! highest sequence number ever accepted by this registry instance. Two
//! instances exist per node: the complete-knowledge registry (everything
//! known) and the locally-published registry (only what this node authored).

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::core::NodeId;
use crate::knowledge::property::{CompositeKey, NodeProperty};

/// Index of node properties keyed by their composite key, offering merge,
/// anti-entropy diff, and snapshot operations.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    entries: HashMap<CompositeKey, NodeProperty>,
}

impl PropertyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held (retractions included).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Look up a single property entry; retractions are returned as-is.
    pub fn property(&self, node: &NodeId, key: &str) -> Option<&NodeProperty> {
        self.entries.get(&CompositeKey::new(node.clone(), key))
    }

    /// Snapshot of one node's properties as a key/value map.
    ///
    /// Retracted entries are omitted: consumers see absence, not tombstones.
    pub fn node_properties(&self, node: &NodeId) -> HashMap<String, String> {
        self.entries
            .values()
            .filter(|entry| entry.origin() == node)
            .filter_map(|entry| {
                entry
                    .value()
                    .map(|value| (entry.key().to_string(), value.to_string()))
            })
            .collect()
    }

    /// Snapshot of the key/value maps of the given nodes.
    pub fn all_node_properties(
        &self,
        nodes: &[NodeId],
    ) -> HashMap<NodeId, HashMap<String, String>> {
        nodes
            .iter()
            .map(|node| (node.clone(), self.node_properties(node)))
            .collect()
    }

    /// Snapshot of the key/value maps of every known node.
    pub fn all_node_properties_complete(&self) -> HashMap<NodeId, HashMap<String, String>> {
        let mut result: HashMap<NodeId, HashMap<String, String>> = HashMap::new();
        for entry in self.entries.values() {
            let map = result.entry(entry.origin().clone()).or_default();
            if let Some(value) = entry.value() {
                map.insert(entry.key().to_string(), value.to_string());
            }
        }
        result
    }

    /// Insert or overwrite every entry of the batch unconditionally.
    ///
    /// Only for entries known to be authoritative, i.e. freshly locally
    /// published; network input goes through
    /// [`PropertyRegistry::merge_and_get_effective_subset`].
    pub fn merge_unchecked(&mut self, batch: impl IntoIterator<Item = NodeProperty>) {
        for entry in batch {
            self.entries.insert(entry.composite_key(), entry);
        }
    }

    /// Merge a batch of received entries, accepting an entry iff its
    /// composite key is unknown or the existing entry's sequence number is
    /// strictly lower.
    ///
    /// Equal sequence numbers are never accepted; treating ties as
    /// replacements would let identical updates reflect through the network
    /// forever. Returns exactly the accepted entries, in input order.
    pub fn merge_and_get_effective_subset(
        &mut self,
        batch: impl IntoIterator<Item = NodeProperty>,
    ) -> Vec<NodeProperty> {
        let mut accepted = Vec::new();
        for incoming in batch {
            match self.entries.entry(incoming.composite_key()) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming.clone());
                    accepted.push(incoming);
                }
                Entry::Occupied(mut slot) => {
                    if slot.get().sequence_no() < incoming.sequence_no() {
                        slot.insert(incoming.clone());
                        accepted.push(incoming);
                    }
                }
            }
        }
        accepted
    }

    /// One-directional anti-entropy diff: every own entry that is absent from
    /// `input` or strictly newer than the corresponding input entry.
    ///
    /// If `input` itself contains two entries sharing a composite key (a
    /// protocol violation by the sender), the diff is abandoned and the full
    /// snapshot returned instead; over-sending still converges, guessing at
    /// the sender's intent might not.
    pub fn complementing_knowledge(&self, input: &[NodeProperty]) -> Vec<NodeProperty> {
        let mut input_sequences: HashMap<CompositeKey, u64> = HashMap::with_capacity(input.len());
        for entry in input {
            if input_sequences
                .insert(entry.composite_key(), entry.sequence_no())
                .is_some()
            {
                return self.detached_copy();
            }
        }

        self.entries
            .values()
            .filter(|own| match input_sequences.get(&own.composite_key()) {
                None => true,
                Some(&input_sequence) => own.sequence_no() > input_sequence,
            })
            .cloned()
            .collect()
    }

    /// Owned snapshot of all entries, safe to hand across concurrency
    /// boundaries.
    pub fn detached_copy(&self) -> Vec<NodeProperty> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prop(origin: &str, key: &str, seq: u64, value: Option<&str>) -> NodeProperty {
        NodeProperty::new(NodeId::from(origin), key, seq, value.map(String::from))
    }

    fn sorted(mut entries: Vec<NodeProperty>) -> Vec<NodeProperty> {
        entries.sort_by_key(|e| (e.composite_key(), e.sequence_no()));
        entries
    }

    mod merging {
        use super::*;

        #[test]
        fn test_merge_twice_is_idempotent() {
            let batch = vec![
                prop("a", "k1", 10, Some("v1")),
                prop("a", "k2", 10, Some("v2")),
                prop("b", "k1", 5, None),
            ];

            let mut registry = PropertyRegistry::new();
            let first = registry.merge_and_get_effective_subset(batch.clone());
            assert_eq!(first.len(), 3);
            let snapshot = sorted(registry.detached_copy());

            let second = registry.merge_and_get_effective_subset(batch);
            assert!(second.is_empty());
            assert_eq!(sorted(registry.detached_copy()), snapshot);
        }

        #[test]
        fn test_older_or_equal_entries_are_rejected() {
            let mut registry = PropertyRegistry::new();
            registry.merge_and_get_effective_subset(vec![prop("a", "k", 10, Some("new"))]);

            let rejected_older =
                registry.merge_and_get_effective_subset(vec![prop("a", "k", 9, Some("old"))]);
            assert!(rejected_older.is_empty());

            let rejected_equal =
                registry.merge_and_get_effective_subset(vec![prop("a", "k", 10, Some("tie"))]);
            assert!(rejected_equal.is_empty());

            assert_eq!(
                registry.property(&NodeId::from("a"), "k").unwrap().value(),
                Some("new")
            );
        }

        #[test]
        fn test_newer_entry_replaces() {
            let mut registry = PropertyRegistry::new();
            registry.merge_and_get_effective_subset(vec![prop("a", "k", 10, Some("old"))]);

            let accepted =
                registry.merge_and_get_effective_subset(vec![prop("a", "k", 11, Some("new"))]);
            assert_eq!(accepted, vec![prop("a", "k", 11, Some("new"))]);
            assert_eq!(registry.entry_count(), 1);
        }

        #[test]
        fn test_equal_sequence_ties_keep_first_accepted() {
            let first = prop("a", "k", 10, Some("first"));
            let second = prop("a", "k", 10, Some("second"));

            for (one, two) in [(first.clone(), second.clone()), (second, first)] {
                let mut registry = PropertyRegistry::new();
                registry.merge_and_get_effective_subset(vec![one.clone()]);
                let rejected = registry.merge_and_get_effective_subset(vec![two]);
                assert!(rejected.is_empty());
                assert_eq!(
                    registry.property(&NodeId::from("a"), "k").unwrap().value(),
                    one.value()
                );
            }
        }

        #[test]
        fn test_merge_unchecked_overwrites_regardless_of_sequence() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![prop("a", "k", 10, Some("newer"))]);
            registry.merge_unchecked(vec![prop("a", "k", 3, Some("authoritative"))]);

            let entry = registry.property(&NodeId::from("a"), "k").unwrap();
            assert_eq!(entry.sequence_no(), 3);
            assert_eq!(entry.value(), Some("authoritative"));
        }
    }

    mod diffing {
        use super::*;

        #[test]
        fn test_complementing_knowledge_converges() {
            let mut a = PropertyRegistry::new();
            a.merge_unchecked(vec![
                prop("a", "k1", 10, Some("a1")),
                prop("a", "k2", 20, Some("a2")),
                prop("c", "k1", 7, Some("shared-old")),
            ]);

            let mut b = PropertyRegistry::new();
            b.merge_unchecked(vec![
                prop("b", "k1", 15, Some("b1")),
                prop("c", "k1", 9, Some("shared-new")),
            ]);

            let missing_in_b = a.complementing_knowledge(&b.detached_copy());
            b.merge_and_get_effective_subset(missing_in_b);

            // B now knows everything A knew plus its own state; for the
            // contested entry the newer sequence wins.
            assert_eq!(
                b.property(&NodeId::from("a"), "k1").unwrap().value(),
                Some("a1")
            );
            assert_eq!(
                b.property(&NodeId::from("a"), "k2").unwrap().value(),
                Some("a2")
            );
            assert_eq!(
                b.property(&NodeId::from("b"), "k1").unwrap().value(),
                Some("b1")
            );
            assert_eq!(
                b.property(&NodeId::from("c"), "k1").unwrap().value(),
                Some("shared-new")
            );
        }

        #[test]
        fn test_complement_excludes_entries_the_peer_already_has() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![
                prop("a", "k1", 10, Some("v")),
                prop("a", "k2", 20, Some("v")),
            ]);

            let input = vec![prop("a", "k1", 10, Some("v")), prop("a", "k2", 5, Some("v"))];
            let complement = registry.complementing_knowledge(&input);

            // k1 is known at the same version, only k2 is newer here.
            assert_eq!(complement, vec![prop("a", "k2", 20, Some("v"))]);
        }

        #[test]
        fn test_duplicate_input_keys_fall_back_to_full_snapshot() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![
                prop("a", "k1", 10, Some("v1")),
                prop("a", "k2", 20, Some("v2")),
            ]);

            let malformed = vec![
                prop("a", "k1", 10, Some("v1")),
                prop("a", "k1", 11, Some("v1-dup")),
            ];
            let result = registry.complementing_knowledge(&malformed);

            assert_eq!(sorted(result), sorted(registry.detached_copy()));
        }

        #[test]
        fn test_complement_of_empty_input_is_everything() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![prop("a", "k", 1, Some("v"))]);

            assert_eq!(
                registry.complementing_knowledge(&[]),
                registry.detached_copy()
            );
        }
    }

    mod reads {
        use super::*;

        #[test]
        fn test_node_properties_omit_retractions() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![
                prop("a", "alive", 10, Some("yes")),
                prop("a", "gone", 11, None),
            ]);

            let map = registry.node_properties(&NodeId::from("a"));
            assert_eq!(map.len(), 1);
            assert_eq!(map.get("alive").map(String::as_str), Some("yes"));

            // The tombstone is still visible to direct entry lookup.
            assert!(
                registry
                    .property(&NodeId::from("a"), "gone")
                    .unwrap()
                    .is_retraction()
            );
        }

        #[test]
        fn test_all_node_properties_scopes_to_requested_nodes() {
            let mut registry = PropertyRegistry::new();
            registry.merge_unchecked(vec![
                prop("a", "k", 1, Some("va")),
                prop("b", "k", 1, Some("vb")),
                prop("c", "k", 1, Some("vc")),
            ]);

            let scoped =
                registry.all_node_properties(&[NodeId::from("a"), NodeId::from("c")]);
            assert_eq!(scoped.len(), 2);
            assert!(scoped.contains_key(&NodeId::from("a")));
            assert!(!scoped.contains_key(&NodeId::from("b")));

            let complete = registry.all_node_properties_complete();
            assert_eq!(complete.len(), 3);
        }
    }

    // Algebraic properties of the merge, over arbitrary small batches.
    fn batch_strategy() -> impl Strategy<Value = Vec<NodeProperty>> {
        prop::collection::vec(
            ("[ab]", "[kl]", 0u64..8, prop::option::of("[xy]{1,3}")),
            0..12,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(origin, key, seq, value)| {
                    NodeProperty::new(NodeId::from(origin.as_str()), key, seq, value)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(batch in batch_strategy()) {
            let mut registry = PropertyRegistry::new();
            registry.merge_and_get_effective_subset(batch.clone());
            let snapshot = sorted(registry.detached_copy());

            registry.merge_and_get_effective_subset(batch);
            prop_assert_eq!(sorted(registry.detached_copy()), snapshot);
        }

        #[test]
        fn acceptance_is_monotonic(first in batch_strategy(), second in batch_strategy()) {
            let mut registry = PropertyRegistry::new();
            registry.merge_and_get_effective_subset(first);
            let before: HashMap<CompositeKey, u64> = registry
                .detached_copy()
                .into_iter()
                .map(|e| (e.composite_key(), e.sequence_no()))
                .collect();

            registry.merge_and_get_effective_subset(second);
            for entry in registry.detached_copy() {
                if let Some(&previous) = before.get(&entry.composite_key()) {
                    prop_assert!(entry.sequence_no() >= previous);
                }
            }
        }

        #[test]
        fn complement_merge_yields_superset(
            first in batch_strategy(),
            second in batch_strategy(),
        ) {
            let mut a = PropertyRegistry::new();
            a.merge_and_get_effective_subset(first);
            let mut b = PropertyRegistry::new();
            b.merge_and_get_effective_subset(second);

            let complement = a.complementing_knowledge(&b.detached_copy());
            b.merge_and_get_effective_subset(complement);

            // B ends up knowing every slot A knew, at an equal or newer
            // sequence number.
            for entry in a.detached_copy() {
                let known = b
                    .property(entry.origin(), entry.key())
                    .expect("slot known to A must be known to B after merge");
                prop_assert!(known.sequence_no() >= entry.sequence_no());
            }
        }
    }
}
