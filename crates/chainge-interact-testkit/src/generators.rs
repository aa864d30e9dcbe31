//! Proptest generators for property-based testing.

use proptest::prelude::*;
use proptest::sample::subsequence;
use serde_json::{json, Value};

use chainge_interact_core::{CredentialOffer, Keypair};
use chainge_interact_flow::FlowType;

/// Generate a deterministic wallet seed.
pub fn seed() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Generate a keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    seed().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate any flow type.
pub fn flow_type() -> impl Strategy<Value = FlowType> {
    proptest::sample::select(FlowType::ALL.to_vec())
}

/// Generate a credential type name.
pub fn credential_type() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z]{2,11}".prop_map(String::from)
}

/// Generate 1 to `max` distinct credential types.
pub fn credential_types(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(credential_type(), 1..=max.max(1))
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Generate a small claim object.
pub fn claim() -> impl Strategy<Value = Value> {
    ("[a-z]{1,8}", any::<u32>()).prop_map(|(name, n)| json!({ "name": name, "n": n }))
}

/// An offer and a selection from it, in arbitrary order.
#[derive(Debug, Clone)]
pub struct OfferSelection {
    pub offered: Vec<CredentialOffer>,
    pub selected: Vec<String>,
}

impl OfferSelection {
    /// Selected types in offer order.
    pub fn expected(&self) -> Vec<&str> {
        self.offered
            .iter()
            .filter(|o| self.selected.contains(&o.kind))
            .map(|o| o.kind.as_str())
            .collect()
    }
}

impl Arbitrary for OfferSelection {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        credential_types(6)
            .prop_flat_map(|types| {
                let len = types.len();
                (
                    Just(types.clone()),
                    subsequence(types, 0..=len).prop_shuffle(),
                )
            })
            .prop_map(|(types, selected)| OfferSelection {
                offered: types.into_iter().map(CredentialOffer::new).collect(),
                selected,
            })
            .boxed()
    }
}
