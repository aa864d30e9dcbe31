//! # Chainge Interact Testkit
//!
//! Testing utilities for Chainge Interact.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`TestNetwork`] of parties sharing a resolver and an
//!   in-memory relay, canned first messages, and an HTTP callback server
//! - **Generators**: Proptest strategies for offers, selections and keys
//!
//! End-to-end scenarios live under `tests/`.
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use chainge_interact_flow::FlowType;
//! use chainge_interact_testkit::fixtures::{first_message, TestNetwork};
//!
//! async fn example() {
//!     let network = TestNetwork::new();
//!     let alice = network.party(1);
//!     let bob = network.party(2);
//!
//!     let (token, _) = alice
//!         .request(first_message(FlowType::Authentication))
//!         .await
//!         .unwrap();
//!     let at_bob = bob.deliver(&token).await.unwrap();
//!     assert_eq!(at_bob.lock().await.flow_type(), FlowType::Authentication);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chainge_interact_testkit::generators::OfferSelection;
//!
//! proptest! {
//!     #[test]
//!     fn selection_follows_offer_order(sel: OfferSelection) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    first_message, init_tracing, memory_transport, CallbackServer, TestNetwork, TestParty,
};
pub use generators::OfferSelection;
