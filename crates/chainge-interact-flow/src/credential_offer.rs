//! Credential offer: an issuer offers credential types, the holder selects
//! some, the issuer delivers signed credentials.
//!
//! Selection and issuance are kept in offer order regardless of the order
//! used in the holder's and issuer's messages.

use chainge_interact_core::{CredentialOffer, Message, SelectedCredential, SignedCredential};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::{unexpected, FlowType, Outcome, TransitionContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OfferPhase {
    #[default]
    Init,
    Offered,
    Selected,
    Issued,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOfferState {
    pub phase: OfferPhase,
    pub offer_summary: Vec<CredentialOffer>,
    pub selection: Vec<SelectedCredential>,
    pub issued: Vec<SignedCredential>,
    pub credentials_all_valid: bool,
}

impl CredentialOfferState {
    /// Selected types, in offer order.
    pub fn selected_types(&self) -> Vec<&str> {
        self.selection.iter().map(|s| s.kind.as_str()).collect()
    }

    fn offered(&self, kind: &str) -> bool {
        self.offer_summary.iter().any(|o| o.kind == kind)
    }

    pub fn apply(&self, message: &Message, ctx: &TransitionContext) -> Result<Outcome<Self>> {
        match message {
            Message::CredentialOfferRequest(req) => {
                if self.phase != OfferPhase::Init {
                    return Ok(Outcome::Rejected);
                }
                Ok(Outcome::Accepted(Self {
                    phase: OfferPhase::Offered,
                    offer_summary: req.offered_credentials.clone(),
                    ..Self::default()
                }))
            }
            Message::CredentialOfferResponse(resp) => {
                if self.phase != OfferPhase::Offered {
                    return Err(unexpected(FlowType::CredentialOffer, message));
                }
                if let Some(bad) = resp
                    .selected_credentials
                    .iter()
                    .find(|s| !self.offered(&s.kind))
                {
                    return Err(FlowError::SelectionNotOffered(bad.kind.clone()));
                }

                let mut selection: Vec<SelectedCredential> = Vec::new();
                for offer in &self.offer_summary {
                    let chosen = resp.selected_credentials.iter().any(|s| s.kind == offer.kind);
                    if chosen && !selection.iter().any(|s| s.kind == offer.kind) {
                        selection.push(SelectedCredential::new(offer.kind.clone()));
                    }
                }

                Ok(Outcome::Accepted(Self {
                    phase: OfferPhase::Selected,
                    selection,
                    ..self.clone()
                }))
            }
            Message::CredentialsReceive(receive) => {
                if self.phase != OfferPhase::Selected {
                    return Err(unexpected(FlowType::CredentialOffer, message));
                }
                if let Some(bad) = receive
                    .signed_credentials
                    .iter()
                    .find(|c| !self.offered(&c.kind))
                {
                    return Err(FlowError::CredentialNotOffered(bad.kind.clone()));
                }

                let all_valid = receive
                    .signed_credentials
                    .iter()
                    .enumerate()
                    .all(|(i, cred)| {
                        ctx.signature_valid(i)
                            && ctx.requester.as_ref() == Some(&cred.issuer)
                            && ctx.responder.as_ref() == Some(&cred.subject)
                    });

                let mut seen = Vec::new();
                let mut issued = Vec::with_capacity(receive.signed_credentials.len());
                for offer in &self.offer_summary {
                    if seen.contains(&offer.kind.as_str()) {
                        continue;
                    }
                    seen.push(offer.kind.as_str());
                    issued.extend(
                        receive
                            .signed_credentials
                            .iter()
                            .filter(|c| c.kind == offer.kind)
                            .cloned(),
                    );
                }

                Ok(Outcome::Accepted(Self {
                    phase: OfferPhase::Issued,
                    issued,
                    credentials_all_valid: all_valid,
                    ..self.clone()
                }))
            }
            other => Err(unexpected(FlowType::CredentialOffer, other)),
        }
    }
}
