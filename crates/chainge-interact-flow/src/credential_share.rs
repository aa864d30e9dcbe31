//! Credential sharing: a verifier states requirements, the holder supplies
//! credentials meeting them.

use chainge_interact_core::{requirements_satisfied, CredentialRequirement, Message, SignedCredential};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::{unexpected, FlowType, Outcome, TransitionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharePhase {
    Init,
    Constrained,
    Provided,
}

/// Requests and responses accumulate: one entry per token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialShareState {
    pub constraints: Vec<Vec<CredentialRequirement>>,
    pub provided: Vec<Vec<SignedCredential>>,
}

impl CredentialShareState {
    pub fn phase(&self) -> SharePhase {
        if !self.provided.is_empty() {
            SharePhase::Provided
        } else if !self.constraints.is_empty() {
            SharePhase::Constrained
        } else {
            SharePhase::Init
        }
    }

    /// Credentials from the most recent response.
    pub fn latest_provided(&self) -> &[SignedCredential] {
        self.provided.last().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn apply(&self, message: &Message, ctx: &TransitionContext) -> Result<Outcome<Self>> {
        match message {
            Message::CredentialRequest(req) => {
                let mut next = self.clone();
                next.constraints.push(req.credential_requirements.clone());
                Ok(Outcome::Accepted(next))
            }
            Message::CredentialResponse(resp) => {
                for (i, cred) in resp.supplied_credentials.iter().enumerate() {
                    if cred.is_expired(ctx.now) {
                        return Err(FlowError::CredentialResponseFailed(format!(
                            "credential {} expired",
                            cred.id
                        )));
                    }
                    if !ctx.signature_valid(i) {
                        return Err(FlowError::CredentialResponseFailed(format!(
                            "credential {} has an invalid signature",
                            cred.id
                        )));
                    }
                }

                if let Some(last) = self.constraints.last() {
                    if !requirements_satisfied(last, &resp.supplied_credentials) {
                        return Err(FlowError::RequirementsNotSatisfied);
                    }
                }

                let mut next = self.clone();
                next.provided.push(resp.supplied_credentials.clone());
                Ok(Outcome::Accepted(next))
            }
            other => Err(unexpected(FlowType::CredentialShare, other)),
        }
    }
}
