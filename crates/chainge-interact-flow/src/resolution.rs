//! Remote DID resolution. Request and response are stored as received.

use chainge_interact_core::{Message, ResolutionRequest, ResolutionResponse};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flow::{unexpected, FlowType, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionState {
    pub request: Option<ResolutionRequest>,
    pub response: Option<ResolutionResponse>,
}

impl ResolutionState {
    pub fn is_resolved(&self) -> bool {
        self.response.is_some()
    }

    pub fn apply(&self, message: &Message) -> Result<Outcome<Self>> {
        match message {
            Message::ResolutionRequest(req) => {
                if self.request.is_some() {
                    return Ok(Outcome::Rejected);
                }
                Ok(Outcome::Accepted(Self {
                    request: Some(req.clone()),
                    response: None,
                }))
            }
            Message::ResolutionResponse(resp) => {
                if self.request.is_none() {
                    return Err(unexpected(FlowType::Resolution, message));
                }
                if self.response.is_some() {
                    return Ok(Outcome::Rejected);
                }
                Ok(Outcome::Accepted(Self {
                    request: self.request.clone(),
                    response: Some(resp.clone()),
                }))
            }
            other => Err(unexpected(FlowType::Resolution, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_and_response_stored_verbatim() {
        let req = ResolutionRequest {
            description: None,
            uri: Some("did:web:example.com".into()),
            callback_url: None,
        };
        let resp = ResolutionResponse {
            context: json!("https://w3id.org/did-resolution/v1"),
            did_document: json!({"id": "did:web:example.com"}),
            resolver_metadata: json!({}),
            method_metadata: json!({"anything": true}),
        };

        let requested = match ResolutionState::default()
            .apply(&Message::ResolutionRequest(req.clone()))
            .unwrap()
        {
            Outcome::Accepted(s) => s,
            Outcome::Rejected => panic!("expected acceptance"),
        };
        let resolved = match requested
            .apply(&Message::ResolutionResponse(resp.clone()))
            .unwrap()
        {
            Outcome::Accepted(s) => s,
            Outcome::Rejected => panic!("expected acceptance"),
        };

        assert_eq!(resolved.request, Some(req));
        assert_eq!(resolved.response, Some(resp.clone()));
        assert_eq!(
            resolved
                .apply(&Message::ResolutionResponse(resp))
                .unwrap(),
            Outcome::Rejected
        );
    }
}
