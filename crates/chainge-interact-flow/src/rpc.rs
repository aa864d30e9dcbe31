//! Remote encrypt, decrypt and sign calls: one request, one result.

use chainge_interact_core::{Message, RpcRequest};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flow::{unexpected, FlowType, Outcome};

/// Which of the three call flows a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcKind {
    Encrypt,
    Decrypt,
    Sign,
}

impl RpcKind {
    pub fn flow_type(self) -> FlowType {
        match self {
            RpcKind::Encrypt => FlowType::Encrypt,
            RpcKind::Decrypt => FlowType::Decrypt,
            RpcKind::Sign => FlowType::Sign,
        }
    }

    fn request<'a>(self, message: &'a Message) -> Option<&'a RpcRequest> {
        match (self, message) {
            (RpcKind::Encrypt, Message::EncryptionRequest(r))
            | (RpcKind::Decrypt, Message::DecryptionRequest(r))
            | (RpcKind::Sign, Message::SigningRequest(r)) => Some(r),
            _ => None,
        }
    }

    fn result<'a>(self, message: &'a Message) -> Option<&'a [u8]> {
        match (self, message) {
            (RpcKind::Encrypt, Message::EncryptionResponse(r))
            | (RpcKind::Decrypt, Message::DecryptionResponse(r))
            | (RpcKind::Sign, Message::SigningResponse(r)) => Some(&r.result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcState {
    pub request: Option<RpcRequest>,
    pub result: Option<Vec<u8>>,
}

impl RpcState {
    pub fn is_requested(&self) -> bool {
        self.request.is_some()
    }

    pub fn is_responded(&self) -> bool {
        self.result.is_some()
    }

    pub fn apply(&self, kind: RpcKind, message: &Message) -> Result<Outcome<Self>> {
        if let Some(req) = kind.request(message) {
            if self.request.is_some() {
                return Ok(Outcome::Rejected);
            }
            return Ok(Outcome::Accepted(Self {
                request: Some(req.clone()),
                result: None,
            }));
        }

        if let Some(result) = kind.result(message) {
            if self.request.is_none() {
                return Err(unexpected(kind.flow_type(), message));
            }
            if self.result.is_some() {
                return Ok(Outcome::Rejected);
            }
            return Ok(Outcome::Accepted(Self {
                request: self.request.clone(),
                result: Some(result.to_vec()),
            }));
        }

        Err(unexpected(kind.flow_type(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use chainge_interact_core::{RpcPayload, RpcResponse};

    fn sign_request() -> Message {
        Message::SigningRequest(RpcRequest {
            callback_url: "https://cb".into(),
            request: RpcPayload {
                target: None,
                data: b"payload".to_vec(),
            },
        })
    }

    fn sign_response() -> Message {
        Message::SigningResponse(RpcResponse {
            result: vec![7; 64],
        })
    }

    #[test]
    fn test_request_then_result() {
        let requested = match RpcState::default().apply(RpcKind::Sign, &sign_request()).unwrap() {
            Outcome::Accepted(s) => s,
            Outcome::Rejected => panic!("expected acceptance"),
        };
        assert!(requested.is_requested());

        match requested.apply(RpcKind::Sign, &sign_response()).unwrap() {
            Outcome::Accepted(s) => assert_eq!(s.result, Some(vec![7; 64])),
            Outcome::Rejected => panic!("expected acceptance"),
        }
    }

    #[test]
    fn test_second_request_rejected_not_error() {
        let requested = match RpcState::default().apply(RpcKind::Sign, &sign_request()).unwrap() {
            Outcome::Accepted(s) => s,
            Outcome::Rejected => panic!("expected acceptance"),
        };
        assert_eq!(
            requested.apply(RpcKind::Sign, &sign_request()).unwrap(),
            Outcome::Rejected
        );
    }

    #[test]
    fn test_result_before_request_is_unexpected() {
        assert!(matches!(
            RpcState::default().apply(RpcKind::Sign, &sign_response()),
            Err(FlowError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_is_unexpected() {
        assert!(matches!(
            RpcState::default().apply(RpcKind::Encrypt, &sign_request()),
            Err(FlowError::UnexpectedMessage {
                flow: FlowType::Encrypt,
                ..
            })
        ));
    }
}
