//! Authorization: the requester describes an action, the responder echoes
//! the exact details back to approve it.

use chainge_interact_core::{AuthorizationDetails, Message};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flow::{unexpected, FlowType, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub details: Option<AuthorizationDetails>,
    pub authorized: bool,
}

impl AuthorizationState {
    pub fn apply(&self, message: &Message) -> Result<Outcome<Self>> {
        match message {
            Message::AuthorizationRequest(req) => {
                if self.details.is_some() {
                    return Ok(Outcome::Rejected);
                }
                Ok(Outcome::Accepted(Self {
                    details: Some(AuthorizationDetails::from(req)),
                    authorized: false,
                }))
            }
            Message::AuthorizationResponse(resp) => match &self.details {
                Some(details) if details == resp && !self.authorized => {
                    Ok(Outcome::Accepted(Self {
                        details: Some(details.clone()),
                        authorized: true,
                    }))
                }
                _ => Ok(Outcome::Rejected),
            },
            other => Err(unexpected(FlowType::Authorization, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainge_interact_core::AuthorizationRequest;

    fn request() -> Message {
        Message::AuthorizationRequest(AuthorizationRequest {
            description: "unlock".into(),
            image_url: None,
            action: Some("open".into()),
            callback_url: "https://cb".into(),
        })
    }

    fn response(description: &str) -> Message {
        Message::AuthorizationResponse(AuthorizationDetails {
            description: description.into(),
            image_url: None,
            action: Some("open".into()),
        })
    }

    fn described() -> AuthorizationState {
        match AuthorizationState::default().apply(&request()).unwrap() {
            Outcome::Accepted(s) => s,
            Outcome::Rejected => panic!("request should be accepted"),
        }
    }

    #[test]
    fn test_response_must_echo_details() {
        let state = described();
        assert_eq!(state.apply(&response("lock")).unwrap(), Outcome::Rejected);

        match state.apply(&response("unlock")).unwrap() {
            Outcome::Accepted(s) => assert!(s.authorized),
            Outcome::Rejected => panic!("echoed details should be accepted"),
        }
    }

    #[test]
    fn test_second_request_rejected() {
        assert_eq!(described().apply(&request()).unwrap(), Outcome::Rejected);
    }

    #[test]
    fn test_response_on_empty_state_rejected() {
        assert_eq!(
            AuthorizationState::default().apply(&response("unlock")).unwrap(),
            Outcome::Rejected
        );
    }
}
