//! Mutual authentication: both parties sign the same description.

use chainge_interact_core::Message;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flow::{unexpected, FlowType, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationState {
    pub description: Option<String>,
}

impl AuthenticationState {
    pub fn is_described(&self) -> bool {
        self.description.is_some()
    }

    pub fn apply(&self, message: &Message) -> Result<Outcome<Self>> {
        let body = match message {
            Message::Authentication(body) => body,
            other => return Err(unexpected(FlowType::Authentication, other)),
        };

        match &self.description {
            None => Ok(Outcome::Accepted(Self {
                description: Some(body.description.clone()),
            })),
            Some(d) if *d == body.description => Ok(Outcome::Accepted(self.clone())),
            Some(_) => Ok(Outcome::Rejected),
        }
    }
}
