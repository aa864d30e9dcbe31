//! Channel establishment: the requester offers transports, the responder
//! picks one by index.

use chainge_interact_core::{Message, TransportDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::flow::{unexpected, FlowType, Outcome};

/// Coarse position in the establishment protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Init,
    HasTransports,
    Established,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstablishChannelState {
    pub description: Option<String>,
    pub transports: Vec<TransportDescriptor>,
    pub transport_idx: Option<usize>,
    pub established: bool,
}

impl EstablishChannelState {
    pub fn phase(&self) -> ChannelPhase {
        if self.established {
            ChannelPhase::Established
        } else if self.description.is_some() {
            ChannelPhase::HasTransports
        } else {
            ChannelPhase::Init
        }
    }

    /// The negotiated transport, once established.
    pub fn selected_transport(&self) -> Option<&TransportDescriptor> {
        self.transport_idx.and_then(|idx| self.transports.get(idx))
    }

    pub fn apply(&self, message: &Message) -> Result<Outcome<Self>> {
        if self.established {
            return Err(FlowError::AlreadyEstablished);
        }

        match message {
            Message::EstablishChannelRequest(req) => {
                if self.phase() != ChannelPhase::Init {
                    return Ok(Outcome::Rejected);
                }
                Ok(Outcome::Accepted(Self {
                    description: Some(req.description.clone()),
                    transports: req.transports.clone(),
                    transport_idx: None,
                    established: false,
                }))
            }
            Message::EstablishChannelResponse(resp) => {
                if self.phase() != ChannelPhase::HasTransports {
                    return Err(unexpected(FlowType::EstablishChannel, message));
                }
                let idx = usize::try_from(resp.transport_idx)
                    .ok()
                    .filter(|idx| *idx < self.transports.len())
                    .ok_or(FlowError::InvalidTransportIndex {
                        index: resp.transport_idx,
                        available: self.transports.len(),
                    })?;
                Ok(Outcome::Accepted(Self {
                    transport_idx: Some(idx),
                    established: true,
                    ..self.clone()
                }))
            }
            other => Err(unexpected(FlowType::EstablishChannel, other)),
        }
    }
}
