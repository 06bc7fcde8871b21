//! Broadcast channel registry.
//!
//! Channels are registered once at startup and the registry is frozen
//! afterwards. Public channels accept every join; private channels are
//! registered as dotted patterns with `{placeholder}` segments and an
//! authorization predicate that sees the connecting identity together with the
//! placeholder values parsed out of the requested name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The public chat channel every client joins.
pub const MESSAGES_CHANNEL: &str = "messages";

/// Per-user private channel.
pub const USER_CHANNEL: &str = "App.Models.User.{id}";

/// Header carrying the identity resolved by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
}

pub type ChannelParams = HashMap<String, String>;

type Authorizer = Box<dyn Fn(&Identity, &ChannelParams) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("unknown channel {0}")]
    UnknownChannel(String),
    #[error("unauthorized to join channel {0}")]
    Unauthorized(String),
}

/// Outcome of a successful join check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Public,
    Private { params: ChannelParams },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Some(param) => Segment::Param(param.to_owned()),
                    None => Segment::Literal(segment.to_owned()),
                }
            })
            .collect();

        Self { segments }
    }

    fn captures(&self, name: &str) -> Option<ChannelParams> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = ChannelParams::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(key) => {
                    params.insert(key.clone(), part.to_owned());
                }
            }
        }

        Some(params)
    }
}

enum Access {
    Public,
    Private(Authorizer),
}

struct Registration {
    pattern: Pattern,
    access: Access,
}

#[derive(Default)]
pub struct ChannelRegistryBuilder {
    channels: Vec<Registration>,
}

impl ChannelRegistryBuilder {
    pub fn register_public(mut self, name: &str) -> Self {
        self.channels.push(Registration {
            pattern: Pattern::parse(name),
            access: Access::Public,
        });
        self
    }

    pub fn register_private<F>(mut self, pattern: &str, authorize: F) -> Self
    where
        F: Fn(&Identity, &ChannelParams) -> bool + Send + Sync + 'static,
    {
        self.channels.push(Registration {
            pattern: Pattern::parse(pattern),
            access: Access::Private(Box::new(authorize)),
        });
        self
    }

    pub fn build(self) -> ChannelRegistry {
        ChannelRegistry {
            channels: self.channels,
        }
    }
}

pub struct ChannelRegistry {
    channels: Vec<Registration>,
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::default()
    }

    /// The chat's channels: the public message channel and the per-user channel.
    pub fn chat() -> Self {
        Self::builder()
            .register_public(MESSAGES_CHANNEL)
            .register_private(USER_CHANNEL, user_owns_channel)
            .build()
    }

    /// Decides whether `identity` may join the channel called `name`.
    ///
    /// Registrations are matched in the order they were added.
    pub fn authorize(&self, name: &str, identity: Option<&Identity>) -> Result<Grant, ChannelError> {
        let (registration, params) = self
            .channels
            .iter()
            .find_map(|registration| {
                registration
                    .pattern
                    .captures(name)
                    .map(|params| (registration, params))
            })
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_owned()))?;

        match &registration.access {
            Access::Public => Ok(Grant::Public),
            Access::Private(authorize) => match identity {
                Some(identity) if authorize(identity, &params) => Ok(Grant::Private { params }),
                _ => Err(ChannelError::Unauthorized(name.to_owned())),
            },
        }
    }
}

/// A user may only join the channel carrying their own numeric id.
pub fn user_owns_channel(identity: &Identity, params: &ChannelParams) -> bool {
    params
        .get("id")
        .and_then(|id| id.trim().parse::<u64>().ok())
        .is_some_and(|id| id == identity.id)
}
