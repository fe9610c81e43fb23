//! Caller identity as resolved by the upstream authentication layer.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// The identity on whose behalf a mutating operation executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Option<String>,
    pub authenticated: bool,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            authenticated: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Identity for unauthenticated callers, derived from the network origin.
    pub fn anonymous(origin: Option<IpAddr>) -> Self {
        let id = match origin {
            Some(ip) => format!("anon:{}", ip),
            None => "anon:unknown".to_string(),
        };
        Self {
            id,
            role: None,
            authenticated: false,
        }
    }

    /// Engine-internal actor used for system-initiated writes.
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: Some("system".to_string()),
            authenticated: true,
        }
    }

    /// Rate-limit bucket: authenticated identity first, network origin otherwise.
    pub fn rate_limit_key(&self) -> String {
        if self.authenticated {
            format!("actor:{}", self.id)
        } else {
            format!("ip:{}", self.id.trim_start_matches("anon:"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_actor_uses_origin() {
        let actor = Actor::anonymous(Some(IpAddr::from([203, 0, 113, 7])));
        assert_eq!(actor.id, "anon:203.0.113.7");
        assert!(!actor.authenticated);
        assert_eq!(actor.rate_limit_key(), "ip:203.0.113.7");
    }

    #[test]
    fn anonymous_actor_without_origin() {
        assert_eq!(Actor::anonymous(None).id, "anon:unknown");
    }

    #[test]
    fn authenticated_actor_keys_on_identity() {
        let actor = Actor::user("user-42").with_role("customer");
        assert_eq!(actor.rate_limit_key(), "actor:user-42");
        assert_eq!(actor.role.as_deref(), Some("customer"));
    }
}
