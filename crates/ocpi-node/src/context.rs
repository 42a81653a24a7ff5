//! Per-request metadata handed in by the transport.

use ocpi_node_core::{AccessToken, EventTrackingId};
use ocpi_node_store::WriteContext;

/// What the transport knows about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    pub event_tracking_id: EventTrackingId,
    pub user_id: Option<String>,
    /// Request-level downgrade override; wins over the party and node defaults.
    pub allow_downgrades: Option<bool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request authenticated with `token`.
    pub fn with_token(token: &AccessToken) -> Self {
        Self {
            authorization: Some(format!("Token {}", token.as_str())),
            ..Self::default()
        }
    }

    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    pub fn with_event_tracking_id(mut self, id: EventTrackingId) -> Self {
        self.event_tracking_id = id;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = Some(allow);
        self
    }

    /// The token from an `Authorization: Token <token>` header.
    ///
    /// A missing header, another scheme or an empty token all yield `None`.
    pub fn token(&self) -> Option<AccessToken> {
        let header = self.authorization.as_deref()?.trim();
        let (scheme, token) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("token") {
            return None;
        }
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(AccessToken::new(token))
        }
    }

    pub fn write_context(&self) -> WriteContext {
        WriteContext {
            event_tracking_id: self.event_tracking_id.clone(),
            user_id: self.user_id.clone(),
            allow_downgrades: self.allow_downgrades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_header_parsing() {
        let ctx = RequestContext::new().with_authorization("Token abc-123");
        assert_eq!(ctx.token(), Some(AccessToken::new("abc-123")));

        let ctx = RequestContext::new().with_authorization("token   spaced  ");
        assert_eq!(ctx.token(), Some(AccessToken::new("spaced")));

        for header in ["Bearer abc", "Token", "Token   ", "abc"] {
            let ctx = RequestContext::new().with_authorization(header);
            assert_eq!(ctx.token(), None, "{}", header);
        }
        assert_eq!(RequestContext::new().token(), None);
    }

    #[test]
    fn test_write_context_carries_tracking_id() {
        let id = EventTrackingId::from_string("evt-1");
        let ctx = RequestContext::new()
            .with_event_tracking_id(id.clone())
            .with_user("ops");
        let write = ctx.write_context();
        assert_eq!(write.event_tracking_id, id);
        assert_eq!(write.user_id.as_deref(), Some("ops"));
        assert_eq!(write.allow_downgrades, None);

        let write = ctx.with_allow_downgrades(false).write_context();
        assert_eq!(write.allow_downgrades, Some(false));
    }
}
