use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::client_ip::extract_client_ip;
use crate::domain::Actor;
use crate::AppState;

/// Header carrying the caller id resolved by the upstream auth gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Attaches the caller's [`Actor`] to the request.
///
/// An `Actor` already present as an extension wins. Otherwise the gateway's
/// `X-Actor-Id` header is trusted, and callers without one become
/// `anon:<client-ip>`.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Actor>().is_none() {
        let actor = resolve_actor(&request, state.trusted_proxy_depth);
        tracing::debug!(actor_id = %actor.id, authenticated = actor.authenticated, "resolved actor");
        request.extensions_mut().insert(actor);
    }

    next.run(request).await
}

fn resolve_actor(request: &Request, trusted_proxy_depth: usize) -> Actor {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    match header(ACTOR_ID_HEADER) {
        Some(id) => {
            let actor = Actor::user(id);
            match header(ACTOR_ROLE_HEADER) {
                Some(role) => actor.with_role(role),
                None => actor,
            }
        }
        None => Actor::anonymous(extract_client_ip(
            request.headers(),
            request.extensions(),
            trusted_proxy_depth,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn gateway_header_becomes_authenticated_actor() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, "user-7")
            .header(ACTOR_ROLE_HEADER, "treasurer")
            .body(Body::empty())
            .unwrap();

        let actor = resolve_actor(&request, 1);
        assert_eq!(actor, Actor::user("user-7").with_role("treasurer"));
    }

    #[test]
    fn missing_header_falls_back_to_client_ip() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let actor = resolve_actor(&request, 1);
        assert_eq!(actor.id, "anon:203.0.113.9");
        assert!(!actor.authenticated);
    }

    #[test]
    fn blank_header_is_ignored() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, "   ")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_actor(&request, 1).id, "anon:unknown");
    }
}
