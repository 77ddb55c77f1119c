use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use depot_core::identity::{Actor, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

/// Claims minted by the authentication service. The order engine trusts
/// the identity but re-checks role and ownership on every operation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub exp: usize,
}

impl Claims {
    pub fn into_actor(self) -> Result<Actor, StatusCode> {
        let role: Role = self.role.parse().map_err(|_| StatusCode::UNAUTHORIZED)?;
        Ok(Actor {
            id: self.sub,
            name: self.name,
            role,
            is_active: self.active,
        })
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract token from Authorization header
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Build the caller identity and hand it to the handlers
    let actor = token_data.claims.into_actor()?;
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: &str) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            name: "Dana".to_string(),
            role: role.to_string(),
            active: true,
            exp: 2_000_000_000,
        }
    }

    #[test]
    fn known_roles_become_actors() {
        let actor = claims("seller").into_actor().unwrap();
        assert_eq!(actor.role, Role::Seller);
        assert!(actor.is_active);

        let actor = claims("admin").into_actor().unwrap();
        assert_eq!(actor.role, Role::Admin);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert_eq!(
            claims("superuser").into_actor().unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn inactive_flag_is_preserved() {
        let mut c = claims("seller");
        c.active = false;
        assert!(!c.into_actor().unwrap().is_active);
    }
}
