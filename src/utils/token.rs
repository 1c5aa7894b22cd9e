use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::{Actor, UserRole},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: UserRole,
    pub iat: usize,
    pub exp: usize,
}

impl TokenClaims {
    /// Builds the caller, falling back to `tenant_hint` when the token carries no tenant.
    pub fn into_actor(self, tenant_hint: Option<String>) -> Option<Actor> {
        let tenant_id = self
            .tenant
            .filter(|tenant| !tenant.trim().is_empty())
            .or(tenant_hint)?;

        Some(Actor {
            user_id: self.sub,
            tenant_id,
            name: self.name,
            email: self.email,
            role: self.role,
        })
    }
}

pub fn create_token(actor: &Actor, secret: &[u8], expires_in_minutes: i64) -> Result<String, jsonwebtoken::errors::Error> {
    if actor.user_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let claims = TokenClaims {
        sub: actor.user_id.clone(),
        tenant: Some(actor.tenant_id.clone()),
        name: actor.name.clone(),
        email: actor.email.clone(),
        role: actor.role,
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(expires_in_minutes)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<TokenClaims, HttpError> {
    decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn agent() -> Actor {
        Actor {
            user_id: "agent-7".into(),
            tenant_id: "acme".into(),
            name: "Ada".into(),
            email: "ada@acme.test".into(),
            role: UserRole::Agent,
        }
    }

    #[test]
    fn token_carries_the_actor() {
        let token = create_token(&agent(), SECRET, 60).unwrap();
        let actor = decode_token(token, SECRET).unwrap().into_actor(None).unwrap();
        assert_eq!(actor.user_id, "agent-7");
        assert_eq!(actor.tenant_id, "acme");
        assert_eq!(actor.role, UserRole::Agent);
    }

    #[test]
    fn wrong_secret_or_expiry_is_rejected() {
        let token = create_token(&agent(), SECRET, 60).unwrap();
        assert!(decode_token(token, b"other").is_err());

        let expired = create_token(&agent(), SECRET, -10).unwrap();
        assert!(decode_token(expired, SECRET).is_err());
    }

    #[test]
    fn missing_tenant_uses_the_hint() {
        let claims = TokenClaims {
            sub: "c1".into(),
            tenant: None,
            name: String::new(),
            email: String::new(),
            role: UserRole::Customer,
            iat: 0,
            exp: 0,
        };
        assert!(claims.into_actor(None).is_none());

        let claims = TokenClaims {
            sub: "c1".into(),
            tenant: Some(" ".into()),
            name: String::new(),
            email: String::new(),
            role: UserRole::Customer,
            iat: 0,
            exp: 0,
        };
        let actor = claims.into_actor(Some("globex".into())).unwrap();
        assert_eq!(actor.tenant_id, "globex");
    }
}
