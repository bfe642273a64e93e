use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use shared::domain::{PlayerId, SessionCode};
use thiserror::Error;
use uuid::Uuid;

const ISSUER: &str = "quiz-session-engine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    Host,
    Player(PlayerId),
}

impl TokenSubject {
    fn encode(&self) -> String {
        match self {
            Self::Host => "host".to_string(),
            Self::Player(id) => format!("player:{}", id.0),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token was issued for another session")]
    WrongSession,
    #[error("token was issued for another participant")]
    WrongSubject,
    #[error("token lifetime of {0}s is out of range")]
    LifetimeOutOfRange(i64),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    ses: String,
    /// Session instance, so a recycled code does not accept old tokens.
    sid: String,
    iat: i64,
    exp: i64,
}

/// Mints and checks the short-lived tokens that let a dropped connection
/// reclaim its player or host seat.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl_seconds,
        }
    }

    /// Issuer with a per-process secret; tokens do not survive a restart.
    pub fn random(ttl_seconds: i64) -> Self {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();
        Self::new(secret, ttl_seconds)
    }

    pub fn mint(
        &self,
        code: &SessionCode,
        instance: Uuid,
        subject: TokenSubject,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = Duration::try_seconds(self.ttl_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(TokenError::LifetimeOutOfRange(self.ttl_seconds))?;
        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: subject.encode(),
            ses: code.0.clone(),
            sid: instance.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    pub fn verify(
        &self,
        token: &str,
        code: &SessionCode,
        instance: Uuid,
        subject: TokenSubject,
    ) -> Result<(), TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)?;
        let claims = data.claims;

        if claims.ses != code.0 || claims.sid != instance.to_string() {
            return Err(TokenError::WrongSession);
        }
        if claims.sub != subject.encode() {
            return Err(TokenError::WrongSubject);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/rejoin_tests.rs"]
mod tests;
