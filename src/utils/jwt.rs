use chrono::{Duration, Utc};
use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::types::user::{SessionUser, TokenSubject};

pub const SESSION_TTL_DAYS: i64 = 7;
pub const ACCESS_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims<T> {
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub jti: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Claims<T> {
    /// Claims issued now, expiring after `ttl` when one is given.
    pub fn new(data: T, ttl: Option<Duration>) -> Self {
        let now = Utc::now();

        Self {
            iat: now.timestamp(),
            exp: ttl.map(|ttl| (now + ttl).timestamp()),
            jti: uuid::Uuid::new_v4().to_string(),
            data,
        }
    }
}

/// HS256 signer/verifier over the process-wide `JWT_SECRET`.
#[derive(Clone)]
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec").finish_non_exhaustive()
    }
}

impl JwtCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign<T: Serialize>(&self, claims: &Claims<T>) -> Result<String, Error> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    pub fn sign_session(&self, user: &SessionUser) -> Result<String, Error> {
        self.sign(&Claims::new(
            user.clone(),
            Some(Duration::days(SESSION_TTL_DAYS)),
        ))
    }

    pub fn sign_access_token(&self, subject: TokenSubject) -> Result<(String, i64), Error> {
        let claims = Claims::new(subject, Some(Duration::days(ACCESS_TOKEN_TTL_DAYS)));
        let expires_at = claims.exp.unwrap_or(claims.iat);

        Ok((self.sign(&claims)?, expires_at))
    }

    /// Refresh tokens carry no `exp`; they live until rotated.
    pub fn sign_refresh_token(&self, subject: TokenSubject) -> Result<String, Error> {
        self.sign(&Claims::new(subject, None))
    }

    /// Verifies signature and expiry. A token whose `exp` is the current
    /// second or earlier is rejected, as is one without `exp`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<Claims<T>, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<Claims<T>>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("rejected token: {:?}", e.kind());
                Error::InvalidSession
            })?
            .claims;

        match claims.exp {
            Some(exp) if exp > Utc::now().timestamp() => Ok(claims),
            _ => Err(Error::InvalidSession),
        }
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionUser, Error> {
        self.verify::<SessionUser>(token).map(|claims| claims.data)
    }

    /// Reads the claims without checking the signature or expiry.
    ///
    /// Only for tokens whose provenance was already established by a storage
    /// lookup; never for credentials taken straight from a request.
    pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<Claims<T>, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Ok(jsonwebtoken::decode::<Claims<T>>(token, &DecodingKey::from_secret(&[]), &validation)?
            .claims)
    }
}
