use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,     // user_id (UUID)
    pub email: String,
    pub typ: String,     // toujours "access"
    pub iat: i64,
    pub exp: i64,        // expiration timestamp
}

/// Génère un access token (HS256) pour un utilisateur
pub fn generate_access_token(
    user_id: Uuid,
    email: &str,
    secret: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        typ: ACCESS_TOKEN_TYPE.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Vérifie (signature + expiration) et décode un access token
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?
    .claims;

    if claims.typ != ACCESS_TOKEN_TYPE {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-jwt-secret-with-32-bytes-min!";

    #[test]
    fn test_generate_and_verify_token() {
        let user_id = Uuid::new_v4();
        let email = "someone@example.com";

        let token = generate_access_token(user_id, email, SECRET, Duration::minutes(15)).unwrap();
        let claims = verify_access_token(&token, SECRET).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, email);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_invalid_token() {
        let result = verify_access_token("invalid.token.here", SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_access_token(Uuid::new_v4(), "a@b.io", SECRET, Duration::minutes(5)).unwrap();
        assert!(verify_access_token(&token, "another-secret-that-is-long-enough!").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // au-delà de la tolérance par défaut (60s) de jsonwebtoken
        let token = generate_access_token(Uuid::new_v4(), "a@b.io", SECRET, Duration::minutes(-10)).unwrap();
        assert!(verify_access_token(&token, SECRET).is_err());
    }
}
