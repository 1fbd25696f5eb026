use crate::error::PushError;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Firebase service account credentials (the JSON blob downloaded from the console)
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Keep the private key out of logs
impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Build the signed JWT bearer assertion exchanged for an access token
pub fn build_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String, PushError> {
    let claims = JwtClaims {
        iss: key.client_email.clone(),
        scope: MESSAGING_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    // Accepts both PKCS#8 (service account keys) and PKCS#1 PEM
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| PushError::Signing(format!("Failed to parse private key: {}", e)))?;

    encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| PushError::Signing(format!("Failed to encode JWT: {}", e)))
}
