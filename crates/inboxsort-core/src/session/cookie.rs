//! Signed session cookie
//!
//! The cookie value is `base64url(json) "." base64url(hmac_sha256(json))`.
//! Nothing is stored server-side; a cookie that fails verification is
//! treated as no session at all.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::models::SessionToken;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of the sign-in CSRF state cookie (seconds)
const STATE_MAX_AGE_SECS: u64 = 600;

/// Encodes and verifies the session cookie
#[derive(Clone)]
pub struct SessionCodec {
    key: Vec<u8>,
    cookie_name: String,
    secure: bool,
    max_age_secs: u64,
}

impl SessionCodec {
    pub fn new(secret: &str, server: &ServerConfig) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config("session secret must not be empty".to_string()));
        }
        Ok(Self {
            key: secret.as_bytes().to_vec(),
            cookie_name: server.cookie_name.clone(),
            secure: server.secure_cookies,
            max_age_secs: server.session_max_age_secs,
        })
    }

    /// Name of the short-lived cookie holding the OAuth `state` value
    pub fn state_cookie_name(&self) -> String {
        format!("{}.state", self.cookie_name)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| Error::Other(e.to_string()))
    }

    /// Serialize and sign a token
    pub fn encode(&self, token: &SessionToken) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(token)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify and deserialize a cookie value
    pub fn decode(&self, value: &str) -> Result<SessionToken> {
        let (payload, signature) = value
            .split_once('.')
            .ok_or_else(|| Error::InvalidSession("malformed cookie".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::InvalidSession("malformed signature".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSession("bad signature".to_string()))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::InvalidSession("malformed payload".to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Extract the session token from a `Cookie` request header, if present and valid
    pub fn from_cookie_header(&self, header: &str) -> Option<SessionToken> {
        let value = read_cookie(header, &self.cookie_name)?;
        match self.decode(value) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring session cookie: {}", e);
                None
            }
        }
    }

    /// `Set-Cookie` header value carrying `token`
    pub fn set_cookie(&self, token: &SessionToken) -> Result<String> {
        let value = self.encode(token)?;
        debug!("Issuing session cookie ({} bytes)", value.len());
        Ok(self.cookie(&self.cookie_name, &value, self.max_age_secs))
    }

    /// `Set-Cookie` header value removing the session
    pub fn clear_cookie(&self) -> String {
        self.cookie(&self.cookie_name, "", 0)
    }

    /// `Set-Cookie` header value carrying the OAuth `state`
    pub fn set_state_cookie(&self, state: &str) -> String {
        self.cookie(&self.state_cookie_name(), state, STATE_MAX_AGE_SECS)
    }

    /// `Set-Cookie` header value removing the OAuth `state`
    pub fn clear_state_cookie(&self) -> String {
        self.cookie(&self.state_cookie_name(), "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Find a cookie value by name in a `Cookie` request header
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenError;

    fn codec(secret: &str) -> SessionCodec {
        SessionCodec::new(secret, &ServerConfig::default()).unwrap()
    }

    fn token() -> SessionToken {
        SessionToken {
            access_token: "ya29.access".to_string(),
            refresh_token: "1//refresh".to_string(),
            access_token_expires_at: 1_700_000_000_000,
            error: None,
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = codec("secret");
        let value = codec.encode(&token()).unwrap();
        assert_eq!(codec.decode(&value).unwrap(), token());

        let errored = token().into_errored();
        let value = codec.encode(&errored).unwrap();
        assert_eq!(codec.decode(&value).unwrap().error, Some(TokenError::RefreshFailed));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = codec("secret");
        let value = codec.encode(&token()).unwrap();
        let (_, signature) = value.split_once('.').unwrap();

        let mut forged = token();
        forged.access_token_expires_at = i64::MAX;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        let err = codec
            .decode(&format!("{}.{}", forged_payload, signature))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let value = codec("secret").encode(&token()).unwrap();
        assert!(codec("other").decode(&value).is_err());
        assert!(codec("secret").decode("no-dot").is_err());
    }

    #[test]
    fn test_empty_secret_refused() {
        assert!(SessionCodec::new("", &ServerConfig::default()).is_err());
    }

    #[test]
    fn test_from_cookie_header() {
        let codec = codec("secret");
        let value = codec.encode(&token()).unwrap();
        let header = format!("theme=dark; inboxsort.session={}; other=1", value);

        assert_eq!(codec.from_cookie_header(&header), Some(token()));
        assert_eq!(codec.from_cookie_header("theme=dark"), None);
        assert_eq!(codec.from_cookie_header("inboxsort.session=garbage.sig"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let mut server = ServerConfig::default();
        server.secure_cookies = true;
        let codec = SessionCodec::new("secret", &server).unwrap();

        let set = codec.set_cookie(&token()).unwrap();
        assert!(set.starts_with("inboxsort.session="));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
        assert!(set.ends_with("; Secure"));

        assert!(codec.clear_cookie().contains("Max-Age=0"));
        assert!(codec
            .set_state_cookie("xyz")
            .starts_with("inboxsort.session.state=xyz;"));
    }

    #[test]
    fn test_read_cookie() {
        assert_eq!(read_cookie("a=1; b=2", "b"), Some("2"));
        assert_eq!(read_cookie("a=1; ab=2", "b"), None);
        assert_eq!(read_cookie("", "a"), None);
    }
}
