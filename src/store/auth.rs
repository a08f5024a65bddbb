//! Master-key request signing for the Cosmos DB REST API.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{StoreError, StoreErrorKind};

type HmacSha256 = Hmac<Sha256>;

/// RFC 1123 date as expected by the `x-ms-date` header.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub struct MasterKey {
    key: Vec<u8>,
}

impl MasterKey {
    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let key = STANDARD.decode(encoded.trim()).map_err(|e| {
            StoreError::new(
                StoreErrorKind::Unauthorized,
                format!("primary key is not valid base64: {}", e),
            )
        })?;
        Ok(Self { key })
    }

    /// Builds the url-encoded `authorization` header value.
    ///
    /// `resource_type` is e.g. `docs` or `colls`; `resource_link` is the
    /// case-sensitive link of the addressed resource (its parent for feeds).
    pub fn sign(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, StoreError> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| StoreError::new(StoreErrorKind::Unauthorized, e.to_string()))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        let token = format!("type=master&ver=1.0&sig={}", signature);
        Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_is_rfc1123() {
        let t = Utc.with_ymd_and_hms(2017, 4, 27, 0, 51, 12).unwrap();
        assert_eq!(http_date(t), "Thu, 27 Apr 2017 00:51:12 GMT");
    }

    #[test]
    fn signature_is_url_encoded_and_deterministic() {
        let key = MasterKey::from_base64(&STANDARD.encode(b"demo-secret-key")).unwrap();
        let date = "Thu, 27 Apr 2017 00:51:12 GMT";
        let a = key.sign("GET", "dbs", "dbs/ToDoList", date).unwrap();
        let b = key.sign("get", "DBS", "dbs/ToDoList", date).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"));
        assert!(!a.contains('/') && !a.contains('='));
        assert_ne!(a, key.sign("GET", "dbs", "dbs/todolist", date).unwrap());
    }

    #[test]
    fn rejects_non_base64_keys() {
        let err = MasterKey::from_base64("not base64 !!").err().unwrap();
        assert_eq!(err.kind, StoreErrorKind::Unauthorized);
    }
}
