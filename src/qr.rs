use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use qrcode::QrCode;
use qrcode::render::svg;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// A short-lived token an admin issues and an employee scans. Lives only in
/// the process-wide store, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrToken {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("Invalid or expired QR code")]
    NotFound,
    #[error("QR code has expired")]
    Expired,
}

/// In-memory store of active QR tokens, shared across in-flight requests.
///
/// Constructed once at process start and injected; issuance, scanning, and
/// sweeping all go through the interior mutex. Expiry is re-checked on every
/// validation, so the opportunistic sweep is housekeeping only.
pub struct QrStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, QrToken>>,
}

impl QrStore {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl: Duration::milliseconds(ttl_ms),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for `created_by`, sweeping expired entries while
    /// the lock is held. The identifier is 16 random bytes as hex; collisions
    /// are all but impossible at that entropy but are regenerated anyway.
    pub fn issue(&self, created_by: Uuid) -> QrToken {
        let now = Utc::now();
        let mut tokens = self.tokens.lock().expect("qr store poisoned");

        let mut id = Uuid::new_v4().simple().to_string();
        while tokens.contains_key(&id) {
            id = Uuid::new_v4().simple().to_string();
        }

        let token = QrToken {
            id: id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            created_by,
        };
        tokens.insert(id, token.clone());

        Self::sweep_locked(&mut tokens, now);

        token
    }

    pub fn validate(&self, id: &str) -> Result<QrToken, QrError> {
        self.validate_at(id, Utc::now())
    }

    /// Expiry rule is strict: a token is still valid exactly at `expires_at`.
    /// Expired entries are evicted as a side effect of detection.
    pub fn validate_at(&self, id: &str, now: DateTime<Utc>) -> Result<QrToken, QrError> {
        let mut tokens = self.tokens.lock().expect("qr store poisoned");

        let token = tokens.get(id).cloned().ok_or(QrError::NotFound)?;
        if now > token.expires_at {
            tokens.remove(id);
            return Err(QrError::Expired);
        }

        Ok(token)
    }

    /// Consume a token after a successful scan; tokens are single-use.
    pub fn remove(&self, id: &str) {
        self.tokens.lock().expect("qr store poisoned").remove(id);
    }

    pub fn sweep_expired(&self) {
        let mut tokens = self.tokens.lock().expect("qr store poisoned");
        Self::sweep_locked(&mut tokens, Utc::now());
    }

    pub fn active_count(&self) -> usize {
        self.tokens.lock().expect("qr store poisoned").len()
    }

    fn sweep_locked(tokens: &mut HashMap<String, QrToken>, now: DateTime<Utc>) {
        tokens.retain(|_, token| now <= token.expires_at);
    }
}

/// Render a token id as a scannable QR image, returned as an SVG data URL.
pub fn render_data_url(id: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(id.as_bytes())?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL_MS: i64 = 30_000;

    fn admin() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn issued_token_validates_before_expiry() {
        let store = QrStore::new(TTL_MS);
        let issuer = admin();
        let token = store.issue(issuer);

        assert_eq!(token.id.len(), 32);
        assert_eq!(token.expires_at, token.created_at + Duration::milliseconds(TTL_MS));

        let validated = store.validate(&token.id).unwrap();
        assert_eq!(validated.created_by, issuer);
        assert_eq!(validated.created_at, token.created_at);
    }

    #[test]
    fn unknown_token_is_not_found() {
        let store = QrStore::new(TTL_MS);
        assert_eq!(store.validate("deadbeef"), Err(QrError::NotFound));
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let store = QrStore::new(TTL_MS);
        let token = store.issue(admin());

        // exactly at expires_at the token is still valid
        assert!(store.validate_at(&token.id, token.expires_at).is_ok());

        // one millisecond past, it is expired and evicted
        let late = token.expires_at + Duration::milliseconds(1);
        assert_eq!(store.validate_at(&token.id, late), Err(QrError::Expired));

        // the eviction means a retry no longer sees the entry at all
        assert_eq!(store.validate_at(&token.id, late), Err(QrError::NotFound));
    }

    #[test]
    fn removed_token_cannot_be_reused() {
        let store = QrStore::new(TTL_MS);
        let token = store.issue(admin());

        assert!(store.validate(&token.id).is_ok());
        store.remove(&token.id);
        assert_eq!(store.validate(&token.id), Err(QrError::NotFound));
    }

    #[test]
    fn issue_sweeps_expired_entries() {
        let store = QrStore::new(0); // every entry expires the instant it is created
        store.issue(admin());
        store.issue(admin());

        // the second issuance sweeps the first, dead entry; only the newest
        // (also already expired) remains until the next sweep
        assert_eq!(store.active_count(), 1);

        store.sweep_expired();
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn data_url_is_svg_base64() {
        let url = render_data_url("a3f9c2e1d4b5a6978877665544332211").unwrap();
        assert!(url.starts_with("data:image/svg+xml;base64,"));
    }
}
