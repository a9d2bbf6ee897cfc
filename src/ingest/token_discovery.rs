//! Token discovery
//!
//! Upstream auth endpoints disagree wildly on field naming, so token
//! extraction is a best-effort scan over prioritized alias lists. The lists
//! and their order are a compatibility contract inherited from the observed
//! upstream variety; do not reorder or extend them casually.

use serde_json::{Map, Value as JsonValue};

/// Access token field names, scanned in priority order.
const ACCESS_TOKEN_KEYS: &[&str] = &[
    "access_token",
    "accessToken",
    "token",
    "access",
    "jwt",
    "id_token",
    "bearer",
];

/// Refresh token field names, scanned in priority order.
const REFRESH_TOKEN_KEYS: &[&str] = &["refresh_token", "refreshToken", "refresh"];

/// Expiry field names, scanned in priority order.
const EXPIRY_KEYS: &[&str] = &["expires_in", "expiresIn", "expires", "expiry", "expires_at"];

/// Best-effort tokens pulled out of an arbitrary auth response.
///
/// Absent fields stay empty/zero; discovery itself never fails. A source
/// whose response yields no access token simply fails authentication later,
/// when the retried request is rejected again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: u64,
}

impl DiscoveredTokens {
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Scan a decoded auth response for token material.
///
/// For each alias list the first key present with a usable value wins. Keys
/// of the wrong type are ignored, not errors. Expiry accepts integer and
/// floating-point representations; floats truncate.
pub fn discover_tokens(body: &Map<String, JsonValue>) -> DiscoveredTokens {
    DiscoveredTokens {
        access_token: first_string(body, ACCESS_TOKEN_KEYS),
        refresh_token: first_string(body, REFRESH_TOKEN_KEYS),
        expires_in_seconds: first_seconds(body, EXPIRY_KEYS),
    }
}

fn first_string(body: &Map<String, JsonValue>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(JsonValue::String(value)) = body.get(*key)
            && !value.is_empty()
        {
            return value.clone();
        }
    }
    String::new()
}

fn first_seconds(body: &Map<String, JsonValue>, keys: &[&str]) -> u64 {
    for key in keys {
        match body.get(*key) {
            Some(JsonValue::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    return v;
                }
                if let Some(v) = n.as_f64()
                    && v > 0.0
                {
                    return v as u64;
                }
            }
            _ => continue,
        }
    }
    0
}
