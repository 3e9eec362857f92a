// client-core/src/token.rs
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Result of inspecting a bearer token without contacting the server.
///
/// `valid` is true only when the token decodes into three segments, the
/// payload parses, and any `exp` claim lies in the future. A token with no
/// `exp` claim is treated as non-expiring for this check; whether that is
/// acceptable is the caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAnalysis {
    pub valid: bool,
    pub reason: Option<String>,
    pub payload: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

impl TokenAnalysis {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            payload: None,
            expires_at: None,
            is_expired: false,
        }
    }
}

/// Structural and expiry inspection of a bearer token. Total: never panics,
/// never errors, always returns an analysis.
pub fn analyze(token: Option<&str>) -> TokenAnalysis {
    analyze_at(token, Utc::now())
}

/// Same as [`analyze`] with an injected evaluation time
pub fn analyze_at(token: Option<&str>, now: DateTime<Utc>) -> TokenAnalysis {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return TokenAnalysis::invalid("No token provided"),
    };

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return TokenAnalysis::invalid(format!(
            "Expected 3 token segments, found {}",
            segments.len()
        ));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return TokenAnalysis::invalid("Token contains an empty segment");
    }

    // Header must decode even though only the payload is inspected
    if let Err(e) = decode_segment(segments[0]) {
        return TokenAnalysis::invalid(format!("Failed to decode token header: {}", e));
    }

    let payload = match decode_segment(segments[1]) {
        Ok(value) => value,
        Err(e) => {
            return TokenAnalysis::invalid(format!("Failed to decode token payload: {}", e));
        }
    };

    // Some issuers emit `exp` as a float; truncate to whole seconds
    let expires_at = payload
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|secs| secs as i64)))
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    let is_expired = expires_at.map(|at| now >= at).unwrap_or(false);

    TokenAnalysis {
        valid: !is_expired,
        reason: is_expired.then(|| "Token expired".to_string()),
        payload: Some(payload),
        expires_at,
        is_expired,
    }
}

fn decode_segment(segment: &str) -> Result<Value, String> {
    let bytes = base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

/// Build an unsigned three-segment token for tests
#[cfg(test)]
pub(crate) fn make_token(payload: &Value) -> String {
    let encode =
        |v: &Value| base64::encode_config(v.to_string(), base64::URL_SAFE_NO_PAD);
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    format!("{}.{}.signature", encode(&header), encode(payload))
}
