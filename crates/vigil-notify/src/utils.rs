//! Helpers shared by providers and log output.

use serde_json::Value;

/// Longest response body kept in an error.
pub const MAX_BODY_LENGTH: usize = 2000;

/// Cuts `s` to at most `max_len` bytes on a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "passwd", "token", "secret", "api_key", "apikey", "authorization"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Replaces the values of credential-like keys with `"***"`, recursively.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let redacted = if is_sensitive_key(key) && !val.is_null() {
                        Value::String("***".to_string())
                    } else {
                        redact_sensitive_json(val)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
        // "é" is two bytes; cutting at 1 must back off to 0
        assert_eq!(truncate_string("é", 1), "... [truncated]");
    }

    #[test]
    fn redacts_nested_credentials() {
        let json = serde_json::json!({
            "type": "webhook",
            "url": "https://hooks.example.com",
            "bearer_token": "abc",
            "headers": { "Authorization": "Bearer abc", "X-Team": "ops" },
            "secret": null,
        });
        let redacted = redact_sensitive_json(&json);
        assert_eq!(redacted["url"], "https://hooks.example.com");
        assert_eq!(redacted["bearer_token"], "***");
        assert_eq!(redacted["headers"]["Authorization"], "***");
        assert_eq!(redacted["headers"]["X-Team"], "ops");
        assert!(redacted["secret"].is_null());
    }
}
