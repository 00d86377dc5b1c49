use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Parses and sanitizes a raw body. Non-JSON bodies are summarized by size.
pub fn sanitize_payload(payload: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(payload) {
        Ok(value) => sanitize_json(&value),
        Err(_) => Value::String(format!("<{} bytes, not json>", payload.len())),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    let key = key.to_lowercase();
    matches!(
        key.as_str(),
        "email"
            | "customer_email"
            | "phone"
            | "address"
            | "customer_details"
            | "shipping_details"
            | "password"
            | "secret"
            | "client_secret"
            | "token"
            | "api_key"
            | "authorization"
    ) || key.ends_with("_secret")
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        Value::Null => Value::Null,
        _ => Value::String("****".to_string()),
    }
}
