//! Correlation types for request tracking across the context boundary
//!
//! A [`RequestId`] is chosen by the caller and echoed verbatim in the reply,
//! so it keeps whatever JSON shape the caller sent (number or string).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-chosen correlation token for one request/response pair
///
/// Any JSON number is accepted: integers keep their integer form, and
/// fractional or out-of-range values are held as `Float`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

// Float ids compare and hash by bit pattern so they can key the pending map
impl PartialEq for RequestId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RequestId::Number(a), RequestId::Number(b)) => a == b,
            (RequestId::Unsigned(a), RequestId::Unsigned(b)) => a == b,
            (RequestId::Float(a), RequestId::Float(b)) => a.to_bits() == b.to_bits(),
            (RequestId::Text(a), RequestId::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for RequestId {}

impl std::hash::Hash for RequestId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RequestId::Number(n) => n.hash(state),
            RequestId::Unsigned(n) => n.hash(state),
            RequestId::Float(f) => f.to_bits().hash(state),
            RequestId::Text(s) => s.hash(state),
        }
    }
}

impl RequestId {
    /// Generate a new random textual RequestId using UUIDv7
    pub fn new() -> Self {
        Self::Text(Uuid::now_v7().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<f64> for RequestId {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Unsigned(n) => write!(f, "{}", n),
            RequestId::Float(n) => write!(f, "{}", n),
            RequestId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Identifier of one execution context (worker) instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    /// Generate a new random ContextId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        assert_ne!(id1, id2);
        assert!(!id1.to_string().is_empty());
    }

    #[test]
    fn test_numeric_id_keeps_json_shape() {
        let id: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(id, RequestId::Number(7));
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn test_text_id_keeps_json_shape() {
        let id: RequestId = serde_json::from_str("\"req-1\"").unwrap();
        assert_eq!(id, RequestId::from("req-1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-1\"");
    }

    #[test]
    fn test_fractional_id_keeps_json_shape() {
        let id: RequestId = serde_json::from_str("1.5").unwrap();
        assert_eq!(id, RequestId::Float(1.5));
        assert_eq!(serde_json::to_string(&id).unwrap(), "1.5");
    }

    #[test]
    fn test_id_above_i64_range() {
        let id: RequestId = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(id, RequestId::Unsigned(u64::MAX));
        assert_eq!(serde_json::to_string(&id).unwrap(), "18446744073709551615");
    }

    #[test]
    fn test_float_ids_key_a_map() {
        let mut pending = std::collections::HashMap::new();
        pending.insert(RequestId::Float(1.5), "first");
        pending.insert(RequestId::Number(1), "second");

        assert_eq!(pending.get(&RequestId::from(1.5)), Some(&"first"));
        assert_eq!(pending.get(&RequestId::Float(1.0)), None);
    }

    #[test]
    fn test_number_and_text_are_distinct() {
        assert_ne!(RequestId::Number(1), RequestId::from("1"));
    }

    #[test]
    fn test_context_id_display() {
        let id = ContextId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }
}
