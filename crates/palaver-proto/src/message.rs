//! Frame envelopes.
//!
//! Both directions share the same shape: a name plus a positional
//! argument list. Argument payloads are arbitrary JSON; typed accessors
//! and the [`args!`](crate::args) macro keep handler code terse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client-to-server method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Method name, e.g. `SendMessage`.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// A server-to-client event push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Event name, e.g. `ReceiveMessage`.
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Build a `Vec<serde_json::Value>` argument list from serializable
/// expressions.
///
/// ```rust
/// use palaver_proto::args;
/// let a = args!["general", 3, true];
/// assert_eq!(a.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => { Vec::<serde_json::Value>::new() };
    ($($a:expr),+ $(,)?) => {
        // Serialize through a reference so arguments are not consumed.
        vec![$(serde_json::to_value(&$a).expect("argument serializes")),+]
    };
}

impl ClientFrame {
    /// Create an invocation frame.
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Raw positional argument.
    pub fn arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    /// String argument.
    pub fn str_arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).and_then(Value::as_str)
    }

    /// Boolean argument.
    pub fn bool_arg(&self, idx: usize) -> Option<bool> {
        self.args.get(idx).and_then(Value::as_bool)
    }

    /// Signed integer argument.
    pub fn int_arg(&self, idx: usize) -> Option<i64> {
        self.args.get(idx).and_then(Value::as_i64)
    }

    /// Unsigned integer argument (rejects negatives).
    pub fn uint_arg(&self, idx: usize) -> Option<u64> {
        self.args.get(idx).and_then(Value::as_u64)
    }

    /// Deserialize a structured argument into a DTO.
    pub fn obj_arg<T: DeserializeOwned>(&self, idx: usize) -> Option<T> {
        self.args
            .get(idx)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Decode a base64 binary argument.
    pub fn bytes_arg(&self, idx: usize) -> Option<Vec<u8>> {
        self.str_arg(idx)
            .and_then(|s| crate::payload::decode_payload_str(s).ok())
    }
}

impl ServerFrame {
    /// Create an event frame.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Raw positional argument.
    pub fn arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    /// String argument.
    pub fn str_arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).and_then(Value::as_str)
    }

    /// Deserialize a structured argument into a DTO.
    pub fn obj_arg<T: DeserializeOwned>(&self, idx: usize) -> Option<T> {
        self.args
            .get(idx)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Decode a base64 binary argument.
    pub fn bytes_arg(&self, idx: usize) -> Option<Vec<u8>> {
        self.str_arg(idx)
            .and_then(|s| crate::payload::decode_payload_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let frame = ClientFrame::new("JoinChannel", args!["general"]);
        let json = serde_json::to_string(&frame).unwrap();
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
        assert_eq!(back.str_arg(0), Some("general"));
    }

    #[test]
    fn missing_args_default_to_empty() {
        let frame: ClientFrame = serde_json::from_str(r#"{"method":"Ping"}"#).unwrap();
        assert_eq!(frame.method, "Ping");
        assert!(frame.args.is_empty());
        assert_eq!(frame.str_arg(0), None);
    }

    #[test]
    fn typed_accessors() {
        let frame = ClientFrame::new("AnswerCall", args!["call-1", true, 42]);
        assert_eq!(frame.str_arg(0), Some("call-1"));
        assert_eq!(frame.bool_arg(1), Some(true));
        assert_eq!(frame.uint_arg(2), Some(42));
        assert_eq!(frame.bool_arg(0), None);
    }
}
