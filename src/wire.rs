//! Outbound wire format: one JSON object per tick

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Heading message sent as a single text frame
///
/// ```text
/// {"azimuth":<degrees>}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingMessage {
    pub azimuth: f32,
}

impl HeadingMessage {
    /// Message carrying a heading in degrees
    pub fn new(azimuth: f32) -> Self {
        Self { azimuth }
    }

    /// Serialize to the frame payload
    ///
    /// # Example
    /// ```
    /// use compass_stream::wire::HeadingMessage;
    ///
    /// assert_eq!(HeadingMessage::new(0.0).encode().unwrap(), r#"{"azimuth":0.0}"#);
    /// ```
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a frame payload; used by receivers and tests
    pub fn decode(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_shape() {
        assert_eq!(HeadingMessage::new(300.0).encode().unwrap(), r#"{"azimuth":300.0}"#);
        assert_eq!(HeadingMessage::new(12.5).encode().unwrap(), r#"{"azimuth":12.5}"#);
    }

    #[test]
    fn test_decode_rejects_other_shapes() {
        assert!(HeadingMessage::decode(r#"{"heading":1.0}"#).is_err());
        assert!(HeadingMessage::decode("not json").is_err());
        assert_eq!(
            HeadingMessage::decode(r#"{"azimuth":42.0}"#).unwrap(),
            HeadingMessage::new(42.0)
        );
    }
}
