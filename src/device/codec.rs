//! The wire format of the LED characteristic.
//!
//! Payloads are JSON text, sent as utf-8 bytes. The firmware parses the written value with a
//! JSON parser and answers reads with `{"isOn":bool}`.

use std::str;
use serde_json::Value;

use crate::device::types::{LedCommand, LedStatus};
use crate::error::CodecError;

pub fn encode_command(command: &LedCommand) -> Result<Vec<u8>, CodecError> {
    let text = serde_json::to_string(command)?;
    Ok(text.into_bytes())
}

pub fn decode_command(bytes: &[u8]) -> Result<LedCommand, CodecError> {
    let text = str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}

pub fn decode_status(bytes: &[u8]) -> Result<LedStatus, CodecError> {
    let text = str::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(text.trim_end_matches('\0'))?;
    Ok(LedStatus(value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn command_wire_format() {
        assert_eq!(encode_command(&LedCommand::ON).unwrap(), br#"{"command":"on"}"#.to_vec());
        assert_eq!(encode_command(&LedCommand::OFF).unwrap(), br#"{"command":"off"}"#.to_vec());
    }

    #[test]
    fn command_round_trip() {
        let bytes = encode_command(&LedCommand::ON).unwrap();
        assert_eq!(decode_command(&bytes).unwrap(), LedCommand::ON);

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"command": "on"}));
    }

    #[test]
    fn status_decodes_any_json() {
        assert_eq!(decode_status(br#"{"isOn":true}"#).unwrap(), LedStatus(json!({"isOn": true})));
        assert_eq!(decode_status(b"42").unwrap(), LedStatus(json!(42)));
    }

    #[test]
    fn status_tolerates_trailing_nul() {
        assert_eq!(decode_status(b"{\"isOn\":false}\0").unwrap().is_on(), Some(false));
    }

    #[test]
    fn malformed_status() {
        assert!(matches!(decode_status(b"{isOn:"), Err(CodecError::JsonError { .. })));
        assert!(matches!(decode_status(&[0xff, 0xfe]), Err(CodecError::Utf8Error { .. })));
    }
}
