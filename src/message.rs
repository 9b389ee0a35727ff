use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::{parse_parts, quote, unquote};

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: expected 7 segments, got {0}")]
    Segments(usize),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid utf-8")]
    Utf8,
}

/// Message exchanged on plumbing ports. The wire form is seven
/// newline-separated segments: src, dst, wdir, type, attr, ndata, data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    pub src: String,
    pub dst: String,
    pub wdir: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attr: HashMap<String, String>,
    pub ndata: usize,
    pub data: String,
}

impl Message {
    pub fn new(src: &str, dst: &str, wdir: &str, kind: &str, data: &str) -> Self {
        let kind = if kind.is_empty() { "text" } else { kind };
        Message {
            src: src.to_string(),
            dst: dst.to_string(),
            wdir: wdir.to_string(),
            kind: kind.to_string(),
            attr: HashMap::new(),
            ndata: data.len(),
            data: data.to_string(),
        }
    }

    /// Parse a message from its wire form.
    pub fn parse(input: &str) -> Result<Self, MessageError> {
        let parts: Vec<&str> = input.split('\n').collect();
        if parts.len() != 7 {
            return Err(MessageError::Segments(parts.len()));
        }
        let mut msg = Message {
            src: parts[0].to_string(),
            dst: parts[1].to_string(),
            wdir: parts[2].to_string(),
            kind: parts[3].to_string(),
            attr: unpack_attr(parts[4]),
            ndata: parts[5].parse().unwrap_or(0),
            data: String::new(),
        };
        msg.data = unpack_data(parts[6])?;
        msg.ndata = msg.data.len();
        Ok(msg)
    }

    /// The attribute map as a space-separated `key=value` string, values
    /// quoted where needed. Keys come out in sorted order.
    pub fn attr_string(&self) -> String {
        let mut keys: Vec<&String> = self.attr.keys().collect();
        keys.sort();
        keys.iter()
            .map(|k| format!("{}={}", k, quote(&self.attr[*k])))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Read a field by its wire name.
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "src" => Some(self.src.clone()),
            "dst" => Some(self.dst.clone()),
            "wdir" => Some(self.wdir.clone()),
            "type" => Some(self.kind.clone()),
            "attr" => Some(self.attr_string()),
            "ndata" => Some(self.ndata.to_string()),
            "data" => Some(self.data.clone()),
            _ => None,
        }
    }

    /// Write a field by its wire name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        match name {
            "src" => self.src = value.to_string(),
            "dst" => self.dst = value.to_string(),
            "wdir" => self.wdir = value.to_string(),
            "type" => self.kind = value.to_string(),
            "attr" => self.attr = unpack_attr(value),
            "data" => {
                self.data = value.to_string();
                self.ndata = self.data.len();
            }
            _ => return false,
        }
        true
    }

    fn pack_data(&self) -> String {
        if self.data.contains('\n') {
            format!("base64:{}", BASE64_STANDARD.encode(self.data.as_bytes()))
        } else {
            self.data.clone()
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packed = self.pack_data();
        write!(
            f,
            "{}\n{}\n{}\n{}\n{}\n{}\n{}",
            self.src,
            self.dst,
            self.wdir,
            self.kind,
            self.attr_string(),
            packed.len(),
            packed
        )
    }
}

/// Parse an attribute string into a map. Each part splits on the first `=`;
/// quoted values lose their quotes. Parts without `=` are dropped.
pub fn unpack_attr(s: &str) -> HashMap<String, String> {
    let mut attr = HashMap::new();
    for part in parse_parts(s) {
        if let Some((key, value)) = part.split_once('=') {
            attr.insert(key.to_string(), unquote(value, None));
        }
    }
    attr
}

fn unpack_data(input: &str) -> Result<String, MessageError> {
    if let Some(encoded) = input.strip_prefix("base64:") {
        let raw = BASE64_STANDARD.decode(encoded)?;
        return String::from_utf8(raw).map_err(|_| MessageError::Utf8);
    }
    Ok(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &str = "lola\nouterspace\n/home/glenda\ntest\ncat=url type=web\n16\nhttps://p9f.org/";

    #[test]
    fn parse_and_serialise_round_trip() {
        let msg = Message::parse(WIRE).unwrap();
        assert_eq!(msg.src, "lola");
        assert_eq!(msg.kind, "test");
        assert_eq!(msg.ndata, 16);
        assert_eq!(msg.attr.get("cat").map(String::as_str), Some("url"));

        let out = msg.to_string();
        let want: Vec<&str> = WIRE.split('\n').collect();
        let got: Vec<&str> = out.split('\n').collect();
        for i in 0..7 {
            if i == 4 {
                let mut w: Vec<&str> = want[4].split(' ').collect();
                let mut g: Vec<&str> = got[4].split(' ').collect();
                w.sort();
                g.sort();
                assert_eq!(w, g);
            } else {
                assert_eq!(want[i], got[i], "segment {i}");
            }
        }
    }

    #[test]
    fn multiline_data_packs_as_base64() {
        let msg = Message {
            data: WIRE.to_string(),
            ..Message::default()
        };
        let want = "base64:bG9sYQpvdXRlcnNwYWNlCi9ob21lL2dsZW5kYQp0ZXN0CmNhdD11cmwgdHlwZT13ZWIKMTYKaHR0cHM6Ly9wOWYub3JnLw==";
        assert_eq!(msg.pack_data(), want);
    }

    #[test]
    fn base64_payload_round_trip() {
        let msg = Message::new("src", "", "/tmp", "", "a\nb");
        assert_eq!(msg.ndata, 3);
        let wire = msg.to_string();
        assert!(wire.contains("base64:"));
        let back = Message::parse(&wire).unwrap();
        assert_eq!(back.data, "a\nb");
        assert_eq!(back.ndata, 3);
    }

    #[test]
    fn quoted_attr_values_round_trip() {
        let mut msg = Message::new("s", "", "", "", "x");
        msg.attr
            .insert("title".to_string(), "two words".to_string());
        msg.attr.insert("cat".to_string(), "url".to_string());
        let wire = msg.to_string();
        let back = Message::parse(&wire).unwrap();
        assert_eq!(back.attr.get("title").map(String::as_str), Some("two words"));
        assert_eq!(back.attr.get("cat").map(String::as_str), Some("url"));
    }

    #[test]
    fn malformed_wire_is_rejected() {
        assert!(matches!(
            Message::parse("only\nfour\nsegments\nhere"),
            Err(MessageError::Segments(4))
        ));
        assert!(Message::parse("s\nd\nw\nt\n\n4\nbase64:!!!!").is_err());
    }

    #[test]
    fn set_refreshes_ndata() {
        let mut msg = Message::new("", "", "", "", "abc");
        assert!(msg.set("data", "longer payload"));
        assert_eq!(msg.ndata, "longer payload".len());
        assert!(!msg.set("bogus", "x"));
    }

    #[test]
    fn type_defaults_to_text() {
        let msg = Message::new("src", "dst", "/", "", "hello");
        assert_eq!(msg.kind, "text");
    }
}
