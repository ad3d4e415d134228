//! Signaling payloads exchanged over the peer-connection resource.
//!
//! Every payload is UTF-8 JSON of one of two shapes:
//!
//! ```text
//! {"candidate": {"candidate": "...", "sdpMid": "0", "sdpMLineIndex": 0}}
//! {"sdp": {"type": "offer", "sdp": "v=0..."}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FarviewError;

// ── IceCandidate ─────────────────────────────────────────────────

/// A connectivity candidate discovered by either peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

// ── SessionDescription ───────────────────────────────────────────

/// Role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An SDP blob tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

// ── Signal ───────────────────────────────────────────────────────

/// One signaling message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Candidate { candidate: IceCandidate },
    Sdp { sdp: SessionDescription },
}

impl Signal {
    /// Parse a signaling payload.
    pub fn parse(text: &str) -> Result<Self, FarviewError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, FarviewError> {
        serde_json::to_string(self).map_err(|e| FarviewError::Other(e.to_string()))
    }

    /// Parse a payload that must carry an ICE candidate.
    pub fn parse_candidate(text: &str) -> Result<IceCandidate, FarviewError> {
        match Self::parse(text)? {
            Signal::Candidate { candidate } => Ok(candidate),
            Signal::Sdp { .. } => Err(FarviewError::MalformedSignal(
                "expected candidate, got sdp".into(),
            )),
        }
    }

    /// Parse a payload that must carry a session description.
    pub fn parse_sdp(text: &str) -> Result<SessionDescription, FarviewError> {
        match Self::parse(text)? {
            Signal::Sdp { sdp } => Ok(sdp),
            Signal::Candidate { .. } => Err(FarviewError::MalformedSignal(
                "expected sdp, got candidate".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_shape() {
        let mut c = IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host");
        c.sdp_mid = Some("0".into());
        c.sdp_m_line_index = Some(0);
        let json = Signal::Candidate { candidate: c.clone() }.to_json().unwrap();
        assert!(json.starts_with("{\"candidate\":{"));
        assert!(json.contains("\"sdpMLineIndex\":0"));
        assert_eq!(Signal::parse_candidate(&json).unwrap(), c);
    }

    #[test]
    fn sdp_shape() {
        let json = r#"{"sdp":{"type":"answer","sdp":"v=0"}}"#;
        let sdp = Signal::parse_sdp(json).unwrap();
        assert_eq!(sdp, SessionDescription::answer("v=0"));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let json = r#"{"sdp":{"type":"offer","sdp":"v=0"}}"#;
        assert!(matches!(
            Signal::parse_candidate(json),
            Err(FarviewError::MalformedSignal(_))
        ));
        assert!(matches!(
            Signal::parse("{\"bogus\": 1}"),
            Err(FarviewError::MalformedSignal(_))
        ));
    }
}
