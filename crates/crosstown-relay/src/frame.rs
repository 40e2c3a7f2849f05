//! The `REQ`/`CLOSE`/`EVENT`/`EOSE`/`NOTICE`/`OK` array frames.
//!
//! Hand-rolled (de)serialization, the same way `crosstown_types::PacketResponse`
//! hand-rolls its `{accept, ...}` shape: the wire discriminant here is the
//! first element of a JSON array, not a tagged-object representation serde
//! derives directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crosstown_types::{Filter, SignedEvent};

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
    Event(Box<SignedEvent>),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("empty frame")]
    Empty,
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl ClientFrame {
    /// Serializes this frame the way a dialing client (e.g. the bootstrap
    /// discovery dial) sends it, mirroring `ServerFrame::to_text` below.
    pub fn to_text(&self) -> String {
        let value = match self {
            ClientFrame::Req { sub_id, filters } => {
                let mut items = vec![serde_json::json!("REQ"), serde_json::json!(sub_id)];
                items.extend(filters.iter().map(|f| serde_json::to_value(f).unwrap()));
                Value::Array(items)
            }
            ClientFrame::Close { sub_id } => serde_json::json!(["CLOSE", sub_id]),
            ClientFrame::Event(event) => serde_json::json!(["EVENT", event]),
        };
        value.to_string()
    }

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let Value::Array(mut items) = value else { return Err(FrameError::NotAnArray) };
        if items.is_empty() {
            return Err(FrameError::Empty);
        }
        let frame_type = items.remove(0);
        let frame_type = frame_type.as_str().ok_or_else(|| FrameError::Malformed("frame type must be a string".to_string()))?;

        match frame_type {
            "REQ" => {
                if items.is_empty() {
                    return Err(FrameError::Malformed("REQ requires a subscription id".to_string()));
                }
                let sub_id = items
                    .remove(0)
                    .as_str()
                    .ok_or_else(|| FrameError::Malformed("subscription id must be a string".to_string()))?
                    .to_string();
                let filters = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<Filter>, _>>()
                    .map_err(|e| FrameError::Malformed(e.to_string()))?;
                Ok(ClientFrame::Req { sub_id, filters })
            }
            "CLOSE" => {
                let sub_id = items
                    .first()
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| FrameError::Malformed("CLOSE requires a subscription id".to_string()))?
                    .to_string();
                Ok(ClientFrame::Close { sub_id })
            }
            "EVENT" => {
                let event_value = items.into_iter().next().ok_or_else(|| FrameError::Malformed("EVENT requires an event".to_string()))?;
                let event: SignedEvent = serde_json::from_value(event_value).map_err(|e| FrameError::Malformed(e.to_string()))?;
                Ok(ClientFrame::Event(Box::new(event)))
            }
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Event { sub_id: String, event: SignedEvent },
    Eose { sub_id: String },
    Notice(String),
    Ok { event_id: String, accepted: bool, message: String },
}

impl ServerFrame {
    /// Parses a frame the way a dialing client reads what the relay sends
    /// back, mirroring `ClientFrame::parse` above.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let Value::Array(mut items) = value else { return Err(FrameError::NotAnArray) };
        if items.is_empty() {
            return Err(FrameError::Empty);
        }
        let frame_type = items.remove(0);
        let frame_type = frame_type.as_str().ok_or_else(|| FrameError::Malformed("frame type must be a string".to_string()))?;

        match frame_type {
            "EVENT" => {
                if items.len() < 2 {
                    return Err(FrameError::Malformed("EVENT requires a subscription id and event".to_string()));
                }
                let sub_id = items
                    .remove(0)
                    .as_str()
                    .ok_or_else(|| FrameError::Malformed("subscription id must be a string".to_string()))?
                    .to_string();
                let event = serde_json::from_value(items.remove(0)).map_err(|e| FrameError::Malformed(e.to_string()))?;
                Ok(ServerFrame::Event { sub_id, event })
            }
            "EOSE" => {
                let sub_id = items
                    .first()
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| FrameError::Malformed("EOSE requires a subscription id".to_string()))?
                    .to_string();
                Ok(ServerFrame::Eose { sub_id })
            }
            "NOTICE" => {
                let message = items.first().and_then(|v| v.as_str()).unwrap_or_default().to_string();
                Ok(ServerFrame::Notice(message))
            }
            "OK" => {
                if items.len() < 3 {
                    return Err(FrameError::Malformed("OK requires eventId, accepted, message".to_string()));
                }
                let event_id = items[0].as_str().unwrap_or_default().to_string();
                let accepted = items[1].as_bool().unwrap_or(false);
                let message = items[2].as_str().unwrap_or_default().to_string();
                Ok(ServerFrame::Ok { event_id, accepted, message })
            }
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }

    pub fn to_text(&self) -> String {
        let value = match self {
            ServerFrame::Event { sub_id, event } => {
                serde_json::json!(["EVENT", sub_id, event])
            }
            ServerFrame::Eose { sub_id } => serde_json::json!(["EOSE", sub_id]),
            ServerFrame::Notice(message) => serde_json::json!(["NOTICE", message]),
            ServerFrame::Ok { event_id, accepted, message } => {
                serde_json::json!(["OK", event_id, accepted, message])
            }
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_with_single_filter_parses() {
        let text = r#"["REQ", "sub1", {"kinds": [1]}]"#;
        let frame = ClientFrame::parse(text).unwrap();
        assert_eq!(frame, ClientFrame::Req { sub_id: "sub1".to_string(), filters: vec![Filter { kinds: vec![1], ..Default::default() }] });
    }

    #[test]
    fn req_with_no_filters_parses_to_empty_vec() {
        let text = r#"["REQ", "sub1"]"#;
        let frame = ClientFrame::parse(text).unwrap();
        assert_eq!(frame, ClientFrame::Req { sub_id: "sub1".to_string(), filters: vec![] });
    }

    #[test]
    fn close_parses() {
        let text = r#"["CLOSE", "sub1"]"#;
        assert_eq!(ClientFrame::parse(text).unwrap(), ClientFrame::Close { sub_id: "sub1".to_string() });
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let err = ClientFrame::parse(r#"["PING"]"#).unwrap_err();
        assert_eq!(err, FrameError::UnknownType("PING".to_string()));
    }

    #[test]
    fn non_array_frame_is_rejected() {
        let err = ClientFrame::parse(r#"{"type": "REQ"}"#).unwrap_err();
        assert_eq!(err, FrameError::NotAnArray);
    }

    #[test]
    fn empty_array_frame_is_rejected() {
        assert_eq!(ClientFrame::parse("[]").unwrap_err(), FrameError::Empty);
    }

    #[test]
    fn eose_frame_serializes_as_two_element_array() {
        let frame = ServerFrame::Eose { sub_id: "sub1".to_string() };
        assert_eq!(frame.to_text(), r#"["EOSE","sub1"]"#);
    }

    #[test]
    fn notice_frame_serializes() {
        assert_eq!(ServerFrame::Notice("slow consumer".to_string()).to_text(), r#"["NOTICE","slow consumer"]"#);
    }

    #[test]
    fn client_req_round_trips_through_to_text_and_parse() {
        let frame = ClientFrame::Req { sub_id: "sub1".to_string(), filters: vec![Filter { kinds: vec![10032], ..Default::default() }] };
        let parsed = ClientFrame::parse(&frame.to_text()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn server_eose_round_trips_through_to_text_and_parse() {
        let frame = ServerFrame::Eose { sub_id: "sub1".to_string() };
        assert_eq!(ServerFrame::parse(&frame.to_text()).unwrap(), frame);
    }

    #[test]
    fn server_notice_parses() {
        assert_eq!(ServerFrame::parse(r#"["NOTICE", "slow consumer"]"#).unwrap(), ServerFrame::Notice("slow consumer".to_string()));
    }
}
