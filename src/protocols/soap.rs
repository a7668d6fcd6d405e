//! SOAP/CWMP envelope codec — wraps the external XML tokenizer.
//!
//! This module is the crate's only caller of `quick_xml`; every other
//! module works with pre-rendered XML fragments and lets `soap` handle the
//! prologue, the header/body wrapper, and entity encode/decode.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

const ENVELOPE_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap-env:Envelope
  xmlns:soap-enc="http://schemas.xmlsoap.org/soap/encoding/"
  xmlns:soap-env="http://schemas.xmlsoap.org/soap/envelope/"
  xmlns:xsd="http://www.w3.org/2001/XMLSchema"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
  xmlns:cwmp="urn:dslforum-org:cwmp-1-0">"#;

/// Wrap `body_xml` in the standard CWMP envelope carrying `request_id` in
/// the header.
pub fn build_envelope(request_id: &str, body_xml: &str) -> String {
    format!(
        "{ENVELOPE_OPEN}\n  <soap-env:Header>\n    <cwmp:ID soap-env:mustUnderstand=\"1\">{id}</cwmp:ID>\n  </soap-env:Header>\n  <soap-env:Body>{body}</soap-env:Body>\n</soap-env:Envelope>",
        id = encode_text(request_id),
        body = body_xml,
    )
}

/// Builds a `cwmp:Fault` envelope carrying the given fault code and string.
pub fn build_fault_envelope(request_id: &str, fault_code: u32, fault_string: &str) -> String {
    let body = format!(
        "<soap-env:Fault>\n      <faultcode>Client</faultcode>\n      <faultstring>CWMP fault</faultstring>\n      <detail>\n        <cwmp:Fault>\n          <FaultCode>{code}</FaultCode>\n          <FaultString>{msg}</FaultString>\n        </cwmp:Fault>\n      </detail>\n    </soap-env:Fault>",
        code = fault_code,
        msg = encode_text(fault_string),
    );
    build_envelope(request_id, &body)
}

pub struct ParsedEnvelope {
    pub request_id: String,
    /// Local name of the first `cwmp:`-prefixed child of Body, e.g. `Inform`.
    pub method_local_name: Option<String>,
    /// Raw inner XML of that child element, for the handler to pick apart.
    pub body_inner_xml: String,
}

/// Parse an ACS response envelope. Returns `None` for an empty body, which
/// signals the ACS has nothing more to say and the session should close.
pub fn parse_envelope(xml: &str) -> Result<Option<ParsedEnvelope>> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut reader = Reader::from_str(trimmed);
    reader.trim_text(true);

    let mut request_id = String::new();
    let mut method_local_name: Option<String> = None;
    let mut body_inner_xml = String::new();

    let mut in_header_id = false;
    let mut in_body = false;
    let mut body_depth: i32 = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qname_local(e.name().as_ref());
                if name == "ID" {
                    in_header_id = true;
                } else if name == "Body" {
                    in_body = true;
                } else if in_body {
                    body_depth += 1;
                    if method_local_name.is_none() {
                        method_local_name = Some(name.to_string());
                    } else {
                        body_inner_xml.push('<');
                        body_inner_xml.push_str(std::str::from_utf8(e.name().as_ref()).unwrap_or(""));
                        body_inner_xml.push('>');
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if in_header_id {
                    request_id.push_str(&t.unescape().unwrap_or_default());
                } else if in_body && body_depth > 1 {
                    body_inner_xml.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => {
                let name = qname_local(e.name().as_ref());
                if name == "ID" {
                    in_header_id = false;
                } else if name == "Body" {
                    in_body = false;
                } else if in_body {
                    if body_depth > 1 {
                        body_inner_xml.push_str("</");
                        body_inner_xml.push_str(std::str::from_utf8(e.name().as_ref()).unwrap_or(""));
                        body_inner_xml.push('>');
                    }
                    body_depth -= 1;
                }
            }
            Ok(Event::Empty(e)) => {
                if in_body {
                    let name = qname_local(e.name().as_ref());
                    if method_local_name.is_none() {
                        method_local_name = Some(name.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::soap(format!("malformed SOAP envelope: {e}"))),
        }
        buf.clear();
    }

    Ok(Some(ParsedEnvelope {
        request_id,
        method_local_name,
        body_inner_xml,
    }))
}

fn qname_local(raw: &[u8]) -> &str {
    let full = std::str::from_utf8(raw).unwrap_or("");
    full.rsplit(':').next().unwrap_or(full)
}

/// Entity-encode text for inclusion in an element body.
pub fn encode_text(s: &str) -> String {
    escape(s).into_owned()
}

pub fn decode_text(s: &str) -> String {
    unescape(s).map(|c| c.into_owned()).unwrap_or_else(|_| s.to_string())
}

/// Flattened text content of every element with local name `tag`, in
/// document order. Handlers use this for simple repeated leaves
/// (`ParameterNames/string`, `Reboot/CommandKey`, ...).
pub fn elements_with_tag(xml: &str, tag: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<(String, String)> = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push((qname_local(e.name().as_ref()).to_string(), String::new()));
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.1.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(_)) => {
                if let Some((name, text)) = stack.pop() {
                    if name == tag {
                        out.push(text);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if qname_local(e.name().as_ref()) == tag {
                    out.push(String::new());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }
    out
}

pub fn first_element(xml: &str, tag: &str) -> Option<String> {
    elements_with_tag(xml, tag).into_iter().next()
}

/// Raw (still-encoded) inner XML of every top-level-under-`xml` element with
/// local name `tag`, used to pick apart repeated structs like
/// `ParameterValueStruct{Name,Value}` one occurrence at a time.
pub fn raw_elements_with_tag(xml: &str, tag: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut out = Vec::new();

    loop {
        let pos_before = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qname_local(e.name().as_ref()).to_string();
                let content_start = reader.buffer_position();
                stack.push((name, content_start));
            }
            Ok(Event::End(_)) => {
                if let Some((name, start)) = stack.pop() {
                    if name == tag && pos_before >= start && pos_before <= xml.len() {
                        out.push(xml[start..pos_before].to_string());
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if qname_local(e.name().as_ref()) == tag {
                    out.push(String::new());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }
    out
}

/// The `xsi:type` attribute on a `Value` element, if present.
pub fn xsi_type_attr(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if qname_local(e.name().as_ref()) == tag {
                    for attr in e.attributes().flatten() {
                        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                        if key.ends_with(":type") || key == "type" {
                            return Some(String::from_utf8_lossy(&attr.value).to_string());
                        }
                    }
                    return None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_round_trip_is_identity() {
        let original = "5 < 10 & \"quoted\" 'value'";
        assert_eq!(decode_text(&encode_text(original)), original);
    }

    #[test]
    fn build_envelope_contains_request_id_and_body() {
        let env = build_envelope("ab12cd34", "<cwmp:InformResponse><MaxEnvelopes>1</MaxEnvelopes></cwmp:InformResponse>");
        assert!(env.contains("ab12cd34"));
        assert!(env.contains("InformResponse"));
    }

    #[test]
    fn empty_body_parses_to_none() {
        assert!(parse_envelope("").unwrap().is_none());
        assert!(parse_envelope("   ").unwrap().is_none());
    }

    #[test]
    fn parse_extracts_request_id_and_method_name() {
        let xml = build_envelope(
            "xyz789ab",
            "<cwmp:Reboot><CommandKey>abc</CommandKey></cwmp:Reboot>",
        );
        let parsed = parse_envelope(&xml).unwrap().unwrap();
        assert_eq!(parsed.request_id, "xyz789ab");
        assert_eq!(parsed.method_local_name.as_deref(), Some("Reboot"));
        assert!(parsed.body_inner_xml.contains("abc"));
    }

    #[test]
    fn fault_envelope_carries_code_and_string() {
        let env = build_fault_envelope("req00001", 9002, "Device not ready to accept requests");
        assert!(env.contains("<FaultCode>9002</FaultCode>"));
        assert!(env.contains("Device not ready"));
        assert!(env.contains("faultcode>Client<"));
    }

    #[test]
    fn elements_with_tag_extracts_repeated_leaves() {
        let xml = "<ParameterNames><string>A.B</string><string>A.C</string></ParameterNames>";
        assert_eq!(elements_with_tag(xml, "string"), vec!["A.B", "A.C"]);
    }

    #[test]
    fn raw_elements_with_tag_splits_struct_list() {
        let xml = "<ParameterList>\
<ParameterValueStruct><Name>A.B</Name><Value xsi:type=\"xsd:string\">1</Value></ParameterValueStruct>\
<ParameterValueStruct><Name>A.C</Name><Value xsi:type=\"xsd:boolean\">true</Value></ParameterValueStruct>\
</ParameterList>";
        let structs = raw_elements_with_tag(xml, "ParameterValueStruct");
        assert_eq!(structs.len(), 2);
        assert_eq!(first_element(&structs[0], "Name").as_deref(), Some("A.B"));
        assert_eq!(xsi_type_attr(&structs[1], "Value").as_deref(), Some("xsd:boolean"));
    }
}
