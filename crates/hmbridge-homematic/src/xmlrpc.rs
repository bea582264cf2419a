//! XML-RPC codec.
//!
//! Covers what the CCU speaks: `methodCall` / `methodResponse` documents
//! with `int`/`i4`, `boolean`, `string`, `double`, `dateTime.iso8601`,
//! `base64`, `nil`, `array` and `struct` values. Bodies are UTF-8 or, as
//! older CCU firmware sends them, ISO-8859-1.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::{HomematicError, Result};

/// Deepest `array`/`struct` nesting accepted in a document.
pub const MAX_NESTING: usize = 64;

/// XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    /// ISO 8601 text, left unparsed.
    DateTime(String),
    /// Base64 text, left encoded.
    Base64(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    fn write(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Self::Int(v) => {
                out.push_str(&format!("<int>{}</int>", v));
            }
            Self::Bool(v) => {
                out.push_str(if *v {
                    "<boolean>1</boolean>"
                } else {
                    "<boolean>0</boolean>"
                });
            }
            Self::String(v) => {
                out.push_str("<string>");
                out.push_str(&quick_xml::escape::escape(v.as_str()));
                out.push_str("</string>");
            }
            Self::Double(v) => {
                out.push_str(&format!("<double>{:?}</double>", v));
            }
            Self::DateTime(v) => {
                out.push_str("<dateTime.iso8601>");
                out.push_str(&quick_xml::escape::escape(v.as_str()));
                out.push_str("</dateTime.iso8601>");
            }
            Self::Base64(v) => {
                out.push_str("<base64>");
                out.push_str(v);
                out.push_str("</base64>");
            }
            Self::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write(out);
                }
                out.push_str("</data></array>");
            }
            Self::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&quick_xml::escape::escape(name.as_str()));
                    out.push_str("</name>");
                    value.write(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Self::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A decoded `methodCall`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// Serialize a `methodCall` document.
pub fn method_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&quick_xml::escape::escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

/// Serialize a successful `methodResponse` document.
pub fn method_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    value.write(&mut out);
    out.push_str("</param></params></methodResponse>\n");
    out
}

/// Serialize a fault `methodResponse` document.
pub fn fault_response(code: i64, message: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><fault>");
    fault_value(code, message).write(&mut out);
    out.push_str("</fault></methodResponse>\n");
    out
}

/// The `{faultCode, faultString}` struct.
pub fn fault_value(code: i64, message: &str) -> Value {
    Value::Struct(BTreeMap::from([
        ("faultCode".to_string(), Value::Int(code)),
        ("faultString".to_string(), Value::from(message)),
    ]))
}

/// Decode a body as UTF-8, falling back to ISO-8859-1.
pub fn decode_body(body: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(body) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(body.iter().map(|&b| char::from(b)).collect()),
    }
}

pub fn parse_method_call(body: &[u8]) -> Result<MethodCall> {
    let mut parser = Parser::new(&decode_body(body))?;
    parser.expect_open("methodCall")?;
    parser.expect_open("methodName")?;
    let method = parser.text_until_close("methodName")?.trim().to_string();

    let params = match parser.next_significant() {
        Some(Token::Open(name)) if name == "params" => {
            let params = parser.parse_params()?;
            parser.expect_close("methodCall")?;
            params
        }
        Some(Token::Close(name)) if name == "methodCall" => Vec::new(),
        other => return Err(unexpected(other, "params")),
    };

    Ok(MethodCall { method, params })
}

/// Parse a `methodResponse`. A fault becomes [`HomematicError::Fault`].
pub fn parse_method_response(body: &[u8]) -> Result<Value> {
    let mut parser = Parser::new(&decode_body(body))?;
    parser.expect_open("methodResponse")?;

    match parser.next_significant() {
        Some(Token::Open(name)) if name == "params" => {
            let mut params = parser.parse_params()?;
            parser.expect_close("methodResponse")?;
            Ok(if params.is_empty() {
                Value::Nil
            } else {
                params.swap_remove(0)
            })
        }
        Some(Token::Open(name)) if name == "fault" => {
            parser.expect_open("value")?;
            let fault = parser.parse_value()?;
            parser.expect_close("fault")?;

            let members = fault
                .as_struct()
                .ok_or_else(|| HomematicError::protocol("fault is not a struct"))?;
            Err(HomematicError::Fault {
                code: members.get("faultCode").and_then(Value::as_i64).unwrap_or(0),
                message: members
                    .get("faultString")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        other => Err(unexpected(other, "params or fault")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

fn unexpected(token: Option<Token>, expected: &str) -> HomematicError {
    match token {
        Some(token) => HomematicError::Protocol(format!("expected {}, found {:?}", expected, token)),
        None => HomematicError::Protocol(format!("expected {}, found end of document", expected)),
    }
}

fn xml_error(e: impl std::fmt::Display) -> HomematicError {
    HomematicError::Xml(e.to_string())
}

/// Recursive descent over a flat token list.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut tokens = Vec::new();

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => {
                    tokens.push(Token::Open(
                        String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ));
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    tokens.push(Token::Open(name.clone()));
                    tokens.push(Token::Close(name));
                }
                Event::End(e) => {
                    tokens.push(Token::Close(
                        String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ));
                }
                Event::Text(e) => {
                    tokens.push(Token::Text(e.unescape().map_err(xml_error)?.into_owned()));
                }
                Event::CData(e) => {
                    tokens.push(Token::Text(
                        String::from_utf8_lossy(&e.into_inner()).into_owned(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_whitespace(&mut self) {
        while let Some(Token::Text(text)) = self.peek() {
            if !text.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Next token that is not whitespace-only text.
    fn next_significant(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect_open(&mut self, name: &str) -> Result<()> {
        match self.next_significant() {
            Some(Token::Open(n)) if n == name => Ok(()),
            other => Err(unexpected(other, &format!("<{}>", name))),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<()> {
        match self.next_significant() {
            Some(Token::Close(n)) if n == name => Ok(()),
            other => Err(unexpected(other, &format!("</{}>", name))),
        }
    }

    /// Concatenated text up to the closing tag of `name`.
    fn text_until_close(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.tokens.get(self.pos).cloned() {
                Some(Token::Text(t)) => {
                    text.push_str(&t);
                    self.pos += 1;
                }
                Some(Token::Close(n)) if n == name => {
                    self.pos += 1;
                    return Ok(text);
                }
                other => return Err(unexpected(other, &format!("</{}>", name))),
            }
        }
    }

    /// `<param><value>..</value></param>*` up to and including `</params>`.
    fn parse_params(&mut self) -> Result<Vec<Value>> {
        let mut params = Vec::new();
        loop {
            match self.next_significant() {
                Some(Token::Open(name)) if name == "param" => {
                    self.expect_open("value")?;
                    params.push(self.parse_value()?);
                    self.expect_close("param")?;
                }
                Some(Token::Close(name)) if name == "params" => return Ok(params),
                other => return Err(unexpected(other, "<param>")),
            }
        }
    }

    /// Parse the contents of a `<value>` element, consuming its end tag.
    fn parse_value(&mut self) -> Result<Value> {
        if self.depth >= MAX_NESTING {
            return Err(HomematicError::Protocol("nesting too deep".to_string()));
        }
        self.depth += 1;
        let value = self.parse_value_inner();
        self.depth -= 1;
        value
    }

    fn parse_value_inner(&mut self) -> Result<Value> {
        let mut text = String::new();
        while let Some(Token::Text(t)) = self.peek() {
            text.push_str(t);
            self.pos += 1;
        }

        let tag = match self.tokens.get(self.pos).cloned() {
            Some(Token::Close(name)) if name == "value" => {
                self.pos += 1;
                return Ok(Value::String(text));
            }
            Some(Token::Open(tag)) => {
                self.pos += 1;
                tag
            }
            other => return Err(unexpected(other, "value content")),
        };

        let value = match tag.as_str() {
            "int" | "i4" | "i8" => {
                let text = self.text_until_close(&tag)?;
                Value::Int(text.trim().parse().map_err(|_| {
                    HomematicError::Protocol(format!("invalid integer: {}", text))
                })?)
            }
            "boolean" => match self.text_until_close(&tag)?.trim() {
                "1" | "true" => Value::Bool(true),
                "0" | "false" => Value::Bool(false),
                other => {
                    return Err(HomematicError::Protocol(format!(
                        "invalid boolean: {}",
                        other
                    )))
                }
            },
            "string" => Value::String(self.text_until_close(&tag)?),
            "double" => {
                let text = self.text_until_close(&tag)?;
                Value::Double(text.trim().parse().map_err(|_| {
                    HomematicError::Protocol(format!("invalid double: {}", text))
                })?)
            }
            "dateTime.iso8601" => Value::DateTime(self.text_until_close(&tag)?.trim().to_string()),
            "base64" => Value::Base64(self.text_until_close(&tag)?.trim().to_string()),
            "nil" => {
                self.expect_close(&tag)?;
                Value::Nil
            }
            "array" => {
                self.expect_open("data")?;
                let mut items = Vec::new();
                loop {
                    match self.next_significant() {
                        Some(Token::Open(name)) if name == "value" => {
                            items.push(self.parse_value()?)
                        }
                        Some(Token::Close(name)) if name == "data" => break,
                        other => return Err(unexpected(other, "<value>")),
                    }
                }
                self.expect_close("array")?;
                Value::Array(items)
            }
            "struct" => {
                let mut members = BTreeMap::new();
                loop {
                    match self.next_significant() {
                        Some(Token::Open(name)) if name == "member" => {
                            self.expect_open("name")?;
                            let key = self.text_until_close("name")?;
                            self.expect_open("value")?;
                            let value = self.parse_value()?;
                            self.expect_close("member")?;
                            members.insert(key, value);
                        }
                        Some(Token::Close(name)) if name == "struct" => break,
                        other => return Err(unexpected(other, "<member>")),
                    }
                }
                Value::Struct(members)
            }
            other => {
                return Err(HomematicError::Protocol(format!(
                    "unsupported type: {}",
                    other
                )))
            }
        };

        self.expect_close("value")?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_call() {
        let body = br#"<?xml version="1.0"?>
<methodCall>
  <methodName>event</methodName>
  <params>
    <param><value>mqttbridge-default</value></param>
    <param><value><string>0001D3C99C4A1F:3</string></value></param>
    <param><value>LEVEL</value></param>
    <param><value><double>0.37</double></value></param>
  </params>
</methodCall>"#;

        let call = parse_method_call(body).unwrap();
        assert_eq!(call.method, "event");
        assert_eq!(
            call.params,
            vec![
                Value::from("mqttbridge-default"),
                Value::from("0001D3C99C4A1F:3"),
                Value::from("LEVEL"),
                Value::Double(0.37),
            ]
        );
    }

    #[test]
    fn test_parse_nested_values() {
        let body = br#"<methodCall><methodName>newDevices</methodName><params>
<param><value><string>mqttbridge-default</string></value></param>
<param><value><array><data>
  <value><struct>
    <member><name>ADDRESS</name><value><string>ABC:1</string></value></member>
    <member><name>INDEX</name><value><i4>1</i4></value></member>
    <member><name>AES_ACTIVE</name><value><boolean>0</boolean></value></member>
    <member><name>CHILDREN</name><value><array><data/></array></value></member>
    <member><name>EMPTY</name><value/></member>
  </struct></value>
</data></array></value></param>
</params></methodCall>"#;

        let call = parse_method_call(body).unwrap();
        let devices = call.params[1].as_array().unwrap();
        let members = devices[0].as_struct().unwrap();
        assert_eq!(members["ADDRESS"], Value::from("ABC:1"));
        assert_eq!(members["INDEX"], Value::Int(1));
        assert_eq!(members["AES_ACTIVE"], Value::Bool(false));
        assert_eq!(members["CHILDREN"], Value::Array(Vec::new()));
        assert_eq!(members["EMPTY"], Value::from(""));
    }

    #[test]
    fn test_string_whitespace_and_entities_preserved() {
        let body = b"<methodCall><methodName>x</methodName><params>\
<param><value><string> a &amp; b </string></value></param>\
</params></methodCall>";
        let call = parse_method_call(body).unwrap();
        assert_eq!(call.params, vec![Value::from(" a & b ")]);
    }

    #[test]
    fn test_latin1_body() {
        let mut body = b"<methodCall><methodName>x</methodName><params><param><value>".to_vec();
        body.extend_from_slice(&[b'K', 0xfc, b'c', b'h', b'e']);
        body.extend_from_slice(b"</value></param></params></methodCall>");

        let call = parse_method_call(&body).unwrap();
        assert_eq!(call.params, vec![Value::from("K\u{fc}che")]);
    }

    #[test]
    fn test_method_call_without_params() {
        let call =
            parse_method_call(b"<methodCall><methodName>system.listMethods</methodName></methodCall>")
                .unwrap();
        assert_eq!(call.method, "system.listMethods");
        assert!(call.params.is_empty());
    }

    #[test]
    fn test_write_then_read_call() {
        let params = vec![
            Value::from("http://10.0.0.5:8765"),
            Value::from("mqttbridge-default"),
            Value::Double(1.0),
            Value::Bool(true),
            Value::Nil,
        ];
        let xml = method_call("init", &params);
        assert!(xml.contains("<double>1.0</double>"));

        let call = parse_method_call(xml.as_bytes()).unwrap();
        assert_eq!(call.method, "init");
        assert_eq!(call.params, params);
    }

    #[test]
    fn test_response_and_fault() {
        let xml = method_response(&Value::Array(vec![Value::from("event")]));
        assert_eq!(
            parse_method_response(xml.as_bytes()).unwrap(),
            Value::Array(vec![Value::from("event")])
        );

        let xml = fault_response(-1, "Unknown method");
        match parse_method_response(xml.as_bytes()) {
            Err(HomematicError::Fault { code, message }) => {
                assert_eq!(code, -1);
                assert_eq!(message, "Unknown method");
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_response_params() {
        let value =
            parse_method_response(b"<methodResponse><params></params></methodResponse>").unwrap();
        assert_eq!(value, Value::Nil);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_method_call(b"<methodCall><methodName>x</methodName>").is_err());
        assert!(parse_method_call(b"<methodResponse/>").is_err());
        assert!(parse_method_call(
            b"<methodCall><methodName>x</methodName><params><param><value><int>abc</int></value></param></params></methodCall>"
        )
        .is_err());
    }

    fn nested_arrays(levels: usize) -> Vec<u8> {
        let mut body = String::from("<methodCall><methodName>event</methodName><params><param><value>");
        for _ in 0..levels {
            body.push_str("<array><data><value>");
        }
        body.push_str("<i4>1</i4>");
        for _ in 0..levels {
            body.push_str("</value></data></array>");
        }
        body.push_str("</value></param></params></methodCall>");
        body.into_bytes()
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let body = nested_arrays(40_000);
        match parse_method_call(&body) {
            Err(HomematicError::Protocol(msg)) => assert_eq!(msg, "nesting too deep"),
            other => panic!("expected nesting error, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_within_limit_accepted() {
        let call = parse_method_call(&nested_arrays(MAX_NESTING - 1)).unwrap();
        let mut value = &call.params[0];
        let mut levels = 0;
        while let Value::Array(items) = value {
            value = &items[0];
            levels += 1;
        }
        assert_eq!(levels, MAX_NESTING - 1);
        assert_eq!(value, &Value::Int(1));
    }
}
