//! # Messages
//!
//! A message is one slot (In, Out or Fault) of an exchange: a body, unique
//! headers, binary attachments and a few transport hints.
//!
//! ## Stream Invariant
//!
//! `Content::Stream` wraps a single-pass reader. Clones of a message share the
//! same underlying stream, so anything that needs to look at the bytes more
//! than once (display, copy, persistence) must call
//! [`Message::ensure_re_readable`] first. Buffering happens in place and is
//! visible through every clone.

use crate::security::Subject;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

/// Message payload.
#[derive(Debug, Clone, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Binary(Vec<u8>),
    Json(Value),
    Stream(StreamContent),
}

impl Content {
    /// Wraps a reader as single-pass stream content.
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Self::Stream(StreamContent::new(reader))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Borrowed text, only for `Content::Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Best-effort UTF-8 rendering of text, binary and buffered stream
    /// content. Pending streams are not consumed.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
            Self::Json(value) => Some(value.to_string()),
            Self::Stream(stream) => stream
                .buffered()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            Self::Empty => None,
        }
    }

    /// Whether the content can be read more than once.
    #[must_use]
    pub fn is_re_readable(&self) -> bool {
        match self {
            Self::Stream(stream) => stream.is_re_readable(),
            _ => true,
        }
    }

    /// Buffers stream content in place.
    pub fn ensure_re_readable(&self) -> io::Result<()> {
        match self {
            Self::Stream(stream) => stream.buffer().map(|_| ()),
            _ => Ok(()),
        }
    }

    fn describe(&self, show_content: bool) -> String {
        match self {
            Self::Empty => "<empty>".to_string(),
            Self::Text(text) if show_content => text.clone(),
            Self::Text(text) => format!("<text {} chars>", text.chars().count()),
            Self::Binary(bytes) => format!("<binary {} bytes>", bytes.len()),
            Self::Json(value) if show_content => value.to_string(),
            Self::Json(_) => "<json>".to_string(),
            Self::Stream(stream) if show_content => match stream.buffer() {
                Ok(bytes) => String::from_utf8(bytes)
                    .unwrap_or_else(|e| format!("<binary {} bytes>", e.as_bytes().len())),
                Err(_) => "<unreadable stream>".to_string(),
            },
            Self::Stream(stream) if stream.is_re_readable() => "<buffered stream>".to_string(),
            Self::Stream(_) => "<stream>".to_string(),
        }
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Stream(a), Self::Stream(b)) => a.same_stream(b),
            _ => false,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

enum StreamState {
    Pending(Box<dyn Read + Send>),
    Buffered(Arc<[u8]>),
    Consumed,
}

/// A shared single-pass byte stream that can be buffered in place.
#[derive(Clone)]
pub struct StreamContent {
    state: Arc<Mutex<StreamState>>,
}

impl StreamContent {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState::Pending(Box::new(reader)))),
        }
    }

    #[must_use]
    pub fn is_re_readable(&self) -> bool {
        matches!(*self.state.lock(), StreamState::Buffered(_))
    }

    /// Reads the whole stream into memory (once) and returns a copy of the
    /// bytes.
    pub fn buffer(&self) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock();
        match &mut *state {
            StreamState::Buffered(bytes) => Ok(bytes.to_vec()),
            StreamState::Consumed => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream already consumed",
            )),
            StreamState::Pending(reader) => {
                let mut bytes = Vec::new();
                let result = reader.read_to_end(&mut bytes);
                match result {
                    Ok(_) => {
                        let copy = bytes.clone();
                        *state = StreamState::Buffered(bytes.into());
                        Ok(copy)
                    }
                    Err(e) => {
                        *state = StreamState::Consumed;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Buffered bytes, if the stream has been made re-readable.
    #[must_use]
    pub fn buffered(&self) -> Option<Vec<u8>> {
        match &*self.state.lock() {
            StreamState::Buffered(bytes) => Some(bytes.to_vec()),
            _ => None,
        }
    }

    /// Opens the stream for reading. A pending stream is handed out once and
    /// is consumed afterwards; a buffered stream can be opened any number of
    /// times.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, StreamState::Consumed) {
            StreamState::Pending(reader) => Ok(reader),
            StreamState::Buffered(bytes) => {
                *state = StreamState::Buffered(bytes.clone());
                Ok(Box::new(Cursor::new(bytes)))
            }
            StreamState::Consumed => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream already consumed",
            )),
        }
    }

    fn same_stream(&self, other: &StreamContent) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for StreamContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            StreamState::Pending(_) => "pending".to_string(),
            StreamState::Buffered(bytes) => format!("buffered({} bytes)", bytes.len()),
            StreamState::Consumed => "consumed".to_string(),
        };
        f.debug_struct("StreamContent").field("state", &state).finish()
    }
}

/// One In/Out/Fault message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    body: Content,
    headers: BTreeMap<String, Value>,
    attachments: BTreeMap<String, Content>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    security_subject: Option<Subject>,
}

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A message carrying only a body.
    pub fn with_body(body: impl Into<Content>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn body(&self) -> &Content {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Content>) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Content {
        std::mem::take(&mut self.body)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }

    #[must_use]
    pub fn attachment(&self, id: &str) -> Option<&Content> {
        self.attachments.get(id)
    }

    pub fn add_attachment(&mut self, id: impl Into<String>, content: impl Into<Content>) {
        self.attachments.insert(id.into(), content.into());
    }

    pub fn remove_attachment(&mut self, id: &str) -> Option<Content> {
        self.attachments.remove(id)
    }

    #[must_use]
    pub fn attachments(&self) -> &BTreeMap<String, Content> {
        &self.attachments
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn set_content_encoding(&mut self, encoding: impl Into<String>) {
        self.content_encoding = Some(encoding.into());
    }

    #[must_use]
    pub fn security_subject(&self) -> Option<&Subject> {
        self.security_subject.as_ref()
    }

    pub fn set_security_subject(&mut self, subject: Subject) {
        self.security_subject = Some(subject);
    }

    /// Buffers every stream in the body and attachments.
    pub fn ensure_re_readable(&self) -> io::Result<()> {
        self.body.ensure_re_readable()?;
        for content in self.attachments.values() {
            content.ensure_re_readable()?;
        }
        Ok(())
    }

    /// A re-readable copy of this message.
    pub fn copy(&self) -> io::Result<Message> {
        self.ensure_re_readable()?;
        Ok(self.clone())
    }

    /// Replaces this message's content with a re-readable copy of `other`.
    pub fn copy_from(&mut self, other: &Message) -> io::Result<()> {
        *self = other.copy()?;
        Ok(())
    }

    /// Human-readable rendering. With `show_content`, streams are buffered
    /// so the body can be shown without being lost.
    #[must_use]
    pub fn display(&self, show_content: bool) -> String {
        let mut out = String::from("Message[");
        if let Some(content_type) = &self.content_type {
            out.push_str(&format!("contentType: {content_type}, "));
        }
        if !self.headers.is_empty() {
            let headers: Vec<String> = self
                .headers
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            out.push_str(&format!("headers: {{{}}}, ", headers.join(", ")));
        }
        if !self.attachments.is_empty() {
            let ids: Vec<&str> = self.attachments.keys().map(String::as_str).collect();
            out.push_str(&format!("attachments: [{}], ", ids.join(", ")));
        }
        out.push_str(&format!("body: {}]", self.body.describe(show_content)));
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(false))
    }
}
