//! Transport-ready email payloads.
//!
//! A [`Payload`] is what the message builder hands to a
//! [`Connection`](crate::transport::Connection): header values, exactly one
//! body part and the binary attachments in input order.
//!
//! ```
//! use notifiers::payload::{BodyKind, Payload};
//!
//! let payload = Payload::new("a@x.com,b@x.com", "me@x.com")
//!     .subject("Hello")
//!     .body(BodyKind::Plain, "Hi there");
//!
//! assert_eq!(payload.recipients(), vec!["a@x.com", "b@x.com"]);
//! ```

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::attachment::{Attachment, FileSource};
use crate::error::NotificationError;

/// Content type of the body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    #[default]
    Plain,
    Html,
}

impl BodyKind {
    /// Pick the body kind from the provider's `html` flag.
    pub fn from_html_flag(html: bool) -> Self {
        if html {
            Self::Html
        } else {
            Self::Plain
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Plain => "text/plain",
            Self::Html => "text/html",
        }
    }
}

/// The single body part.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Body {
    pub kind: BodyKind,
    pub content: String,
}

/// A built message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Destination header value, comma-separated for several recipients
    pub to: String,
    /// Origin header value
    pub from: String,
    pub subject: String,
    /// Local send time
    pub date: DateTime<Local>,
    pub body: Body,
    /// Binary attachments, in input order
    pub attachments: Vec<Attachment>,
}

impl Payload {
    /// Start a payload stamped with the current local time.
    pub fn new(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            subject: String::new(),
            date: Local::now(),
            body: Body::default(),
            attachments: Vec::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the body part, replacing any previous one.
    pub fn body(mut self, kind: BodyKind, content: impl Into<String>) -> Self {
        self.body = Body {
            kind,
            content: content.into(),
        };
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Read each path through `files` and append it as an attachment.
    ///
    /// Any unreadable path fails the whole payload.
    pub fn attach_files<P: AsRef<Path>>(
        mut self,
        paths: &[P],
        files: &dyn FileSource,
    ) -> Result<Self, NotificationError> {
        for path in paths {
            self.attachments.push(Attachment::load(path, files)?);
        }
        Ok(self)
    }

    /// Individual destination addresses.
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::MemoryFiles;

    #[test]
    fn test_builder() {
        let payload = Payload::new("a@x.com", "me@x.com")
            .subject("Hi")
            .body(BodyKind::Html, "<b>hi</b>");

        assert_eq!(payload.to, "a@x.com");
        assert_eq!(payload.from, "me@x.com");
        assert_eq!(payload.subject, "Hi");
        assert_eq!(payload.body.kind, BodyKind::Html);
        assert_eq!(payload.body.kind.mime_type(), "text/html");
        assert!(!payload.has_attachments());
    }

    #[test]
    fn test_body_replaced_not_appended() {
        let payload = Payload::new("a@x.com", "me@x.com")
            .body(BodyKind::Html, "first")
            .body(BodyKind::Plain, "second");
        assert_eq!(
            payload.body,
            Body {
                kind: BodyKind::Plain,
                content: "second".into()
            }
        );
    }

    #[test]
    fn test_recipients() {
        let payload = Payload::new("a@x.com, b@x.com,", "me@x.com");
        assert_eq!(payload.recipients(), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_attach_files_in_order() {
        let files = MemoryFiles::new()
            .with_file("/a.txt", b"A".to_vec())
            .with_file("/b.png", b"B".to_vec());

        let payload = Payload::new("a@x.com", "me@x.com")
            .attach_files(&["/b.png", "/a.txt"][..], &files)
            .unwrap();

        let names: Vec<&str> = payload.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["b.png", "a.txt"]);
        assert_eq!(payload.attachments[0].content_type, "image/png");
    }

    #[test]
    fn test_attach_files_missing_fails_whole_payload() {
        let files = MemoryFiles::new().with_file("/a.txt", b"A".to_vec());
        let result = Payload::new("a@x.com", "me@x.com").attach_files(&["/a.txt", "/missing"][..], &files);
        assert!(matches!(result, Err(NotificationError::Resource(_))));
    }
}
