//! File-transfer request/response framing.
//!
//! One message is carried by one `send`/`recv` pair:
//!
//! ```text
//!   UP /name\n<file bytes>        DOWN /name
//!   OK /name\n<file bytes>        ERR /name\n<reason>
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Request or response kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Upload,
    Download,
    Ok,
    Error,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "UP",
            Self::Download => "DOWN",
            Self::Ok => "OK",
            Self::Error => "ERR",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Self::Upload),
            "DOWN" => Ok(Self::Download),
            "OK" => Ok(Self::Ok),
            "ERR" => Ok(Self::Error),
            other => Err(MessageError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message has no method separator")]
    MissingSpace,

    #[error("invalid method field: {0:?}")]
    UnknownMethod(String),

    #[error("{0} message has no body separator")]
    MissingNewline(Method),

    #[error("message header is not valid UTF-8")]
    NotUtf8,
}

/// A decoded file-transfer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub method: Method,
    /// Always starts with `/`.
    pub path: String,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(method: Method, path: &str, data: Vec<u8>) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self { method, path, data }
    }

    pub fn upload(path: &str, data: Vec<u8>) -> Self {
        Self::new(Method::Upload, path, data)
    }

    pub fn download(path: &str) -> Self {
        Self::new(Method::Download, path, Vec::new())
    }

    pub fn ok(path: &str, data: Vec<u8>) -> Self {
        Self::new(Method::Ok, path, data)
    }

    pub fn error(path: &str, reason: &str) -> Self {
        Self::new(Method::Error, path, reason.as_bytes().to_vec())
    }

    /// `path` without its leading `/`.
    pub fn name(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.path.len() + self.data.len() + 6);
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        if self.method != Method::Download {
            out.push(b'\n');
            out.extend_from_slice(&self.data);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        let space = buf
            .iter()
            .position(|&b| b == b' ')
            .ok_or(MessageError::MissingSpace)?;
        let method: Method = utf8(&buf[..space])?.parse()?;
        let rest = &buf[space + 1..];

        let newline = rest.iter().position(|&b| b == b'\n');
        let (path, data) = match (method, newline) {
            (Method::Download, Some(nl)) => (&rest[..nl], &[][..]),
            (Method::Download, None) => (rest, &[][..]),
            (_, Some(nl)) => (&rest[..nl], &rest[nl + 1..]),
            (_, None) => return Err(MessageError::MissingNewline(method)),
        };
        Ok(Self::new(method, utf8(path)?, data.to_vec()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.path, self.data.len())
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, MessageError> {
    std::str::from_utf8(bytes).map_err(|_| MessageError::NotUtf8)
}
