use std::fmt;

use crate::error::TypeError;

/// Location scheme for a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UriScheme {
    /// Body lives in process memory.
    Memory,
    /// Body lives in a file; the path is the data directory or block file.
    File,
    /// Body is reachable over a TCP peer as `tcp://<host:port>/<hex-id>`.
    Tcp,
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Where a block's bytes can actually be accessed.
///
/// URIs are read-only by default; a `?wr` query flag marks one writable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockUri {
    pub scheme: UriScheme,
    /// Host portion for `tcp://`; empty otherwise.
    pub host: String,
    /// Path portion: a filesystem path for `file://`, a hex id for `tcp://`.
    pub path: String,
    writable: bool,
}

impl BlockUri {
    /// A `memory://` location.
    pub fn memory() -> Self {
        Self {
            scheme: UriScheme::Memory,
            host: String::new(),
            path: String::new(),
            writable: false,
        }
    }

    /// A `file://<path>` location.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            scheme: UriScheme::File,
            host: String::new(),
            path: path.into(),
            writable: false,
        }
    }

    /// A `tcp://<host>/<hex-id>` location.
    pub fn tcp(host: impl Into<String>, hex_id: impl Into<String>) -> Self {
        Self {
            scheme: UriScheme::Tcp,
            host: host.into(),
            path: hex_id.into(),
            writable: false,
        }
    }

    /// Parse a URI string of one of the three supported schemes.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (scheme_str, rest) = s
            .split_once("://")
            .ok_or_else(|| TypeError::MalformedUri(s.to_string()))?;

        let (rest, writable) = match rest.split_once('?') {
            Some((r, query)) => (r, query.split('&').any(|p| p == "wr")),
            None => (rest, false),
        };

        let mut uri = match scheme_str {
            "memory" => Self::memory(),
            "file" => Self::file(rest),
            "tcp" => {
                let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
                Self::tcp(host, path)
            }
            _ => return Err(TypeError::UnsupportedScheme),
        };
        uri.writable = writable;
        Ok(uri)
    }

    /// Whether the location may be written. Absent the `?wr` flag all URIs
    /// are read-only.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Mark the location writable.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}

impl fmt::Display for BlockUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            UriScheme::Memory => write!(f, "memory://")?,
            UriScheme::File => write!(f, "file://{}", self.path)?,
            UriScheme::Tcp => write!(f, "tcp://{}/{}", self.host, self.path)?,
        }
        if self.writable {
            write!(f, "?wr")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_memory() {
        let uri = BlockUri::parse("memory://").unwrap();
        assert_eq!(uri.scheme, UriScheme::Memory);
        assert!(!uri.is_writable());
    }

    #[test]
    fn parse_file_with_write_flag() {
        let uri = BlockUri::parse("file:///var/blocks?wr").unwrap();
        assert_eq!(uri.scheme, UriScheme::File);
        assert_eq!(uri.path, "/var/blocks");
        assert!(uri.is_writable());
    }

    #[test]
    fn parse_tcp() {
        let uri = BlockUri::parse("tcp://127.0.0.1:4090/deadbeef").unwrap();
        assert_eq!(uri.scheme, UriScheme::Tcp);
        assert_eq!(uri.host, "127.0.0.1:4090");
        assert_eq!(uri.path, "deadbeef");
    }

    #[test]
    fn reject_unknown_scheme() {
        assert_eq!(BlockUri::parse("ftp://x").unwrap_err(), TypeError::UnsupportedScheme);
    }

    #[test]
    fn reject_missing_scheme() {
        assert!(matches!(
            BlockUri::parse("/just/a/path"),
            Err(TypeError::MalformedUri(_))
        ));
    }

    #[test]
    fn display_roundtrip() {
        for s in ["memory://", "file:///tmp/data", "tcp://h:1/ab?wr"] {
            let uri = BlockUri::parse(s).unwrap();
            assert_eq!(uri.to_string(), *s);
        }
    }
}
