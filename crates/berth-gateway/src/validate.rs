//! Request validation - the VALIDATE stage.
//!
//! Everything here runs before any subprocess is spawned. The repository
//! id, protocol sub-path, and query string each match a strict
//! allow-list; any violation fails the request immediately. This is the
//! primary defense against command and path injection.

use crate::{GatewayError, Result};

/// Maximum accepted repository id length.
const MAX_REPO_ID_LEN: usize = 100;

/// The two smart HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Fetch/clone (`git-upload-pack`).
    UploadPack,
    /// Push (`git-receive-pack`).
    ReceivePack,
}

impl Service {
    /// Returns the service name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Parses a service name from a query value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "git-upload-pack" => Ok(Self::UploadPack),
            "git-receive-pack" => Ok(Self::ReceivePack),
            other => Err(GatewayError::InvalidService(other.to_string())),
        }
    }

    /// The request content type git clients send for this service's POST.
    pub fn request_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-request",
            Self::ReceivePack => "application/x-git-receive-pack-request",
        }
    }
}

/// The fixed set of protocol operations the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `GET /info/refs?service=...` ref advertisement.
    InfoRefs(Service),
    /// `POST /git-upload-pack` pack download.
    UploadPack,
    /// `POST /git-receive-pack` pack upload.
    ReceivePack,
}

impl Operation {
    /// The CGI `PATH_INFO` suffix for this operation.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            Self::InfoRefs(_) => "info/refs",
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// The CGI request method for this operation.
    pub fn method(&self) -> &'static str {
        match self {
            Self::InfoRefs(_) => "GET",
            _ => "POST",
        }
    }
}

/// Validates a repository identifier against the allow-list.
///
/// Accepted: ASCII alphanumerics, `-`, `_`, `.`; bounded length; no
/// leading `.` or `-`; no `..`. Everything else - separators, shell
/// metacharacters, traversal sequences - is rejected.
pub fn validate_repo_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_REPO_ID_LEN
        && !id.starts_with('.')
        && !id.starts_with('-')
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(GatewayError::InvalidRepository(id.to_string()))
    }
}

/// Validates the raw query string for an operation.
///
/// `info/refs` must carry exactly `service=<known service>`; the POST
/// operations accept no query at all.
pub fn validate_query(op: Operation, raw: Option<&str>) -> Result<()> {
    match op {
        Operation::InfoRefs(service) => {
            let raw = raw.unwrap_or("");
            let expected = format!("service={}", service.as_str());
            if raw == expected {
                Ok(())
            } else {
                Err(GatewayError::InvalidQuery(raw.to_string()))
            }
        }
        Operation::UploadPack | Operation::ReceivePack => match raw {
            None | Some("") => Ok(()),
            Some(raw) => Err(GatewayError::InvalidQuery(raw.to_string())),
        },
    }
}

/// Parses and validates the `service` parameter of an `info/refs` query.
pub fn parse_info_refs_query(raw: Option<&str>) -> Result<Service> {
    let raw = raw.unwrap_or("");
    let value = raw
        .strip_prefix("service=")
        .ok_or_else(|| GatewayError::InvalidQuery(raw.to_string()))?;
    let service = Service::parse(value)?;
    validate_query(Operation::InfoRefs(service), Some(raw))?;
    Ok(service)
}

/// Re-validates the configured base URL before exporting it into the
/// subprocess environment, blocking request-forgery via header-derived
/// values.
pub fn validate_base_url(url: &str) -> Result<()> {
    let ok = (url.starts_with("http://") || url.starts_with("https://"))
        && url.len() <= 2048
        && url
            .chars()
            .all(|c| c.is_ascii_graphic());
    if ok {
        Ok(())
    } else {
        Err(GatewayError::InvalidQuery(format!("base url: {}", url)))
    }
}
