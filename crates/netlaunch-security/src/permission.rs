//! Typed capabilities and containment.
//!
//! Targets use a small wildcard grammar:
//! - `*` alone matches any target
//! - a trailing `/-` (paths, URLs) matches everything below the prefix
//! - a trailing `/*` matches direct children only
//! - a trailing `.*` (property and runtime names) matches the dotted prefix
//! - socket targets are `host[:ports]` where host may be `*` or `*.domain`
//!   and ports may be `N`, `N-`, `-N` or `N-M`

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single capability held by loaded code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "kebab-case")]
pub enum Permission {
    /// Every capability.
    All,
    /// Open outbound connections to `host[:ports]`.
    SocketConnect(String),
    /// Accept inbound connections from `host[:ports]`.
    SocketAccept(String),
    /// Listen on `host[:ports]`.
    SocketListen(String),
    /// Read a file or tree.
    FileRead(String),
    /// Write a file or tree.
    FileWrite(String),
    /// Read a system property.
    PropertyRead(String),
    /// Write a system property.
    PropertyWrite(String),
    /// A named runtime capability (`exitVM`, `loadLibrary`, ...).
    Runtime(String),
    /// Fetch URLs under a prefix.
    UrlAccess(String),
    /// Access the system clipboard.
    Clipboard,
}

impl Permission {
    /// Whether holding `self` grants `other`.
    #[must_use]
    pub fn implies(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::All, _) | (Self::Clipboard, Self::Clipboard) => true,
            (Self::SocketConnect(g), Self::SocketConnect(r))
            | (Self::SocketAccept(g), Self::SocketAccept(r))
            | (Self::SocketListen(g), Self::SocketListen(r)) => socket_implies(g, r),
            (Self::FileRead(g), Self::FileRead(r)) | (Self::FileWrite(g), Self::FileWrite(r)) => {
                path_implies(g, r)
            },
            (Self::UrlAccess(g), Self::UrlAccess(r)) => path_implies(g, r),
            (Self::PropertyRead(g), Self::PropertyRead(r))
            | (Self::PropertyWrite(g), Self::PropertyWrite(r))
            | (Self::Runtime(g), Self::Runtime(r)) => name_implies(g, r),
            _ => false,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::SocketConnect(t) => write!(f, "socket-connect {t}"),
            Self::SocketAccept(t) => write!(f, "socket-accept {t}"),
            Self::SocketListen(t) => write!(f, "socket-listen {t}"),
            Self::FileRead(t) => write!(f, "file-read {t}"),
            Self::FileWrite(t) => write!(f, "file-write {t}"),
            Self::PropertyRead(t) => write!(f, "property-read {t}"),
            Self::PropertyWrite(t) => write!(f, "property-write {t}"),
            Self::Runtime(t) => write!(f, "runtime {t}"),
            Self::UrlAccess(t) => write!(f, "url {t}"),
            Self::Clipboard => write!(f, "clipboard"),
        }
    }
}

fn path_implies(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix('-') {
        return prefix.ends_with('/') && requested.starts_with(prefix);
    }
    if let Some(prefix) = granted.strip_suffix('*') {
        return prefix.ends_with('/')
            && requested
                .strip_prefix(prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'));
    }
    false
}

fn name_implies(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }
    granted
        .strip_suffix('*')
        .is_some_and(|prefix| prefix.ends_with('.') && requested.starts_with(prefix))
}

fn socket_implies(granted: &str, requested: &str) -> bool {
    if granted == "*" {
        return true;
    }
    let (g_host, g_ports) = split_socket(granted);
    let (r_host, r_ports) = split_socket(requested);
    host_implies(g_host, r_host) && ports_contain(g_ports, r_ports)
}

fn split_socket(target: &str) -> (&str, Option<&str>) {
    // IPv6 literals are bracketed: `[::1]:80`.
    if let Some(rest) = target.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        return (host, tail.strip_prefix(':'));
    }
    match target.rsplit_once(':') {
        Some((host, ports)) => (host, Some(ports)),
        None => (target, None),
    }
}

fn host_implies(granted: &str, requested: &str) -> bool {
    if granted == "*" {
        return true;
    }
    if let Some(domain) = granted.strip_prefix("*.") {
        let requested = requested.to_ascii_lowercase();
        let domain = domain.to_ascii_lowercase();
        return requested
            .strip_suffix(&domain)
            .is_some_and(|head| head.ends_with('.'));
    }
    granted.eq_ignore_ascii_case(requested)
}

fn parse_ports(spec: Option<&str>) -> Option<(u16, u16)> {
    let Some(spec) = spec.filter(|s| !s.is_empty() && *s != "*") else {
        return Some((0, u16::MAX));
    };
    match spec.split_once('-') {
        None => spec.parse().ok().map(|p| (p, p)),
        Some((lo, hi)) => {
            let lo = if lo.is_empty() { 0 } else { lo.parse().ok()? };
            let hi = if hi.is_empty() { u16::MAX } else { hi.parse().ok()? };
            (lo <= hi).then_some((lo, hi))
        },
    }
}

fn ports_contain(granted: Option<&str>, requested: Option<&str>) -> bool {
    match (parse_ports(granted), parse_ports(requested)) {
        (Some((g_lo, g_hi)), Some((r_lo, r_hi))) => g_lo <= r_lo && r_hi <= g_hi,
        _ => false,
    }
}
