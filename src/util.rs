use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use headers::Header;
use http::header::HeaderMap;
use time::format_description::well_known::Rfc3339;

use crate::errors::DavError;
use crate::DavResult;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const POST = 0x0004;
        const PUT = 0x0008;
        const OPTIONS = 0x0010;
        const PROPFIND = 0x0020;
        const PROPPATCH = 0x0040;
        const MKCOL = 0x0080;
        const COPY = 0x0100;
        const MOVE = 0x0200;
        const DELETE = 0x0400;
        const LOCK = 0x0800;
        const UNLOCK = 0x1000;

        const HTTP_RO = Self::HEAD.bits() | Self::GET.bits() | Self::OPTIONS.bits();
        const WEBDAV_RO = Self::HTTP_RO.bits() | Self::PROPFIND.bits();
    }
}

impl DavMethod {
    pub const WEBDAV_RW: Self = Self::all();
}

/// Set of allowed methods. An alias, since the bitflags type already
/// behaves like a set.
pub type DavMethodSet = DavMethod;

// translate method into our own enum that has webdav methods as well.
pub fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::HEAD,
        http::Method::GET => DavMethod::GET,
        http::Method::POST => DavMethod::POST,
        http::Method::PUT => DavMethod::PUT,
        http::Method::DELETE => DavMethod::DELETE,
        http::Method::OPTIONS => DavMethod::OPTIONS,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PROPFIND,
            "PROPPATCH" => DavMethod::PROPPATCH,
            "MKCOL" => DavMethod::MKCOL,
            "COPY" => DavMethod::COPY,
            "MOVE" => DavMethod::MOVE,
            "LOCK" => DavMethod::LOCK,
            "UNLOCK" => DavMethod::UNLOCK,
            _ => {
                return Err(DavError::UnknownDavMethod);
            }
        },
    };
    Ok(m)
}

/// `Depth` request header. A missing header maps to `Infinity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

pub fn parse_depth(hdr: Option<&str>) -> DavResult<Depth> {
    match hdr {
        None => Ok(Depth::Infinity),
        Some("0") => Ok(Depth::Zero),
        Some("1") => Ok(Depth::One),
        Some(s) if s.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
        Some(_) => Err(DavError::InvalidDepth),
    }
}

impl Depth {
    /// Walker depth: 0, 1, or -1 for unbounded.
    pub fn as_walk_depth(self) -> i32 {
        match self {
            Depth::Zero => 0,
            Depth::One => 1,
            Depth::Infinity => crate::walker::INFINITE_DEPTH,
        }
    }
}

pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v[0].to_str().unwrap_or_default().to_owned()
}

pub fn systemtime_to_rfc3339(t: SystemTime) -> String {
    // 1996-12-19T16:39:57Z
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    time::OffsetDateTime::from_unix_timestamp(secs)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Minimal escaping for XML text content and attribute values.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolve the real client address of a request.
///
/// Without trusted proxies this is strictly the remote-peer address.
/// When the peer is a trusted proxy, `X-Real-IP` wins, then the first
/// entry of `X-Forwarded-For`. Unparseable addresses yield an empty
/// string.
pub fn client_ip(remote_addr: &str, headers: &HeaderMap, trusted_proxies: &[String]) -> String {
    let peer = match remote_addr.parse::<SocketAddr>() {
        Ok(sa) => sa.ip(),
        Err(_) => match remote_addr.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => return String::new(),
        },
    };

    if trusted_proxies.is_empty() {
        return peer.to_string();
    }

    let trusted = trusted_proxies
        .iter()
        .any(|t| t.parse::<IpAddr>().map(|t| t == peer).unwrap_or(false));
    if !trusted {
        return peer.to_string();
    }

    if let Some(ip) = header_ip(headers, "x-real-ip") {
        return ip;
    }
    if let Some(v) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = v.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }

    peer.to_string()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        assert!(systemtime_to_rfc3339(UNIX_EPOCH) == "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_depth() {
        assert_eq!(parse_depth(None).unwrap(), Depth::Infinity);
        assert_eq!(parse_depth(Some("0")).unwrap(), Depth::Zero);
        assert_eq!(parse_depth(Some("1")).unwrap(), Depth::One);
        assert_eq!(parse_depth(Some("infinity")).unwrap(), Depth::Infinity);
        assert!(parse_depth(Some("2")).is_err());
    }

    #[test]
    fn client_ip_without_proxies_is_peer() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip("10.0.0.9:4321", &headers, &[]), "10.0.0.9");
        assert_eq!(client_ip("bogus", &headers, &[]), "");
    }

    #[test]
    fn client_ip_honors_trusted_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());
        headers.insert("x-forwarded-for", "198.51.100.1, 10.0.0.9".parse().unwrap());
        let trusted = vec!["10.0.0.9".to_string()];

        // peer is trusted: X-Real-IP wins
        assert_eq!(client_ip("10.0.0.9:1234", &headers, &trusted), "203.0.113.7");

        // peer not trusted: headers ignored
        assert_eq!(client_ip("10.0.0.8:1234", &headers, &trusted), "10.0.0.8");

        // no X-Real-IP: first X-Forwarded-For entry
        headers.remove("x-real-ip");
        assert_eq!(
            client_ip("10.0.0.9:1234", &headers, &trusted),
            "198.51.100.1"
        );
    }

    #[test]
    fn escape() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
