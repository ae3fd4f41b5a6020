//! Client IP extraction.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::Request};

/// Proxy header carrying the client address. Only trusted when the operator
/// configures one, i.e. when running behind a proxy that sets it.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`, first entry
    XForwardedFor,
    XRealIp,
    CfConnectingIp,
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        }
    }

    /// Parse the header value. Anything that is not an IP address is ignored.
    fn extract(&self, value: &str) -> Option<String> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.split(',').next()?,
            ClientIpHeader::XRealIp | ClientIpHeader::CfConnectingIp => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| ip.to_string())
    }
}

/// Client IP for rate limiting.
///
/// With `ip_header` set, the address comes from that header only. Without it,
/// the peer address from `ConnectInfo` is used and proxy headers are ignored.
pub fn extract_client_ip<B>(
    request: &Request<B>,
    ip_header: Option<ClientIpHeader>,
) -> Option<String> {
    match ip_header {
        Some(header) => request
            .headers()
            .get(header.header_name())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| header.extract(v)),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}
