use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::context::ClientContext;

/// Resolve client metadata into a request extension.
///
/// The IP prefers the first `X-Forwarded-For` hop (the service sits behind a
/// proxy in every real deployment), then the peer address, then loopback so
/// handler code never has to deal with a missing context.
pub async fn client_meta_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let user_agent = header_string(req.headers(), header::USER_AGENT.as_str());
    let referrer = header_string(req.headers(), header::REFERER.as_str());

    req.extensions_mut()
        .insert(ClientContext::new(ip, user_agent, referrer));

    next.run(req).await
}

fn client_ip(req: &axum::http::Request<axum::body::Body>) -> IpAddr {
    if let Some(forwarded) = header_string(req.headers(), "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}
