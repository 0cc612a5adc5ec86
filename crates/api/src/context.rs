use std::net::IpAddr;

/// Client metadata for a request (resolved IP plus the headers the event
/// logs care about).
///
/// Installed by the request middleware; present on every route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    ip: IpAddr,
    user_agent: Option<String>,
    referrer: Option<String>,
}

impl ClientContext {
    pub fn new(ip: IpAddr, user_agent: Option<String>, referrer: Option<String>) -> Self {
        Self {
            ip,
            user_agent,
            referrer,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }
}
