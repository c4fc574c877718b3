use crate::agent::tools::base::{require_str, Tool};
use crate::utils::env_flag;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use url::Url;

/// Disables the private-address filter. Local development only.
pub const ALLOW_PRIVATE_ENV: &str = "PICOBOT_WEB_ALLOW_PRIVATE";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20; // 1 MiB
const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = "picobot-web-tool/1.0";

/// HTTP/HTTPS GET with SSRF protection.
///
/// DNS is resolved before connecting and the connection is pinned to the
/// addresses that passed validation, so a rebinding resolver cannot swap
/// in a private address between check and connect. Redirects are followed
/// manually so every hop gets the same validation.
pub struct WebTool {
    max_body_bytes: usize,
    allow_private: bool,
}

impl WebTool {
    pub fn new() -> Self {
        Self::with_options(env_flag(ALLOW_PRIVATE_ENV), DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_options(allow_private: bool, max_body_bytes: usize) -> Self {
        Self {
            max_body_bytes: if max_body_bytes == 0 {
                DEFAULT_MAX_BODY_BYTES
            } else {
                max_body_bytes
            },
            allow_private,
        }
    }

    async fn fetch(&self, raw_url: &str) -> Result<String> {
        let mut url = parse_web_url(raw_url)?;

        for _hop in 0..=MAX_REDIRECTS {
            let resolved = self.validate_and_resolve(&url).await?;

            let mut builder = reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(USER_AGENT)
                .redirect(reqwest::redirect::Policy::none());
            if let Some((host, addrs)) = &resolved {
                builder = builder.resolve_to_addrs(host, addrs);
            }
            let client = builder.build()?;

            let resp = client.get(url.clone()).send().await?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| anyhow::anyhow!("redirect response without Location header"))?;
                url = url
                    .join(location)
                    .map_err(|e| anyhow::anyhow!("invalid redirect target: {}", e))?;
                if !matches!(url.scheme(), "http" | "https") {
                    anyhow::bail!(
                        "unsupported URL scheme '{}' in redirect (allowed: http, https)",
                        url.scheme()
                    );
                }
                continue;
            }

            if !status.is_success() {
                anyhow::bail!("request failed with status {}", status);
            }

            // Hard limit: exceeding is an error, not truncation.
            let mut body = Vec::new();
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if body.len() + chunk.len() > self.max_body_bytes {
                    anyhow::bail!(
                        "response body exceeds {} bytes limit",
                        self.max_body_bytes
                    );
                }
                body.extend_from_slice(&chunk);
            }
            return Ok(String::from_utf8_lossy(&body).to_string());
        }

        anyhow::bail!("too many redirects (limit {})", MAX_REDIRECTS)
    }

    /// Validate the target and return the pinned addresses for domains.
    /// Returns `None` when no pinning is needed (IP literals, override on).
    async fn validate_and_resolve(
        &self,
        url: &Url,
    ) -> Result<Option<(String, Vec<SocketAddr>)>> {
        if self.allow_private {
            return Ok(None);
        }

        let host = url
            .host()
            .ok_or_else(|| anyhow::anyhow!("URL host is required"))?;
        let port = url.port_or_known_default().unwrap_or(80);

        match host {
            url::Host::Ipv4(v4) => {
                if is_private_or_special(IpAddr::V4(v4)) {
                    anyhow::bail!("private/special-use targets are blocked");
                }
                Ok(None)
            }
            url::Host::Ipv6(v6) => {
                if is_private_or_special(IpAddr::V6(v6)) {
                    anyhow::bail!("private/special-use targets are blocked");
                }
                Ok(None)
            }
            url::Host::Domain(domain) => {
                let lower = domain.to_lowercase();
                if lower == "localhost" || lower.ends_with(".localhost") {
                    anyhow::bail!("private/special-use targets are blocked");
                }
                let resolved: Vec<SocketAddr> =
                    tokio::net::lookup_host(format!("{}:{}", domain, port))
                        .await
                        .map_err(|_| anyhow::anyhow!("DNS resolution failed for {}", domain))?
                        .collect();
                if resolved.is_empty() {
                    anyhow::bail!("DNS resolved no addresses for {}", domain);
                }
                let allowed: Vec<SocketAddr> = resolved
                    .into_iter()
                    .filter(|a| !is_private_or_special(a.ip()))
                    .collect();
                if allowed.is_empty() {
                    anyhow::bail!(
                        "host '{}' resolves only to private/special-use addresses",
                        domain
                    );
                }
                Ok(Some((domain.to_string(), allowed)))
            }
        }
    }
}

impl Default for WebTool {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_web_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("unsupported URL scheme '{}' (allowed: http, https)", other),
    }
    if url.host().is_none() {
        anyhow::bail!("URL host is required");
    }
    Ok(url)
}

fn in_v4_block(ip: Ipv4Addr, net: Ipv4Addr, prefix: u32) -> bool {
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

fn is_private_or_special(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_multicast()
                || v4.is_unspecified()
            {
                return true;
            }
            // Special-use ranges beyond the std classifications
            in_v4_block(v4, Ipv4Addr::new(0, 0, 0, 0), 8)          // "this network"
                || in_v4_block(v4, Ipv4Addr::new(100, 64, 0, 0), 10)    // CGNAT
                || in_v4_block(v4, Ipv4Addr::new(192, 0, 0, 0), 24)     // IETF assignments
                || in_v4_block(v4, Ipv4Addr::new(192, 0, 2, 0), 24)     // TEST-NET-1
                || in_v4_block(v4, Ipv4Addr::new(198, 18, 0, 0), 15)    // benchmarking
                || in_v4_block(v4, Ipv4Addr::new(198, 51, 100, 0), 24)  // TEST-NET-2
                || in_v4_block(v4, Ipv4Addr::new(203, 0, 113, 0), 24)   // TEST-NET-3
                || in_v4_block(v4, Ipv4Addr::new(240, 0, 0, 0), 4)      // reserved
        }
        IpAddr::V6(v6) => is_private_or_special_v6(v6),
    }
}

fn is_private_or_special_v6(v6: Ipv6Addr) -> bool {
    if v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() {
        return true;
    }
    // IPv4-mapped addresses (::ffff:a.b.c.d) take the IPv4 rules
    if let Some(v4) = v6.to_ipv4_mapped() {
        return is_private_or_special(IpAddr::V4(v4));
    }
    let seg = v6.segments();
    // fe80::/10 link-local
    if seg[0] & 0xffc0 == 0xfe80 {
        return true;
    }
    // fc00::/7 unique local
    if seg[0] & 0xfe00 == 0xfc00 {
        return true;
    }
    // 100::/64 discard-only
    if seg[0] == 0x0100 && seg[1] == 0 && seg[2] == 0 && seg[3] == 0 {
        return true;
    }
    // 2001:2::/48 benchmarking
    if seg[0] == 0x2001 && seg[1] == 0x0002 && seg[2] == 0 {
        return true;
    }
    // 2001:db8::/32 documentation
    if seg[0] == 0x2001 && seg[1] == 0x0db8 {
        return true;
    }
    // 2002::/16 6to4 (can embed arbitrary IPv4)
    if seg[0] == 0x2002 {
        return true;
    }
    false
}

#[async_trait]
impl Tool for WebTool {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Fetch web content from a URL"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (must be http or https)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let url = require_str(&args, "url")?;
        self.fetch(url).await
    }
}
