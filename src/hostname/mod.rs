//! Discovery of the name this machine announces in EHLO/HELO.
//!
//! The externally visible IPv4 address is fetched over HTTP, then mapped
//! back to a name with a PTR query against `in-addr.arpa`, falling back to
//! the platform resolver. The result is advisory: [`HostnameResolver::resolve`]
//! always yields a value and caches the first one for the resolver's lifetime.

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

use crate::errors::{MailError, MailResult};

/// Name used when the external address cannot be determined.
pub const FALLBACK_HOSTNAME: &str = "localhost.localdomain";

/// Default "what is my IP" endpoint. Answers with one line of plain text.
pub const DEFAULT_EXTERNAL_IP_URL: &str = "http://checkip.amazonaws.com";

/// Default timeout for the external IP request.
pub const DEFAULT_EXTERNAL_IP_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses a dotted-quad IPv4 address: four decimal octets in `0..=255`.
pub fn parse_ipv4(text: &str) -> MailResult<Ipv4Addr> {
    let text = text.trim();
    let invalid = || MailError::invalid_format(format!("{} does not match IPv4 format", text));

    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 4 {
        return Err(invalid());
    }

    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *octet = part.parse::<u8>().map_err(|_| invalid())?;
    }

    Ok(Ipv4Addr::from(octets))
}

/// Returns the reverse zone name for `ip`, e.g. `7.113.0.203.in-addr.arpa.`.
pub fn reverse_pointer_name(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}.{}.{}.{}.in-addr.arpa.", d, c, b, a)
}

fn strip_trailing_dot(name: &str) -> &str {
    if name.len() > 1 {
        name.strip_suffix('.').unwrap_or(name)
    } else {
        name
    }
}

/// Source of this machine's public IPv4 address (unparsed).
#[async_trait]
pub trait ExternalIpSource: Send + Sync + fmt::Debug {
    /// Returns the address as text.
    async fn external_ip(&self) -> MailResult<String>;
}

/// DNS PTR lookup.
#[async_trait]
pub trait PtrLookup: Send + Sync + fmt::Debug {
    /// Returns the PTR target for `ip`, if one exists.
    async fn lookup_ptr(&self, ip: Ipv4Addr) -> MailResult<Option<String>>;
}

/// The platform's own reverse lookup (hosts file, NSS, system resolver).
#[async_trait]
pub trait PlatformReverseLookup: Send + Sync + fmt::Debug {
    /// Returns a name for `ip`; implementations may return the address itself.
    async fn lookup(&self, ip: Ipv4Addr) -> MailResult<String>;
}

/// Fetches the external address from an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpExternalIp {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpExternalIp {
    /// Creates a source querying `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: DEFAULT_EXTERNAL_IP_TIMEOUT,
        }
    }

    /// Uses `client` for requests.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl Default for HttpExternalIp {
    fn default() -> Self {
        Self::new(DEFAULT_EXTERNAL_IP_URL)
    }
}

#[async_trait]
impl ExternalIpSource for HttpExternalIp {
    async fn external_ip(&self) -> MailResult<String> {
        let body = self.fetch().await.map_err(|e| {
            MailError::hostname_resolution(format!("GET {} failed", self.url)).with_cause(e)
        })?;

        Ok(body.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// PTR lookup straight against the `in-addr.arpa` zone.
#[derive(Clone)]
pub struct DnsPtrLookup {
    resolver: TokioAsyncResolver,
}

impl DnsPtrLookup {
    /// Wraps an existing resolver.
    pub fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    /// Uses the system resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> MailResult<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            MailError::hostname_resolution("failed to load system DNS configuration").with_cause(e)
        })?;
        Ok(Self::new(resolver))
    }
}

impl fmt::Debug for DnsPtrLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsPtrLookup").finish_non_exhaustive()
    }
}

#[async_trait]
impl PtrLookup for DnsPtrLookup {
    async fn lookup_ptr(&self, ip: Ipv4Addr) -> MailResult<Option<String>> {
        let name = reverse_pointer_name(ip);
        match self.resolver.lookup(name.as_str(), RecordType::PTR).await {
            Ok(lookup) => Ok(lookup.iter().find_map(|rdata| match rdata {
                RData::PTR(target) => Some(strip_trailing_dot(&target.0.to_string()).to_string()),
                _ => None,
            })),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(None),
            Err(e) => Err(MailError::hostname_resolution(format!("PTR {} failed", name)).with_cause(e)),
        }
    }
}

/// Reverse lookup through the C library resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemReverseLookup;

#[async_trait]
impl PlatformReverseLookup for SystemReverseLookup {
    async fn lookup(&self, ip: Ipv4Addr) -> MailResult<String> {
        let addr = IpAddr::V4(ip);
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .map_err(|e| MailError::hostname_resolution("reverse lookup task failed").with_cause(e))?
            .map_err(|e| {
                MailError::hostname_resolution(format!("reverse lookup of {} failed", ip)).with_cause(e)
            })
    }
}

/// Lazily resolves and caches the local hostname.
///
/// Concurrent callers wait for the first resolution; the lookup runs once.
#[derive(Debug)]
pub struct HostnameResolver {
    external_ip: Arc<dyn ExternalIpSource>,
    ptr: Option<Arc<dyn PtrLookup>>,
    platform: Arc<dyn PlatformReverseLookup>,
    cache: OnceCell<String>,
}

impl HostnameResolver {
    /// Creates a resolver from explicit sources. `ptr = None` skips the DNS step.
    pub fn new(
        external_ip: Arc<dyn ExternalIpSource>,
        ptr: Option<Arc<dyn PtrLookup>>,
        platform: Arc<dyn PlatformReverseLookup>,
    ) -> Self {
        Self {
            external_ip,
            ptr,
            platform,
            cache: OnceCell::new(),
        }
    }

    /// Creates a resolver using checkip over HTTP, the system DNS
    /// configuration and the platform resolver.
    pub fn system() -> Self {
        let ptr = match DnsPtrLookup::from_system_conf() {
            Ok(lookup) => Some(Arc::new(lookup) as Arc<dyn PtrLookup>),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "PTR lookups disabled");
                None
            }
        };

        Self::new(Arc::new(HttpExternalIp::default()), ptr, Arc::new(SystemReverseLookup))
    }

    /// Returns the cached hostname, resolving it on first use.
    pub async fn resolve(&self) -> &str {
        self.cache.get_or_init(|| self.discover()).await.as_str()
    }

    /// Returns the hostname if it has already been resolved.
    pub fn cached(&self) -> Option<&str> {
        self.cache.get().map(String::as_str)
    }

    async fn discover(&self) -> String {
        let raw = match self.external_ip.external_ip().await {
            Ok(raw) => raw,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, fallback = FALLBACK_HOSTNAME, "external IP lookup failed");
                return FALLBACK_HOSTNAME.to_string();
            }
        };

        let ip = match parse_ipv4(&raw) {
            Ok(ip) => ip,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, fallback = FALLBACK_HOSTNAME, "external IP is malformed");
                return FALLBACK_HOSTNAME.to_string();
            }
        };

        if let Some(ptr) = &self.ptr {
            match ptr.lookup_ptr(ip).await {
                Ok(Some(name)) if !name.is_empty() => {
                    let name = strip_trailing_dot(&name).to_string();
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%ip, hostname = %name, "resolved local hostname via PTR");
                    return name;
                }
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%ip, "no PTR record");
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%ip, error = %_e, "PTR lookup failed");
                }
            }
        }

        match self.platform.lookup(ip).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => ip.to_string(),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%ip, error = %_e, "platform reverse lookup failed");
                ip.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{StaticExternalIp, StaticPtrLookup, StaticReverseLookup};
    use rstest::rstest;

    fn resolver(
        ip: StaticExternalIp,
        ptr: StaticPtrLookup,
        platform: StaticReverseLookup,
    ) -> (HostnameResolver, Arc<StaticExternalIp>, Arc<StaticPtrLookup>, Arc<StaticReverseLookup>) {
        let ip = Arc::new(ip);
        let ptr = Arc::new(ptr);
        let platform = Arc::new(platform);
        let resolver = HostnameResolver::new(ip.clone(), Some(ptr.clone()), platform.clone());
        (resolver, ip, ptr, platform)
    }

    #[rstest]
    #[case("203.0.113.7", Some([203, 0, 113, 7]))]
    #[case(" 8.8.8.8\n", Some([8, 8, 8, 8]))]
    #[case("0.0.0.0", Some([0, 0, 0, 0]))]
    #[case("255.255.255.255", Some([255, 255, 255, 255]))]
    #[case("256.1.1.1", None)]
    #[case("1.2.3", None)]
    #[case("1.2.3.4.5", None)]
    #[case("1.2.-3.4", None)]
    #[case("1.2..4", None)]
    #[case("a.b.c.d", None)]
    #[case("<html>", None)]
    fn test_parse_ipv4(#[case] text: &str, #[case] expected: Option<[u8; 4]>) {
        match expected {
            Some(octets) => assert_eq!(parse_ipv4(text).unwrap(), Ipv4Addr::from(octets)),
            None => assert_eq!(
                parse_ipv4(text).unwrap_err().kind(),
                crate::errors::MailErrorKind::InvalidFormat
            ),
        }
    }

    #[test]
    fn test_reverse_pointer_name() {
        assert_eq!(
            reverse_pointer_name(Ipv4Addr::new(203, 0, 113, 7)),
            "7.113.0.203.in-addr.arpa."
        );
    }

    #[test]
    fn test_strip_trailing_dot() {
        assert_eq!(strip_trailing_dot("mail.example.org."), "mail.example.org");
        assert_eq!(strip_trailing_dot("mail.example.org"), "mail.example.org");
        assert_eq!(strip_trailing_dot("."), ".");
    }

    #[tokio::test]
    async fn test_ptr_result_wins() {
        let (resolver, _, _, platform) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::found("mail.example.org."),
            StaticReverseLookup::ok("platform.example.org"),
        );

        assert_eq!(resolver.resolve().await, "mail.example.org");
        assert_eq!(platform.calls(), 0);
    }

    #[tokio::test]
    async fn test_ptr_failure_falls_back_to_platform() {
        let (resolver, _, ptr, platform) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::failing(),
            StaticReverseLookup::ok("host-203-0-113-7.example.net"),
        );

        assert_eq!(resolver.resolve().await, "host-203-0-113-7.example.net");
        assert_eq!(ptr.queried(), vec![Ipv4Addr::new(203, 0, 113, 7)]);
        assert_eq!(platform.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_ptr_falls_back_to_platform() {
        let (resolver, _, _, _) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::empty(),
            StaticReverseLookup::ok("fallback.example.net"),
        );

        assert_eq!(resolver.resolve().await, "fallback.example.net");
    }

    #[tokio::test]
    async fn test_platform_failure_yields_ip() {
        let (resolver, _, _, _) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::empty(),
            StaticReverseLookup::failing(),
        );

        assert_eq!(resolver.resolve().await, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_http_failure_yields_fallback() {
        let (resolver, _, ptr, platform) = resolver(
            StaticExternalIp::failing(),
            StaticPtrLookup::found("never.example.org"),
            StaticReverseLookup::ok("never.example.org"),
        );

        assert_eq!(resolver.resolve().await, "localhost.localdomain");
        assert!(ptr.queried().is_empty());
        assert_eq!(platform.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_ip_yields_fallback() {
        let (resolver, _, _, _) = resolver(
            StaticExternalIp::ok("not an ip"),
            StaticPtrLookup::found("never.example.org"),
            StaticReverseLookup::ok("never.example.org"),
        );

        assert_eq!(resolver.resolve().await, FALLBACK_HOSTNAME);
    }

    #[tokio::test]
    async fn test_result_is_cached() {
        let (resolver, ip, _, _) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::found("mail.example.org"),
            StaticReverseLookup::failing(),
        );

        assert_eq!(resolver.cached(), None);
        assert_eq!(resolver.resolve().await, "mail.example.org");
        assert_eq!(resolver.resolve().await, "mail.example.org");
        assert_eq!(resolver.cached(), Some("mail.example.org"));
        assert_eq!(ip.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_resolution() {
        let (resolver, ip, _, _) = resolver(
            StaticExternalIp::ok("203.0.113.7"),
            StaticPtrLookup::found("mail.example.org"),
            StaticReverseLookup::failing(),
        );

        let (a, b, c) = tokio::join!(resolver.resolve(), resolver.resolve(), resolver.resolve());
        assert_eq!((a, b, c), ("mail.example.org", "mail.example.org", "mail.example.org"));
        assert_eq!(ip.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_ptr_source() {
        let resolver = HostnameResolver::new(
            Arc::new(StaticExternalIp::ok("203.0.113.7")),
            None,
            Arc::new(StaticReverseLookup::ok("platform.example.org")),
        );

        assert_eq!(resolver.resolve().await, "platform.example.org");
    }

    /// Serves one HTTP response on a local port and returns its URL.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/", addr)
    }

    fn local_source(url: String) -> HttpExternalIp {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpExternalIp::new(url)
            .with_client(client)
            .with_timeout(Duration::from_secs(2))
    }

    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_http_source_returns_first_line() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 22\r\nConnection: close\r\n\r\n 203.0.113.7\nignored\n\n",
        )
        .await;

        let ip = local_source(url).external_ip().await.unwrap();
        assert_eq!(ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_http_source_rejects_error_status() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 11\r\nConnection: close\r\n\r\n203.0.113.7",
        )
        .await;

        let err = local_source(url).external_ip().await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::MailErrorKind::HostnameResolution);
    }

    #[tokio::test]
    async fn test_http_source_unreachable() {
        let source = local_source(closed_port_url().await);
        assert!(source.external_ip().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_http_source_yields_fallback() {
        let platform = Arc::new(StaticReverseLookup::ok("never.example.org"));
        let resolver = HostnameResolver::new(
            Arc::new(local_source(closed_port_url().await)),
            Some(Arc::new(StaticPtrLookup::found("never.example.org"))),
            platform.clone(),
        );

        assert_eq!(resolver.resolve().await, FALLBACK_HOSTNAME);
        assert_eq!(platform.calls(), 0);
    }

    #[tokio::test]
    async fn test_http_source_feeds_resolver() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 12\r\nConnection: close\r\n\r\n203.0.113.7\n",
        )
        .await;
        let ptr = Arc::new(StaticPtrLookup::found("mail.example.org."));
        let resolver = HostnameResolver::new(
            Arc::new(local_source(url)),
            Some(ptr.clone()),
            Arc::new(StaticReverseLookup::failing()),
        );

        assert_eq!(resolver.resolve().await, "mail.example.org");
        assert_eq!(ptr.queried(), vec![Ipv4Addr::new(203, 0, 113, 7)]);
    }

    #[tokio::test]
    async fn test_system_reverse_lookup_answers_for_loopback() {
        let name = SystemReverseLookup.lookup(Ipv4Addr::LOCALHOST).await.unwrap();
        assert!(!name.is_empty());
    }
}
