use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ClientConnection, ServerName};
use x509_parser::parse_x509_certificate;

use crate::checked::{CertificateState, Checked, Reason};

/// Address family restriction for the TCP connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    /// Dial whatever the resolver returns
    Any,
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
}

impl AddressFamily {
    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Any => write!(f, "tcp"),
            AddressFamily::V4 => write!(f, "tcp4"),
            AddressFamily::V6 => write!(f, "tcp6"),
        }
    }
}

/// Configuration of one certificate check
#[derive(Clone, Debug)]
pub struct CheckConfig {
    /// IP address or host name to dial
    pub host: String,
    /// Port number
    pub port: u16,
    /// Timeout of the whole connect and handshake sequence
    pub timeout: Duration,
    /// Hostname sent as SNI in place of the target host
    pub sni: Option<String>,
    /// Verify the SNI hostname against the leaf certificate
    pub verify_sni: bool,
    /// Verify the certificate chain against the trust roots
    pub verify_chains: bool,
    /// Critical threshold in days before expiry
    pub critical_in_days: i64,
    /// Address family restriction for the TCP connection
    pub family: AddressFamily,
}

impl CheckConfig {
    /// Hostname driven into the TLS handshake
    pub fn server_name(&self) -> &str {
        self.sni.as_deref().unwrap_or(&self.host)
    }
}

/// Checker for SSL certificate
pub struct Checker {
    config: Arc<ClientConfig>,
}

impl fmt::Debug for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checker").finish()
    }
}

impl Default for Checker {
    fn default() -> Checker {
        let mut config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        // the transport must not reject untrusted or expired certificates,
        // verification happens explicitly in check()
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate));

        Checker {
            config: Arc::new(config),
        }
    }
}

impl Checker {
    /// Check SSL certificate of one target
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # use scc::{AddressFamily, CheckConfig, Checker};
    /// # async fn doc() {
    /// let checker = Checker::default();
    /// checker
    ///     .check(&CheckConfig {
    ///         host: "sha256.badssl.com".to_string(),
    ///         port: 443,
    ///         timeout: Duration::from_secs(10),
    ///         sni: None,
    ///         verify_sni: false,
    ///         verify_chains: false,
    ///         critical_in_days: 14,
    ///         family: AddressFamily::Any,
    ///     })
    ///     .await;
    /// # }
    /// ```
    pub async fn check(&self, check: &CheckConfig) -> Checked {
        let start = Instant::now();

        let fetch = {
            let check = check.clone();
            let config = self.config.clone();
            tokio::task::spawn_blocking(move || fetch_certificate_chain(&check, config))
        };

        // race the blocking fetch against the deadline, the task is
        // abandoned when the timer fires first
        let certificates = match tokio::time::timeout(check.timeout, fetch).await {
            Err(_) => return critical(check, Reason::Timeout),
            Ok(Err(e)) => return critical(check, Reason::Connect(e.to_string())),
            Ok(Ok(Err(e))) => return critical(check, Reason::Connect(e.to_string())),
            Ok(Ok(Ok(certificates))) => certificates,
        };

        let leaf = match certificates.first() {
            Some(leaf) => leaf,
            None => return critical(check, Reason::NoCertificate),
        };

        if check.verify_chains {
            if let Err(e) = verify_chain(leaf, &certificates[1..]) {
                return critical(check, Reason::Chain(e.to_string()));
            }
        }

        if check.verify_sni {
            if let Err(e) = verify_hostname(leaf, check.server_name()) {
                return critical(check, Reason::Hostname(e.to_string()));
            }
        }

        let elapsed = start.elapsed();

        let not_after = match leaf_not_after(leaf) {
            Ok(not_after) => not_after,
            Err(e) => return critical(check, Reason::Connect(e.to_string())),
        };

        let days = days_remain(&not_after, &Utc::now());
        if days < 0 {
            return critical(
                check,
                Reason::Expired {
                    days_ago: -days,
                    not_after,
                },
            );
        }
        if days < check.critical_in_days {
            return critical(check, Reason::NearExpiry { days, not_after });
        }

        Checked {
            state: CertificateState::Ok { days, not_after },
            host: check.host.clone(),
            port: check.port,
            sni: check.sni.clone(),
            timeout: check.timeout,
            elapsed: Some(elapsed),
        }
    }
}

/// Accepts whatever certificate the peer presents so that expired,
/// self-signed and untrusted chains can still be fetched and inspected
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn critical(check: &CheckConfig, reason: Reason) -> Checked {
    Checked {
        state: CertificateState::Critical(reason),
        host: check.host.clone(),
        port: check.port,
        sni: check.sni.clone(),
        timeout: check.timeout,
        elapsed: None,
    }
}

/// Resolve, connect and handshake, then hand back the peer chain as
/// presented, leaf first
fn fetch_certificate_chain(
    check: &CheckConfig,
    config: Arc<ClientConfig>,
) -> anyhow::Result<Vec<Certificate>> {
    // rustls sends no SNI extension for an IP address server name
    let server_name = match check.server_name().parse() {
        Ok(ip) => ServerName::IpAddress(ip),
        Err(_) => ServerName::try_from(check.server_name())?,
    };

    let addrs = (check.host.as_str(), check.port)
        .to_socket_addrs()?
        .filter(|a| check.family.matches(a))
        .collect::<Vec<_>>();
    let mut stream = connect_any(&addrs, check)?;

    // an abandoned handshake must not outlive the deadline by much
    stream.set_read_timeout(Some(check.timeout))?;
    stream.set_write_timeout(Some(check.timeout))?;

    let mut conn = ClientConnection::new(config, server_name)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut stream)?;
    }

    Ok(conn.peer_certificates().unwrap_or_default().to_vec())
}

fn connect_any(addrs: &[SocketAddr], check: &CheckConfig) -> anyhow::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        debug!("connect {addr}");
        match TcpStream::connect_timeout(addr, check.timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    match last_error {
        Some(e) => Err(e.into()),
        None => Err(anyhow::anyhow!(
            "no {} address found for {}",
            check.family,
            check.host
        )),
    }
}

static SIGNATURE_ALGORITHMS: &[&webpki::SignatureAlgorithm] = &[
    &webpki::ECDSA_P256_SHA256,
    &webpki::ECDSA_P256_SHA384,
    &webpki::ECDSA_P384_SHA256,
    &webpki::ECDSA_P384_SHA384,
    &webpki::ED25519,
    &webpki::RSA_PKCS1_2048_8192_SHA256,
    &webpki::RSA_PKCS1_2048_8192_SHA384,
    &webpki::RSA_PKCS1_2048_8192_SHA512,
    &webpki::RSA_PKCS1_3072_8192_SHA384,
];

/// Verify the leaf against the trust roots at the current time, with the
/// rest of the presented chain as candidate intermediates
fn verify_chain(leaf: &Certificate, intermediates: &[Certificate]) -> anyhow::Result<()> {
    let cert = webpki::EndEntityCert::try_from(leaf.as_ref())?;
    let intermediates = intermediates
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>();
    let now = webpki::Time::try_from(SystemTime::now())?;
    cert.verify_is_valid_tls_server_cert(
        SIGNATURE_ALGORITHMS,
        &webpki_roots::TLS_SERVER_ROOTS,
        &intermediates,
        now,
    )?;
    Ok(())
}

fn verify_hostname(leaf: &Certificate, hostname: &str) -> anyhow::Result<()> {
    let cert = webpki::EndEntityCert::try_from(leaf.as_ref())?;
    let name = webpki::DnsNameRef::try_from_ascii_str(hostname)?;
    cert.verify_is_valid_for_dns_name(name)?;
    Ok(())
}

fn leaf_not_after(leaf: &Certificate) -> anyhow::Result<DateTime<Utc>> {
    let (_, cert) = parse_x509_certificate(leaf.as_ref())?;
    Ok(Utc.timestamp(cert.validity().not_after.timestamp(), 0))
}

/// Whole hours truncated toward zero, then whole days, not a calendar-day
/// difference
fn days_remain(not_after: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    (*not_after - *now).num_hours() / 24
}
