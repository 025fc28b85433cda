use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Reason a check went critical
#[derive(Debug)]
pub enum Reason {
    /// Connection or handshake did not finish before the deadline
    Timeout,
    /// Connection, handshake or certificate decoding failed outright
    Connect(String),
    /// Peer presented no certificate
    NoCertificate,
    /// Chain-of-trust verification failed
    Chain(String),
    /// Hostname verification failed
    Hostname(String),
    /// Certificate already expired
    Expired {
        /// Days since the expiration date
        days_ago: i64,
        /// Exact expiration time
        not_after: DateTime<Utc>,
    },
    /// Certificate expires within the critical threshold
    NearExpiry {
        /// Remaining days to the expiration date
        days: i64,
        /// Exact expiration time
        not_after: DateTime<Utc>,
    },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Timeout => write!(f, "connection or tls handshake timeout"),
            Reason::Connect(e) => write!(f, "{e}"),
            Reason::NoCertificate => write!(f, "failed fetch certificate from target host"),
            Reason::Chain(e) => write!(f, "failed verify chains [{e}]"),
            Reason::Hostname(e) => write!(f, "failed verify hostname [{e}]"),
            Reason::Expired {
                days_ago,
                not_after,
            } => write!(
                f,
                "this certificate expired {days_ago} day(s) ago. end date is [{not_after}]"
            ),
            Reason::NearExpiry { days, not_after } => write!(
                f,
                "only {days} left for this certificate. end date is [{not_after}]"
            ),
        }
    }
}

/// State of SSL certificate
#[derive(Debug)]
pub enum CertificateState {
    /// Certificate is valid and outside the critical threshold
    Ok {
        /// Remaining days to the expiration date
        days: i64,
        /// Exact expiration time
        not_after: DateTime<Utc>,
    },
    /// Check failed with exactly one reason
    Critical(Reason),
}

/// Check result of one target
#[derive(Debug)]
pub struct Checked {
    /// State of certificate
    pub state: CertificateState,
    /// Host that got checked
    pub host: String,
    /// Port that got checked
    pub port: u16,
    /// SNI sent during the handshake, if any
    pub sni: Option<String>,
    /// Configured timeout of the whole check
    pub timeout: Duration,
    /// Elapsed wall-clock time of the whole check
    pub elapsed: Option<Duration>,
}

impl Checked {
    /// Whether the check ended critical
    pub fn is_critical(&self) -> bool {
        matches!(self.state, CertificateState::Critical(..))
    }
}

impl fmt::Display for Checked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = &self.host;
        let port = self.port;
        let sni = self.sni.as_deref().unwrap_or("-");
        match &self.state {
            CertificateState::Ok { days, not_after } => {
                let elapsed = self.elapsed.unwrap_or_default().as_secs_f64();
                let timeout = self.timeout.as_secs_f64();
                write!(
                    f,
                    "SSL CERTIFICATE OK - {days} day(s) left for this certificate. \
                    end date is [{not_after}] on {host} port {port} sni {sni}\
                    |time={elapsed:.6}s;;;0.000000;{timeout:.6}"
                )
            }
            CertificateState::Critical(reason) => {
                write!(
                    f,
                    "SSL CERTIFICATE CRITICAL: {reason} on {host} port {port} sni {sni}"
                )
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use chrono::TimeZone;

    fn build_checked(state: CertificateState) -> Checked {
        Checked {
            state,
            host: "example.com".to_string(),
            port: 443,
            sni: None,
            timeout: Duration::from_secs(10),
            elapsed: None,
        }
    }

    #[test]
    fn t_display_ok() {
        let not_after = Utc.timestamp(2145916800, 0);
        let mut result = build_checked(CertificateState::Ok {
            days: 100,
            not_after,
        });
        result.elapsed = Some(Duration::from_micros(12_345));

        let left = format!("{result}");
        let right = "SSL CERTIFICATE OK - 100 day(s) left for this certificate. \
            end date is [2038-01-01 00:00:00 UTC] on example.com port 443 sni -\
            |time=0.012345s;;;0.000000;10.000000";
        assert_eq!(left, right);
    }

    #[test]
    fn t_display_ok_with_sni() {
        let not_after = Utc.timestamp(2145916800, 0);
        let mut result = build_checked(CertificateState::Ok {
            days: 100,
            not_after,
        });
        result.sni = Some("example.org".to_string());
        result.elapsed = Some(Duration::from_micros(12_345));

        assert!(format!("{result}").contains(" on example.com port 443 sni example.org|"));
    }

    #[test]
    fn t_display_expired() {
        let not_after = Utc.timestamp(2145916800, 0);
        let result = build_checked(CertificateState::Critical(Reason::Expired {
            days_ago: 2,
            not_after,
        }));

        let left = format!("{result}");
        let right = "SSL CERTIFICATE CRITICAL: this certificate expired 2 day(s) ago. \
            end date is [2038-01-01 00:00:00 UTC] on example.com port 443 sni -";
        assert_eq!(left, right);
    }

    #[test]
    fn t_display_near_expiry() {
        let not_after = Utc.timestamp(2145916800, 0);
        let result = build_checked(CertificateState::Critical(Reason::NearExpiry {
            days: 3,
            not_after,
        }));

        let left = format!("{result}");
        let right = "SSL CERTIFICATE CRITICAL: only 3 left for this certificate. \
            end date is [2038-01-01 00:00:00 UTC] on example.com port 443 sni -";
        assert_eq!(left, right);
    }

    #[test]
    fn t_display_timeout() {
        let result = build_checked(CertificateState::Critical(Reason::Timeout));

        let left = format!("{result}");
        let right = "SSL CERTIFICATE CRITICAL: connection or tls handshake timeout \
            on example.com port 443 sni -";
        assert_eq!(left, right);
    }

    #[test]
    fn t_display_verify_failures() {
        let result = build_checked(CertificateState::Critical(Reason::Chain(
            "unknown issuer".to_string(),
        )));
        assert!(format!("{result}").contains("failed verify chains [unknown issuer]"));

        let result = build_checked(CertificateState::Critical(Reason::Hostname(
            "certificate not valid for name".to_string(),
        )));
        assert!(
            format!("{result}").contains("failed verify hostname [certificate not valid for name]")
        );
    }

    #[test]
    fn t_is_critical() {
        let result = build_checked(CertificateState::Critical(Reason::NoCertificate));
        assert!(result.is_critical());

        let result = build_checked(CertificateState::Ok {
            days: 100,
            not_after: Utc.timestamp(2145916800, 0),
        });
        assert!(!result.is_critical());
    }
}
