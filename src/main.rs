#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

//! SSL Certificate Check

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::debug;

use scc::{AddressFamily, CheckConfig, Checker};

const OK: u8 = 0;
#[allow(dead_code)]
const WARNING: u8 = 1;
const CRITICAL: u8 = 2;
const UNKNOWN: u8 = 3;

#[derive(Debug, Parser)]
#[command(author, about, version)]
struct Opts {
    /// Timeout in seconds to wait for connection
    #[arg(long, default_value = "10")]
    timeout: u64,
    /// IP address or host name
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    hostname: String,
    /// Port number
    #[arg(short, long, default_value = "443")]
    port: u16,
    /// Specify hostname for SNI
    #[arg(long)]
    sni: Option<String>,
    /// Verify SNI hostname
    #[arg(long)]
    verify_sni: bool,
    /// Verify all certificate chains
    #[arg(long)]
    verify_chains: bool,
    /// The critical threshold in days before expiry
    #[arg(short, long, default_value = "14")]
    critical: i64,
    /// Use tcp4 only
    #[arg(short = '4', long = "tcp4")]
    tcp4: bool,
    /// Use tcp6 only
    #[arg(short = '6', long = "tcp6")]
    tcp6: bool,
}

impl Opts {
    fn into_config(self) -> anyhow::Result<CheckConfig> {
        if self.tcp4 && self.tcp6 {
            anyhow::bail!("Both tcp4 and tcp6 are specified");
        }

        let sni = self.sni.filter(|s| !s.is_empty());
        if self.verify_sni && sni.is_none() {
            anyhow::bail!("--sni is required when use --verify-sni");
        }

        let family = if self.tcp4 {
            AddressFamily::V4
        } else if self.tcp6 {
            AddressFamily::V6
        } else {
            AddressFamily::Any
        };

        Ok(CheckConfig {
            host: self.hostname,
            port: self.port,
            timeout: Duration::from_secs(self.timeout),
            sni,
            verify_sni: self.verify_sni,
            verify_chains: self.verify_chains,
            critical_in_days: self.critical,
            family,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    // clap routes --help and --version through the error path
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::from(OK)
                }
                _ => ExitCode::from(UNKNOWN),
            };
        }
    };

    let config = match opts.into_config() {
        Ok(config) => config,
        Err(e) => {
            println!("{e}");
            return ExitCode::from(UNKNOWN);
        }
    };

    debug!("check {config:?}");
    let result = Checker::default().check(&config).await;
    println!("{result}");

    if result.is_critical() {
        ExitCode::from(CRITICAL)
    } else {
        ExitCode::from(OK)
    }
}
