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

pub use checked::{CertificateState, Checked, Reason};
pub use checker::{AddressFamily, CheckConfig, Checker};

mod checked;
mod checker;
