//! Collaborator traits for the bestip workflow
//!
//! The engine talks to the outside world only through these seams.
//!
//! - [`IpListSource`]: Download a source's candidate list
//! - [`MeasurementRunner`]: Run the external speed-test tool
//! - [`ResultParser`]: Read the tool's result artifact
//! - [`DnsProvider`]: Read and write DNS records via a provider API

pub mod dns_provider;
pub mod ip_list;
pub mod measurement;

pub use dns_provider::{DnsProvider, RecordId, ZoneRef, is_managed_hostname};
pub use ip_list::{IpListSource, PreparedList};
pub use measurement::{MeasurementRequest, MeasurementRunner, ResultParser};
