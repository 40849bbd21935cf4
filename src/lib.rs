#![deny(unused_must_use)]
#![forbid(unsafe_code)]
//! A parser for TCG (TPM) event logs, as found in
//! `/sys/kernel/security/tpm0/binary_bios_measurements`.
//!
//! Framing errors abort a parse. Event data that cannot be decoded never does: it is kept as
//! [`EventData::Invalid`] together with the raw bytes.
//!
//! ```no_run
//! use tcglog::{LogOptions, ParserSettings, TcgLogParser};
//!
//! let settings = ParserSettings::new().log_options(LogOptions::new().with_grub(true));
//! let log = TcgLogParser::from_path("binary_bios_measurements")?
//!     .with_configuration(settings)
//!     .parse_log()?;
//!
//! for event in &log.events {
//!     println!("{:>2} {} {}", event.pcr_index, event.event_type, event.data);
//! }
//! # Ok::<(), tcglog::err::LogError>(())
//! ```

#[macro_use]
mod macros;

pub mod algorithm;
pub mod decode;
pub mod decoders;
pub mod digest;
pub mod err;
pub mod event;
pub mod event_data;
pub mod event_type;
pub mod guid;
pub mod log_parser;
mod utils;

pub use algorithm::{AlgorithmId, AlgorithmIdList};
pub use decode::{LogOptions, decode_event_data};
pub use decoders::DecoderOutcome;
pub use decoders::tcg::Spec;
pub use digest::{Digest, DigestMap};
pub use event::Event;
pub use event_data::{EventData, InvalidReason, TypedEventData};
pub use event_type::{EventType, PcrIndex};
pub use guid::Guid;
pub use log_parser::{Log, ParserSettings, TcgLogParser};
pub use utils::hexdump;

// For tests, we only initialize logging once.
#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    LOGGER_INIT.call_once(env_logger::init);
}
