//! Inter-server peer registry for Mudwire.
//!
//! Game servers on a loose network announce themselves periodically and
//! send a departure packet when they shut down. This crate keeps track
//! of who is out there.
//!
//! # Key types
//!
//! - [`PeerRecord`]: what is known about one peer
//! - [`PeerTable`]: the single-owner map of records
//! - [`PeerRegistry`]: handle to the actor that owns the process-wide table
//! - [`PeerError`]: the actor has gone away

mod error;
mod record;
mod registry;
mod table;

pub use error::PeerError;
pub use record::PeerRecord;
pub use registry::{DEFAULT_CHANNEL_SIZE, PeerRegistry};
pub use table::PeerTable;
