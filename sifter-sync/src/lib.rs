//! # sifter-sync
//!
//! Device message encoding, the transport seam, and the ordered bulk transfer.
//!
//! Call [`SyncTransfer::run`] on a [`sifter_core::Snapshot`] from a blocking
//! worker, then [`TransferReport::apply_to`] on the interactive side to write
//! acknowledgments back into the registry.

pub mod error;
pub mod message;
pub mod transfer;
pub mod transport;

pub use error::{SyncError, TransferAborted};
pub use message::{
    encode, parse_dictionary, Dictionary, EncodeOptions, MessageKey, Notification, OutboundMessage,
    TupleValue,
};
pub use transfer::{SyncTransfer, TransferProgress, TransferReport};
pub use transport::{OutboxTransport, Transport, TransportError};
