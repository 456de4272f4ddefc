//! Host session runtime: session actor + transfer pool + socket server.

mod error;
pub mod monitor;
pub mod paths;
pub mod pool;
pub mod protocol;
mod runtime;
pub mod session;

pub use error::DaemonError;
pub use monitor::{HandshakeDecision, HandshakeMonitor, MonitorState};
pub use protocol::{
    request_activate, request_add, request_list, request_notify, request_remove, request_select,
    request_simple, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use session::{
    Session, SessionEvent, SessionHandle, SessionNotice, SessionStatus, TransferSummary,
};
