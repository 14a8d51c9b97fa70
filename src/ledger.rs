//! The call ledger: the single authoritative store of captured calls.

pub mod call;
pub mod call_ledger;

pub use call::{Body, Call, CallStatus, ContentKind, Direction, Frame, FullRecord, Transport};
pub use call_ledger::{CallLedger, LedgerKey};
