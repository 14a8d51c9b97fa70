/// Event-to-ledger routing and the single-writer capture state.
pub mod correlator;

pub use correlator::Correlator;
