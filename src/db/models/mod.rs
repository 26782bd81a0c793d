pub mod signal_record;

pub use signal_record::{SignalLevel, SignalPair, SignalRecord};
