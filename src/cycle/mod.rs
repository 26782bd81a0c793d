pub mod observation;
pub mod reader;

pub use observation::{
    cycle_is_plausible, last_change_instant, level_transitioned, observed_full_cycle,
    CycleObservation,
};
pub use reader::{CycleMonitor, CycleStatus, SignalReader};
