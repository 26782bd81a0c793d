pub mod clock;
pub mod controller;
pub mod edge;
pub mod link;
pub mod loop_worker;
pub mod modbus;
pub mod simulated;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::PollerController;
pub use edge::{EdgeDetector, ObservedLevel, TransitionEvent};
pub use link::{PlcConnector, PlcLink, TagAddress};
pub use loop_worker::{Poller, PollerStats};
pub use modbus::ModbusConnector;
pub use simulated::SimulatedPress;
