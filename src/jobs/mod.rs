// Job bookkeeping

pub mod registry;

pub use registry::{JobRegistry, MAX_IN_FLIGHT_PROGRESS};
