// Training process lifecycle management

pub mod supervisor;

pub use supervisor::{SharedSupervisor, StopOutcome, SupervisorError, TrainingSupervisor};
