pub mod controller;
pub mod importer;
pub mod scheduler;
pub mod state;

pub use controller::{ControllerOptions, SessionController};
pub use scheduler::{ManualScheduler, StepScheduler, TimerDriver, TimerScheduler};
pub use state::StatusSnapshot;
