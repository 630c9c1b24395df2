mod controller;
mod delay;
mod state;

pub use controller::{StallSource, StallStats, WriteController};
pub use delay::{DelayPolicy, ProportionalDelay};
pub use state::{
    AdmissionDecision, AtomicWriteAdmission, StallCause, WriteAdmission, evaluate_admission,
};
