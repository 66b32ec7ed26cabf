//! Task orchestrators. Each entry point branches once on the backend's
//! typed-generation capability: typed backends go through the self-critique
//! loop, plain-text backends get a single call plus structured extraction.

pub mod exam;
pub mod grading;
pub mod lookup;

pub use exam::{generate_exam, Worklist};
pub use grading::{evaluate_answer, fallback_grade};
pub use lookup::lookup;
