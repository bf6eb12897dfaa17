pub mod ids;
pub mod outcome;
pub mod events;

pub use ids::{JobId, IdAllocator, MAX_JOB_ID};
pub use outcome::JobOutcome;
pub use events::JobEvent;
