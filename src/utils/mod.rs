pub mod clock;
pub mod duration;
pub mod timer;
pub mod url;

pub use clock::{Clock, ManualClock, SystemClock};
pub use duration::parse_duration;
pub use timer::{TimerHandle, spawn_delayed, spawn_repeating};
