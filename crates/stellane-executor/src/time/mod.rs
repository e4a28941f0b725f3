mod sleep;
mod timer;

pub use sleep::{Sleep, WithTimeout, sleep_for, sleep_until, with_timeout};
pub use timer::{TimerCallback, TimerDriver};
