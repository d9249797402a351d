//! Mission orchestration: the engine, its results, and the observer that
//! keeps a mission in line with the current plan.

mod engine;
mod observer;
mod result;

pub use engine::{Mission, MONITOR_INTERVAL, RESTART_BACKOFF, TERMINATE_GRACE};
pub use observer::{DefaultMissionScope, MissionObserver, MissionScope};
pub use result::{groups, Detail, DetailCategory, MissionResult};
