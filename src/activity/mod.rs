//! Activity tracking: what each agent terminal is doing right now.
//!
//! [`classify`] turns raw PTY output into an [`ActivitySignal`](crate::ActivitySignal);
//! [`ActivityStore`] smooths those signals into a per-task busy flag with
//! a minimum hold time and a soft timeout, and fans updates out to
//! listeners.

mod classifier;
mod store;

pub use classifier::{classify, classify_text, extract_action, strip_ansi, SPINNER_CHARS};
pub use store::{
    task_key, ActionUpdate, ActivityConfig, ActivitySnapshot, ActivityStore, BusyUpdate,
    Subscription, DEFAULT_HOLD, DEFAULT_SOFT_CLEAR,
};
