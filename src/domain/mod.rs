//! Core domain types shared by the spawner, registry and activity store

mod activity;
mod pty_id;

pub use activity::{ActivitySignal, Classification};
pub use pty_id::{PtyId, PtyIdKind};
