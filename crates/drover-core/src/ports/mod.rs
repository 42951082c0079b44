//! Ports - 差し替え可能な依存
//!
//! The dispatcher reads time and allocates ids only through these traits.

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
