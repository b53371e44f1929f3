//! Appointment scheduling for a barber shop: free-slot computation, booking
//! without double-booking, and token-based cancellation.
//!
//! The core ([`Scheduler`]) is synchronous and talks to storage only through
//! the traits in [`ports`]. [`store::JournaledStore`] and
//! [`catalog::InMemoryCatalog`] implement them in process; the background
//! pieces ([`confirmation`], [`compactor`], [`notify`]) need a tokio runtime.

pub mod calendar;
pub mod catalog;
pub mod compactor;
pub mod config;
pub mod confirmation;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod ports;
pub mod store;
pub mod wal;

pub use engine::{EngineError, Missing, Scheduler};
