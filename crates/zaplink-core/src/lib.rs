//! Domain layer between `zaplink-api` and the smart-home host.
//!
//! This crate owns the business logic and reconciling state for the
//! zaplink workspace:
//!
//! - **[`Account`]** — Central facade managing the full lifecycle:
//!   [`login()`](Account::login) authenticates,
//!   [`build()`](Account::build) fetches the constants catalog and
//!   discovers the installation/charger hierarchy,
//!   [`start()`](Account::start) spawns the adaptive polling loop.
//!   Commands route through the operation-mode gate before any network
//!   round trip.
//!
//! - **[`DeviceStore`]** — Shared reconciling cache built on `DashMap`
//!   plus a `tokio::sync::watch` version channel. Confirmed server
//!   state and pending (optimistic) command state are kept in separate
//!   layers; a confirmed observation always supersedes the guess.
//!
//! - **[`ConstantsCatalog`]** — Bidirectional mapping between the
//!   vendor's unstable numeric codes and semantic names, fetched at
//!   build time. Unknown codes pass through under synthesized keys.
//!
//! - **[`PollScheduler`]** — Per-(device, class) due-time bookkeeping
//!   with cadence as a pure function of observed state: charging
//!   shrinks the state interval, failures back off for a bounded run
//!   before the device is flagged unavailable.
//!
//! - **Operation-mode rules** ([`modes`]) — The explicit
//!   (mode, command) transition table, including the two-step
//!   resume-then-authorize sequence for natively authenticated
//!   chargers.

pub mod account;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod modes;
pub mod poll;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use account::{Account, AvailableCurrent};
pub use catalog::{CodeCategory, ConstantsCatalog};
pub use config::AccountConfig;
pub use error::CoreError;
pub use model::{AttributeMap, Device, DeviceKind};
pub use modes::{ChargerCommand, CommandDecision, OperationMode, decide};
pub use poll::{CadencePolicy, PollClass, PollScheduler, cadence};
pub use store::DeviceStore;

// Re-export the api-side types a host needs to construct an account.
pub use zaplink_api::{ApiConfig, ApiError, Credentials, RateLimiter};
