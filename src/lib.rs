//! An event-driven microsimulation of HIV and four other sexually transmitted infections
//! (chlamydia, gonorrhea, syphilis and HSV-2) spreading over a dynamic sexual-contact network.
//!
//! The central object of a simulation is the [`Context`](context::Context), which keeps the
//! clock, the queue of future plans and the data of every module. The modules build on it:
//! * [`population`] holds the arena of people and the symmetric relationships between them.
//! * [`scheduler`] turns [`event::Event`]s into plans, either at fixed times or when an
//!   exponential draw of integrated hazard ([`hazard`]) runs out, and recomputes hazard-driven
//!   events whenever one of their people changes.
//! * [`relationships`] forms and dissolves relationships and starts each person's sexual
//!   activity.
//! * [`disease`] implements transmission, progression, diagnosis, treatment, seeding and import
//!   for each of the five diseases, generically over the [`disease::Disease`] trait.
//! * [`mortality`] and [`screening`] cover background deaths and routine testing, and [`prep`]
//!   offers pre-exposure prophylaxis against HIV to people at risk.
//! * [`simulation`] and [`runner`] assemble a run from a flat JSON configuration
//!   ([`config`], [`parameters`]) and write its CSV reports ([`report`], [`event_log`]).
pub mod config;
pub mod context;
pub mod disease;
pub mod error;
pub mod event;
pub mod event_log;
pub mod global_properties;
pub mod hashing;
pub mod hazard;
pub mod log;
pub mod mortality;
pub mod parameters;
pub mod plan;
pub mod population;
pub mod prep;
pub mod random;
pub mod relationships;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod screening;
pub mod simulation;

pub use context::Context;
pub use error::SimError;

// Re-exports used by `define_rng!`
pub use paste;
pub use rand;
