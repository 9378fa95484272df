//! Core of the weather-data aggregation node: the Lamport-clocked PUT/GET
//! protocol binding producers and query clients to a single in-memory store.
//!
//! The three participant roles (aggregator, producer, query client) share one
//! wire protocol (`codec`); only the aggregator side is implemented here. The
//! socket layer is isolated in [`transport`] so [`codec`] and [`handlers`]
//! stay generic over any `AsyncRead + AsyncWrite` stream.

pub mod checkpoint;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod run;
pub mod transport;

pub use config::Config;
pub use error::AggError;
