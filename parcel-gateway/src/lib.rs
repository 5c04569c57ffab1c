//! HTTP gateway in front of the parcel ledger contract.
//!
//! Every route maps to exactly one remote contract operation; all parcel
//! state lives on the ledger. The binary wires [`config`] + [`ledger`] into
//! the [`api`] router and serves it on a fixed port.

pub mod api;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod models;
