//! ==============================================================================
//! growtent-host - climate relay for two grow tents
//! ==============================================================================
//!
//! sensors push temperature/humidity readings for the blütezelt and the
//! aufzuchtszelt over http or a websocket. each reading is stamped, kept in
//! memory, mirrored to a json file per zone, and pushed live to every open
//! dashboard. the api hands the full history back out.
//!
//! ==============================================================================

pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod seed;
pub mod server;
pub mod store;
