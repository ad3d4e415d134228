//! # farview-proxy: Remote Display Proxy
//!
//! Hosts the farview core for native clients: advertises the
//! configured globals, keeps one transport session per client and paces
//! frame callbacks against the remote peer's telemetry.
//!
//! Without a native display server or media stack linked in, the
//! [`headless`] backend stands in for both.

pub mod config;
pub mod headless;
pub mod service;
