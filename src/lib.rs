//! uggcli: a terminal hypermedia browser for the UGTP protocol.
//!
//! A UGTP server exposes named *pages* — declarative descriptions of
//! rectangular regions, text, input forms and key-bound actions. The
//! browser fetches pages (plaintext or TLS), composes them with a local
//! chrome, renders them into a terminal cell grid, routes keystrokes
//! through the active binding table, drives forms, and persists per-origin
//! cookies in an encrypted vault.
//!
//! Module map: `boxes`/`wrap` are the cell-grid layout engine, `convert`
//! turns wire objects into renderables, `session` owns the RPC channel,
//! `cookies` + `vault` hold browser state, `forms` is the modal input
//! runtime, `browser` orchestrates everything, `local_pages` synthesizes
//! the chrome and the built-in pages, `cex` vends fetch contexts, and
//! `terminal` wraps the backend.

pub mod boxes;
pub mod browser;
pub mod cex;
pub mod colors;
pub mod convert;
pub mod cookies;
pub mod forms;
pub mod local_pages;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod terminal;
pub mod ugri;
pub mod vault;
pub mod wrap;
