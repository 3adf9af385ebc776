//! ESC Configurator
//!
//! Headless front end for the device-session coordinator. The coordinator
//! itself lives in `escfg-app`; this crate wires it to stdin/stdout.

pub mod headless;

pub use headless::run_headless;
