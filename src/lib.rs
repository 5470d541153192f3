// Cross-platform service manager: a systemd/SCM facade with CLI, dashboard
// and JSON-RPC front ends.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod manager;
pub mod rpc;
