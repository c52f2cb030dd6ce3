// greenlink - greenhouse controller connectivity core
// Dual-path (WiFi/cellular) networking with an asynchronous HTTP transaction
// engine, built to survive flaky radios and a seldom-reliable modem

pub mod api;
pub mod config;
pub mod platform;
pub mod session;
pub mod sim;
pub mod transport;
