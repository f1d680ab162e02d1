//! Logging facilities for Tether.
//!
//! Tether uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("tether_net=debug")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "tether_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "tether_core::signal";
    /// Connection establishment target.
    pub const CONNECT: &str = "tether_net::connect";
    /// Receive loop target.
    pub const RECEIVE: &str = "tether_net::receive";
    /// Listening server target.
    pub const SERVER: &str = "tether_net::server";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn test_targets_are_namespaced() {
        for target in [targets::SIGNAL, targets::CONNECT, targets::RECEIVE, targets::SERVER] {
            assert!(target.starts_with("tether_"), "{target}");
            assert!(target.contains("::"), "{target}");
        }
        assert!(targets::SIGNAL.starts_with(targets::CORE));
    }
}
