//! hub: a multiplexing hub between one SUMO engine and several TraCI
//! clients, synchronized to the engine's simulation steps.

pub mod error;
pub mod hub;
pub mod session;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .try_init(); // no panic if already initialized
}
