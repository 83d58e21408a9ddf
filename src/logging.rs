/// Initializes `tracing` output for the command line tools.
///
/// Events go to stderr so stdout stays a clean JSON stream. Verbosity is
/// read from `RUST_LOG`, e.g. `RUST_LOG=jsonapi_payload=debug`.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
