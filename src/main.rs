// # flowdev engine host
//
// Process entry point that boots the flow engine and reports its status.
// There is no network listener here and no device-node registration —
// those are external collaborators per spec.md §1/§6. This binary exists
// so the engine's lifecycle (init, run, shutdown) has somewhere to live
// outside of tests, and so `flowdev-cli` has something to attach to when
// both are wired into a real character-device front end.

use flowdev::{Config, Engine, Priority, VERSION};
use tracing::info;
use tracing_subscriber;

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let config = Config::default();
    info!("starting flowdev engine v{}", VERSION);
    info!(
        endpoints = config.endpoint_count,
        page_size = config.page_size,
        max_pages = config.max_pages,
        capacity = config.flow_capacity(),
        "engine configuration"
    );

    let engine = Engine::new(config);
    print_endpoint_summary(&engine);

    info!("engine ready; shutting down (no persistent front end attached)");
    engine.shutdown();
}

fn print_banner() {
    println!(
        r#"
  _____ _                 ____
 |  ___| | _____      __ |  _ \  _____   __
 | |_  | |/ _ \ \ /\ / / | | | |/ _ \ \ / /
 |  _| | | (_) \ V  V /  | |_| |  __/\ V /
 |_|   |_|\___/ \_/\_/   |____/ \___| \_/

 multi-endpoint, dual-priority stream engine
"#
    );
}

fn print_endpoint_summary(engine: &Engine) {
    let enabled = (0..engine.config().endpoint_count)
        .filter(|&id| engine.is_enabled(id).unwrap_or(false))
        .count();
    println!(
        "endpoints: {} total, {} enabled",
        engine.config().endpoint_count,
        enabled
    );
    if let Ok(bytes) = engine.bytes_stored(0, Priority::High) {
        println!("endpoint 0 (high) bytes stored: {bytes}");
    }
}
