//! Full round trip: a segment delegates evaluation to a handler over the bus.
//!
//! Run with: `cargo run --example roundtrip`
//! (set `RUST_LOG=scriptrelay=debug` to watch the trigger/completion traffic)

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use scriptrelay::{
    Bus, Channels, Config, HandlerError, HandlerFn, HandlerRunner, ScriptSegment, SegmentRegistry,
    TriggerPayload,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scriptrelay=debug")),
        )
        .init();

    let cfg = Config::default();
    let bus = Bus::new(cfg.bus_capacity_clamped());
    let registry = SegmentRegistry::new();

    // External handler: checks the "enabled" key of the settings blob the
    // segment ships with each trigger.
    let handler = HandlerFn::arc("enabled-check", |t: TriggerPayload| async move {
        let settings: serde_json::Value =
            serde_json::from_str(&t.settings).map_err(HandlerError::fail)?;
        println!(
            "handler: trigger #{} from instance {} with settings {}",
            t.correlation_id, t.instance_id, t.settings
        );
        Ok(settings["enabled"].as_bool().unwrap_or(false))
    });
    let runner = HandlerRunner::spawn(bus.clone(), "demo.trigger", handler);

    let segment = ScriptSegment::builder(bus, registry, Channels::prefixed("demo"))
        .timeout(Duration::from_millis(500))
        .default_settings(serde_json::json!({ "enabled": true }))
        .build()?;

    let cancel = CancellationToken::new();
    println!("first call:  {}", segment.invoke(&cancel).await);

    segment.apply_settings(scriptrelay::Settings::from_value(
        serde_json::json!({ "enabled": false }),
    ));
    println!("second call: {}", segment.invoke(&cancel).await);

    // No handler left: the third call resolves by timeout.
    runner.shutdown().await;
    println!("third call:  {}", segment.invoke(&cancel).await);

    Ok(())
}
