//! Out-of-band registry operations driven by lifecycle broadcasts.
//!
//! A capability provider watches the new-instance channel and pushes temp
//! variables into every segment it discovers, addressing them purely by
//! instance id through the registry.
//!
//! Run with: `cargo run --example registry_ops`

use std::sync::Arc;
use std::time::Duration;

use scriptrelay::{Bus, Channels, Payload, ScriptSegment, SegmentRegistry};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Bus::new(64);
    let registry = SegmentRegistry::new();

    // Provider task: reacts to announcements, mutates segments by id.
    let provider_registry = Arc::clone(&registry);
    let mut created = bus.subscribe_channel("demo.new_instance");
    tokio::spawn(async move {
        while let Some(event) = created.recv().await {
            if let Payload::InstanceCreated { instance_id } = event.payload {
                provider_registry.register_temp_var(
                    instance_id,
                    "matched_text",
                    "Matched text",
                    "The text the script matched last",
                );
                provider_registry.set_temp_var_value(instance_id, "matched_text", "hello");
                println!("provider: equipped instance {instance_id}");
            }
        }
    });

    let a = ScriptSegment::builder(
        bus.clone(),
        Arc::clone(&registry),
        Channels::prefixed("demo"),
    )
    .timeout(Duration::from_millis(250))
    .build()?;
    let b = a.clone(); // fresh id, announced like any other instance

    tokio::time::sleep(Duration::from_millis(50)).await;
    for seg in [&a, &b] {
        let vars = registry.temp_vars(seg.instance_id()).unwrap_or_default();
        println!("instance {}: {vars:?}", seg.instance_id());
    }

    let stale_id = b.instance_id();
    drop(b);
    // Addressing a destroyed instance is a silent no-op.
    registry.set_temp_var_value(stale_id, "matched_text", "too late");
    println!("after drop, instance {stale_id} resolvable: {}", registry.contains(stale_id));

    Ok(())
}
