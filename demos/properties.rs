//! Synchronous property-descriptor exchange.
//!
//! A provider publishes the typed field layout of its handler; segments ask
//! for it with `request_properties()` and get the descriptor back immediately,
//! or `None` when no provider is installed.
//!
//! Run with: `cargo run --example properties`

use std::time::Duration;

use scriptrelay::{
    Bus, Channels, PropertiesProvider, PropertyDescriptor, PropertyField, PropertyKind,
    ScriptSegment, SegmentRegistry,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Bus::new(16);
    let registry = SegmentRegistry::new();
    let channels = Channels::prefixed("file_check");

    let segment = ScriptSegment::builder(bus.clone(), registry, channels.clone())
        .timeout(Duration::from_millis(100))
        .build()?;

    // No provider yet: the request goes out but nothing fills the slot.
    assert!(segment.request_properties().is_none());
    println!("no provider installed: no descriptor");

    let provider = PropertiesProvider::install(&bus, channels.properties.clone(), |instance_id| {
        println!("provider: describing fields for instance {instance_id}");
        PropertyDescriptor::new(vec![
            PropertyField::new("path", "File path", PropertyKind::Text),
            PropertyField::new("recursive", "Recurse into directories", PropertyKind::Bool),
            PropertyField::new("max_depth", "Maximum depth", PropertyKind::Int),
        ])
    });

    if let Some(descriptor) = segment.request_properties() {
        println!("descriptor with {} fields:", descriptor.fields.len());
        for field in &descriptor.fields {
            println!("  {:>10} {:?} ({})", field.key, field.kind, field.label);
        }
    }

    drop(provider);
    assert!(segment.request_properties().is_none());
    println!("provider dropped: no descriptor again");

    Ok(())
}
