//! TypeScript Generation Tests
//!
//! Validates that Shiplink types can be successfully exported to TypeScript
//! when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<shiplink::TelemetryPacket>();
    assert_type::<shiplink::AckPacket>();
    assert_type::<shiplink::Timestamp>();
    assert_type::<shiplink::ReceiverStats>();
    assert_type::<shiplink::SenderStats>();
    assert_type::<shiplink::LinkStatus>();
    assert_type::<shiplink::SenderEvent>();
    assert_type::<shiplink::UpdateRate>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = shiplink::UpdateRate::Native;
}
