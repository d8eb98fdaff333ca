//! The shipped demo configuration stays in sync with the demo model.

use cosim_bridge::adapters::TomlBridgeConfig;
use cosim_runtime::model::DemoNetwork;

const DEMO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/bridge.toml");

#[test]
fn test_demo_config_parses() {
    let config = TomlBridgeConfig::load(DEMO).unwrap();
    assert!(config.rate.is_some());
    assert_eq!(config.output_vars.len(), 1);
    assert_eq!(config.output_events.len(), 1);
    assert_eq!(config.inputs.len(), 1);
    assert!(config.output_events[0].config.use_icp);
}

#[test]
fn test_demo_config_names_resolve() {
    let config = TomlBridgeConfig::load(DEMO).unwrap();
    let model = DemoNetwork::new(2, 1);
    let missing: Vec<_> = config
        .variables()
        .filter(|name| model.resolve(name).is_none())
        .collect();
    assert!(missing.is_empty(), "unresolved: {missing:?}");
}
