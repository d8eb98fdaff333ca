//! `cosim run`: integrate the demo network through the bridge.

use std::collections::HashMap;

use anyhow::{Context, Result};
use cosim_bridge::adapters::TomlBridgeConfig;
use cosim_bridge::{BridgeReport, CoSimApi, CoSimBridge, PortId, VarHandle};
use cosim_telemetry::log_port_event;
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::commands::install_interrupt;
use crate::model::DemoNetwork;

/// Event sources to the events ports that publish them.
pub type EventRoutes = HashMap<VarHandle, Vec<PortId>>;

pub fn execute(args: &RunArgs) -> Result<()> {
    let config = TomlBridgeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut model = DemoNetwork::new(args.cells, args.seed);
    let mut bridge = config
        .build_bridge(|name| model.resolve(name))
        .context("setting up bridge ports")?;
    let routes = event_routes(&config, &bridge, &model);
    for port in bridge.report().ports {
        log_port_event!(
            info,
            port.port_number,
            port.kind,
            "Port configured",
            endpoint = %port.endpoint,
            bindings = port.bindings
        );
    }

    install_interrupt(&bridge.stop_handle())?;

    let report = simulate(&mut bridge, &routes, &mut model, args.tstop, args.dt);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Map each `[[output_events]]` source to its port.
///
/// Events ports are created in file order, so the n-th events port of the
/// bridge belongs to the n-th `[[output_events]]` table.
pub fn event_routes(
    config: &TomlBridgeConfig,
    bridge: &CoSimBridge,
    model: &DemoNetwork,
) -> EventRoutes {
    let events_ports = bridge
        .port_ids()
        .filter(|&id| bridge.output_events(id).is_some());

    let mut routes = EventRoutes::new();
    for (section, port) in config.output_events.iter().zip(events_ports) {
        for binding in &section.bindings {
            if let Some(handle) = model.resolve(&binding.var) {
                let ports = routes.entry(handle).or_default();
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    routes
}

/// Step until `tstop` or until the bridge asks to stop, then shut down.
pub fn simulate(
    bridge: &mut CoSimBridge,
    routes: &EventRoutes,
    model: &mut DemoNetwork,
    tstop: f64,
    dt: f64,
) -> BridgeReport {
    let t0 = model.time();
    bridge.begin(t0);
    info!(t0, tstop, dt, "Simulation started");

    let mut steps: u64 = 0;
    while model.time() + dt <= tstop + dt * 1e-6 {
        for handle in model.step(dt) {
            for &port in routes.get(&handle).into_iter().flatten() {
                if let Err(e) = bridge.on_source_event(port, handle) {
                    debug!(%port, %handle, error = %e, "Event not routed");
                }
            }
        }
        steps += 1;
        let t = model.time();
        if !bridge.advance_step(t, dt, model.store_mut()) {
            info!(t, "Stop requested");
            break;
        }
    }

    bridge.shutdown();
    info!(steps, t = model.time(), "Simulation finished");
    bridge.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_runs_to_tstop_without_ports() {
        let config = TomlBridgeConfig::parse("").unwrap();
        let mut model = DemoNetwork::new(1, 1);
        let mut bridge = config.build_bridge(|name| model.resolve(name)).unwrap();
        let routes = event_routes(&config, &bridge, &model);

        let report = simulate(&mut bridge, &routes, &mut model, 10.0, 0.025);
        assert_eq!(report.steps, 400);
        assert!((report.last_time - 10.0).abs() < 1e-9);
        assert!(bridge.is_closed());
    }

    #[test]
    fn test_stop_before_start_runs_nothing() {
        let config = TomlBridgeConfig::parse("").unwrap();
        let mut model = DemoNetwork::new(1, 1);
        let mut bridge = config.build_bridge(|name| model.resolve(name)).unwrap();
        bridge.stop_handle().stop();

        let report = simulate(&mut bridge, &EventRoutes::new(), &mut model, 10.0, 0.025);
        assert_eq!(report.steps, 0);
        assert!(report.stopped);
    }

    #[test]
    fn test_spikes_reach_events_port() {
        let (vars, events) = (free_port(), free_port());
        let toml = format!(
            r#"
[[output_vars]]
port_number = {vars}
host = "127.0.0.1"
sample_period = 1.0
flush_period = 5.0
bindings = [{{ group = 1, var = "cell0.v" }}]

[[output_events]]
port_number = {events}
host = "127.0.0.1"
sources = [{{ group = 7, var = "stim0" }}, {{ group = 8, var = "cell0.spike" }}]
"#
        );
        let config = TomlBridgeConfig::parse(&toml).unwrap();
        let mut model = DemoNetwork::new(1, 3);
        let mut bridge = config.build_bridge(|name| model.resolve(name)).unwrap();
        let routes = event_routes(&config, &bridge, &model);
        assert_eq!(routes.len(), 2);

        let report = simulate(&mut bridge, &routes, &mut model, 199.5, 0.025);

        let events_report = report.ports.iter().find(|p| p.kind == "output_events").unwrap();
        let fired = model.store().get(model.resolve("stim0").unwrap()).unwrap()
            + model.store().get(model.resolve("cell0.spike").unwrap()).unwrap();
        assert!(fired > 0.0);
        // Nobody subscribed, so every event is published but unrouted.
        assert_eq!(events_report.transport.unrouted_count as f64, fired);
        assert_eq!(events_report.metrics.unbound_sources, 0);
        assert_eq!(events_report.metrics.pre_ready_drops, 0);

        // 39 cadence flushes plus the final one on close.
        let vars_report = report.ports.iter().find(|p| p.kind == "output_vars").unwrap();
        assert_eq!(vars_report.metrics.samples_taken, 199);
        assert_eq!(vars_report.metrics.flushes, 40);
    }
}
