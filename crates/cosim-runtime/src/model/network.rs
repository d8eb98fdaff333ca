//! Leaky integrate-and-fire cells driven by a step current and noisy
//! spike generators.
//!
//! Every scalar lives in an [`ArenaStore`] and is addressable by name:
//!
//! | Name | Meaning | Typical port |
//! |------|---------|--------------|
//! | `cell{i}.v` | membrane potential (mV) | output vars |
//! | `cell{i}.g_syn` | external synaptic conductance (uS) | input |
//! | `cell{i}.spike` | spike count; fires when `v` crosses threshold | output events |
//! | `stim{i}` | generator event count; fires on each event | output events |

use std::collections::HashMap;

use cosim_bridge::adapters::ArenaStore;
use cosim_bridge::VarHandle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParams {
    pub v_init: f64,
    pub v_rest: f64,
    pub v_threshold: f64,
    pub v_reset: f64,
    /// Membrane time constant (ms)
    pub tau_m: f64,
    /// Input resistance (MOhm), so nA * MOhm = mV
    pub r_m: f64,
    /// Synaptic reversal potential (mV)
    pub e_syn: f64,
    /// Step current amplitude (nA) and onset (ms)
    pub clamp_amp: f64,
    pub clamp_delay: f64,
    /// Depolarization per generator event (mV)
    pub stim_jump: f64,
}

impl Default for CellParams {
    fn default() -> Self {
        Self {
            v_init: -68.0,
            v_rest: -65.0,
            v_threshold: -50.0,
            v_reset: -65.0,
            tau_m: 10.0,
            r_m: 100.0,
            e_syn: 0.0,
            clamp_amp: 0.1,
            clamp_delay: 5.0,
            stim_jump: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    v: VarHandle,
    g_syn: VarHandle,
    spike: VarHandle,
}

/// Event generator with exponential jitter; `noise = 1` is Poisson.
#[derive(Debug, Clone, Copy)]
struct SpikeGenerator {
    handle: VarHandle,
    target: usize,
    interval: f64,
    noise: f64,
    next: f64,
}

impl SpikeGenerator {
    fn draw_interval(&self, rng: &mut StdRng) -> f64 {
        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        self.interval * ((1.0 - self.noise) + self.noise * -u.ln())
    }
}

pub struct DemoNetwork {
    params: CellParams,
    store: ArenaStore,
    cells: Vec<Cell>,
    generators: Vec<SpikeGenerator>,
    names: HashMap<String, VarHandle>,
    rng: StdRng,
    time: f64,
}

impl DemoNetwork {
    /// `cells` cells, each with one generator of mean interval `10 + i` ms
    /// starting at 5 ms.
    #[must_use]
    pub fn new(cells: usize, seed: u64) -> Self {
        Self::with_params(cells, seed, CellParams::default())
    }

    #[must_use]
    pub fn with_params(cells: usize, seed: u64, params: CellParams) -> Self {
        let mut store = ArenaStore::with_capacity(cells * 4);
        let mut names = HashMap::new();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut cell_list = Vec::with_capacity(cells);
        let mut generators = Vec::with_capacity(cells);
        for i in 0..cells {
            let cell = Cell {
                v: store.push(params.v_init),
                g_syn: store.push(0.0),
                spike: store.push(0.0),
            };
            names.insert(format!("cell{i}.v"), cell.v);
            names.insert(format!("cell{i}.g_syn"), cell.g_syn);
            names.insert(format!("cell{i}.spike"), cell.spike);
            cell_list.push(cell);

            let mut generator = SpikeGenerator {
                handle: store.push(0.0),
                target: i,
                interval: 10.0 + i as f64,
                noise: 1.0,
                next: 0.0,
            };
            generator.next = 5.0 + generator.draw_interval(&mut rng);
            names.insert(format!("stim{i}"), generator.handle);
            generators.push(generator);
        }

        Self {
            params,
            store,
            cells: cell_list,
            generators,
            names,
            rng,
            time: 0.0,
        }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<VarHandle> {
        self.names.get(name).copied()
    }

    /// Every variable name, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn store(&self) -> &ArenaStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ArenaStore {
        &mut self.store
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advance by `dt` ms with forward Euler. Returns the handles of every
    /// event source that fired during the step.
    pub fn step(&mut self, dt: f64) -> Vec<VarHandle> {
        self.time += dt;
        let t = self.time;
        let p = self.params;
        let mut fired = Vec::new();

        for generator in &mut self.generators {
            while generator.next <= t {
                fired.push(generator.handle);
                bump(&mut self.store, generator.handle, 1.0);
                bump(&mut self.store, self.cells[generator.target].v, p.stim_jump);
                generator.next += generator.draw_interval(&mut self.rng);
            }
        }

        let clamp = if t >= p.clamp_delay { p.clamp_amp } else { 0.0 };
        for cell in &self.cells {
            let v = self.store.get(cell.v).unwrap_or(p.v_rest);
            let g = self.store.get(cell.g_syn).unwrap_or(0.0);
            let current = clamp + g * (p.e_syn - v);
            let mut next = v + dt / p.tau_m * (-(v - p.v_rest) + p.r_m * current);
            if next >= p.v_threshold {
                next = p.v_reset;
                bump(&mut self.store, cell.spike, 1.0);
                fired.push(cell.spike);
            }
            if let Some(slot) = self.store.get_mut(cell.v) {
                *slot = next;
            }
        }
        fired
    }
}

fn bump(store: &mut ArenaStore, handle: VarHandle, by: f64) {
    if let Some(slot) = store.get_mut(handle) {
        *slot += by;
    }
}
