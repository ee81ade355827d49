//! Frame scheduling
//!
//! [`FrameScheduler`] advances the simulation one generation per tick. A tick
//! records the compute dispatch for generation `g`, swaps buffer roles by
//! moving to `g + 1`, records the draw of `g + 1` and submits both as one
//! ordered command list before presenting. Compute for `g + 2` is only
//! recorded on the next tick, behind the draw in the device queue, so it can
//! never overwrite a buffer the draw is still reading.

use std::time::{Duration, Instant};

use rand::{rngs::StdRng, SeedableRng};

use crate::config::LifeConfig;
use crate::error::{DeviceError, LifeError, Result};
use crate::gfx::cell_renderer::RenderStage;
use crate::gfx::device::{CommandList, GraphicsDevice};
use crate::performance::TickMonitor;
use crate::simulation::{Dimensions, GridState, LifePattern, SimulationStage};

/// Where the scheduler is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Stepping,
    Presenting,
    /// A device failure stopped the scheduler for good.
    Halted,
}

pub struct FrameScheduler<D: GraphicsDevice> {
    device: D,
    grid: GridState,
    simulation: SimulationStage,
    render: RenderStage,
    generation: u64,
    state: SchedulerState,
    halt_reason: Option<String>,
    interval: Duration,
    next_deadline: Option<Instant>,
    monitor: TickMonitor,
}

impl<D: GraphicsDevice> FrameScheduler<D> {
    /// Build the grid and both stages on `device` and seed generation 0 from
    /// `config.pattern`.
    pub fn new(device: D, config: &LifeConfig) -> Result<Self> {
        Self::build(device, config, None)
    }

    /// Like [`new`](Self::new) but with an explicit generation 0.
    pub fn with_cells(device: D, config: &LifeConfig, cells: &[u32]) -> Result<Self> {
        Self::build(device, config, Some(cells))
    }

    fn build(mut device: D, config: &LifeConfig, cells: Option<&[u32]>) -> Result<Self> {
        config.validate()?;
        let dims = Dimensions::new(config.grid_width, config.grid_height)?;

        let grid = GridState::new(&mut device, dims)?;
        let simulation = SimulationStage::new(&mut device, dims, config.tile_size)?;
        let render = RenderStage::new(&mut device, dims, config.quad_scale, config.clear_color)?;

        match (cells, config.pattern) {
            (Some(cells), _) => grid.seed_cells(&mut device, cells)?,
            (None, LifePattern::Random) => match config.rng_seed {
                Some(seed) => grid.seed(
                    &mut device,
                    &mut StdRng::seed_from_u64(seed),
                    config.live_probability,
                )?,
                None => grid.seed(&mut device, &mut rand::rng(), config.live_probability)?,
            },
            (None, pattern) => grid.seed_cells(&mut device, &pattern.stamp_centered(dims))?,
        }

        log::info!(
            "Scheduler ready: {}x{} grid, {} pattern, {:?} per tick, {:?} workgroups",
            dims.width,
            dims.height,
            config.pattern.as_str(),
            config.tick_interval,
            simulation.workgroups()
        );

        Ok(Self {
            device,
            grid,
            simulation,
            render,
            generation: 0,
            state: SchedulerState::Idle,
            halt_reason: None,
            interval: config.tick_interval,
            next_deadline: None,
            monitor: TickMonitor::new(config.stats_interval),
        })
    }

    /// Advance one generation and present it.
    ///
    /// On a device failure the scheduler halts: the generation is left as it
    /// was and every later call returns [`LifeError::DeviceLost`].
    pub fn tick(&mut self) -> Result<()> {
        if self.state == SchedulerState::Halted {
            return Err(self.halted_error());
        }

        self.monitor.begin_tick();
        match self.issue_tick() {
            Ok(()) => {
                self.generation += 1;
                self.state = SchedulerState::Idle;
                self.monitor.end_tick(self.generation);
                log::trace!("Presented generation {}", self.generation);
                Ok(())
            }
            Err(err) => {
                self.monitor.abort_tick();
                self.state = SchedulerState::Halted;
                self.halt_reason = Some(err.to_string());
                log::error!(
                    "Halting at generation {}: {}",
                    self.generation,
                    err
                );
                Err(LifeError::DeviceLost(err))
            }
        }
    }

    fn issue_tick(&mut self) -> std::result::Result<(), DeviceError> {
        let generation = self.generation;
        if !self.device.preserves_submission_order() {
            self.device.wait_idle()?;
        }

        let mut commands = CommandList::new(format!("Generation {}", generation + 1));

        self.state = SchedulerState::Stepping;
        self.simulation.record(&self.grid, generation, &mut commands);

        // Generation g + 1 designates the buffer just written as active.
        self.state = SchedulerState::Presenting;
        self.render.record(&self.grid, generation + 1, &mut commands);

        self.device.submit(commands)?;
        self.device.present()
    }

    fn halted_error(&self) -> LifeError {
        LifeError::DeviceLost(DeviceError::Lost(
            self.halt_reason
                .clone()
                .unwrap_or_else(|| "scheduler halted".to_string()),
        ))
    }

    /// Fire at most one tick if its deadline has passed. Returns whether a
    /// tick ran.
    ///
    /// The first call anchors the cadence at `now` and ticks immediately.
    /// A scheduler that has fallen a whole interval behind records a missed
    /// deadline and re-anchors at `now + interval` rather than catching up.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        let deadline = *self.next_deadline.get_or_insert(now);
        if now < deadline {
            return Ok(false);
        }

        self.tick()?;

        let mut next = deadline + self.interval;
        if now >= next {
            self.monitor.record_missed_deadline(now - deadline);
            next = now + self.interval;
        }
        self.next_deadline = Some(next);
        Ok(true)
    }

    /// Run `ticks` ticks back to back.
    pub fn run(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Cell states of the current generation.
    pub fn snapshot(&mut self) -> Result<Vec<u32>> {
        self.grid.read_generation(&mut self.device, self.generation)
    }

    pub fn live_cells(&mut self) -> Result<usize> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|&cell| cell != 0)
            .count())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == SchedulerState::Halted
    }

    /// When the next tick is due. `None` until the first [`poll`](Self::poll).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn render_stage(&self) -> &RenderStage {
        &self.render
    }

    pub fn monitor(&self) -> &TickMonitor {
        &self.monitor
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}
