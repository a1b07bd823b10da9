use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::SharedConfig;
use super::shutdown::ShutdownGuard;
use super::state::{CapTarget, ThrottleDecision, ThrottlePhase, ThrottleState};
use crate::api_client::types::{ControllerStatus, CpuCeiling};
use crate::hw::{Celsius, CpuFreq, CpuId, FrequencyCap, Khz, PowerControl, TemperatureSensor};
use crate::tracing::prelude::*;

/// What the run loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run the next tick after this delay.
    Reschedule(Duration),
    /// Critical shutdown was triggered; no further ticks.
    Shutdown,
}

/// CPU thermal throttling controller.
///
/// Each tick samples the sensor once, evaluates the transition rules for
/// the current phase, clamps every available CPU's cpufreq ceiling when a
/// transition fires and commits the new phase. The delay before the next
/// tick depends on the committed phase: hotter phases poll faster.
pub struct ThermalController {
    config: SharedConfig,
    sensor: Box<dyn TemperatureSensor>,
    cpufreq: Box<dyn CpuFreq>,
    shutdown: ShutdownGuard,
    state: ThrottleState,
    status_tx: watch::Sender<ControllerStatus>,
    last_temperature: Option<Celsius>,
    applied: BTreeMap<CpuId, Khz>,
    sensor_failures: u32,
}

impl ThermalController {
    pub fn new(
        config: SharedConfig,
        sensor: Box<dyn TemperatureSensor>,
        cpufreq: Box<dyn CpuFreq>,
        power: Arc<dyn PowerControl>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ControllerStatus::default());

        Self {
            config,
            sensor,
            cpufreq,
            shutdown: ShutdownGuard::new(power),
            state: ThrottleState::default(),
            status_tx,
            last_temperature: None,
            applied: BTreeMap::new(),
            sensor_failures: 0,
        }
    }

    /// Status snapshots, updated after every tick.
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    /// Handle on the shutdown latch, for other contexts that watch
    /// temperature.
    pub fn shutdown_guard(&self) -> ShutdownGuard {
        self.shutdown.clone()
    }

    pub fn current_phase(&self) -> ThrottlePhase {
        self.state.phase()
    }

    #[cfg(test)]
    fn set_phase(&mut self, phase: ThrottlePhase) {
        self.state.commit(phase);
    }

    /// Tick until cancelled or until a critical shutdown.
    ///
    /// The first tick runs immediately. The next one is armed only after the
    /// current tick has finished, so ticks never overlap.
    pub async fn run(mut self, cancellation: CancellationToken) {
        info!(sensor = self.sensor.id(), "Thermal controller started");

        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!("Thermal controller cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.tick().await {
                TickOutcome::Reschedule(next) => delay = next,
                TickOutcome::Shutdown => {
                    warn!("Thermal controller stopped after critical shutdown");
                    break;
                }
            }
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        if self.shutdown.is_triggered() {
            return TickOutcome::Shutdown;
        }

        let config = self.config.snapshot();

        let temperature = match self.sensor.read_temperature().await {
            Ok(temp) => {
                self.sensor_failures = 0;
                temp
            }
            Err(e) => {
                self.sensor_failures = self.sensor_failures.saturating_add(1);
                error!(
                    sensor = self.sensor.id(),
                    failures = self.sensor_failures,
                    error = %e,
                    "Failed to read temperature sensor"
                );
                let delay = config.failure_poll_interval();
                self.publish(delay);
                return TickOutcome::Reschedule(delay);
            }
        };
        self.last_temperature = Some(temperature);

        let phase = self.state.phase();
        let decision = ThrottleDecision::evaluate(temperature, phase, &config);

        if decision == ThrottleDecision::Shutdown {
            self.shutdown.trigger(temperature);
            self.publish(Duration::ZERO);
            return TickOutcome::Shutdown;
        }

        let applied = self.apply(phase, decision).await;

        if let ThrottleDecision::Transition { next, .. } = decision {
            if !applied {
                warn!(
                    phase = %phase,
                    target_phase = %next,
                    temp_c = temperature,
                    "Cap not applied to every CPU, retrying next tick"
                );
            } else if next != phase {
                info!(
                    previous_phase = %phase,
                    new_phase = %next,
                    temp_c = temperature,
                    "Throttle phase changed"
                );
            }
            if applied {
                self.state.commit(next);
            }
        }

        let delay = config.poll_interval(self.state.phase());

        debug!(
            temp_c = temperature,
            phase = %self.state.phase(),
            decision = ?decision,
            next_poll_ms = delay.as_millis() as u64,
            "Thermal control tick"
        );

        self.publish(delay);
        TickOutcome::Reschedule(delay)
    }

    /// Walk every possible CPU, recording restore ceilings while unthrottled
    /// and writing the selected cap when `decision` is a transition.
    ///
    /// Returns false if any CPU with a policy rejected its write. CPUs
    /// without a policy are offline and do not count.
    async fn apply(&mut self, phase: ThrottlePhase, decision: ThrottleDecision) -> bool {
        let cpus = self.cpufreq.possible_cpus().to_vec();
        let mut all_applied = true;

        for cpu in cpus {
            let Some(policy) = self.cpufreq.policy(cpu).await else {
                trace!(cpu, "No cpufreq policy, skipping");
                continue;
            };

            // A retried transition finds some CPUs already at our cap;
            // that is not a ceiling to restore to.
            if phase == ThrottlePhase::Unthrottled
                && self.applied.get(&cpu) != Some(&policy.max_khz)
            {
                self.state.record_ceiling(cpu, policy.max_khz);
            }

            let ThrottleDecision::Transition { cap, .. } = decision else {
                continue;
            };

            let cap = match cap {
                CapTarget::Frequency(khz) => FrequencyCap::Limit(khz),
                CapTarget::Restore => self.state.restore_cap(cpu),
            };
            let khz = policy.clamp(cap);

            match self.cpufreq.set_policy_max(&policy, khz).await {
                Ok(()) => {
                    self.applied.insert(cpu, khz);
                }
                Err(e) => {
                    warn!(cpu, khz, error = %e, "Failed to update cpufreq policy");
                    all_applied = false;
                }
            }
        }

        all_applied
    }

    fn publish(&self, next_poll: Duration) {
        let status = ControllerStatus {
            phase: self.state.phase(),
            temperature_c: self.last_temperature,
            ceilings: self
                .applied
                .iter()
                .map(|(&cpu, &khz)| CpuCeiling { cpu, khz })
                .collect(),
            next_poll_ms: next_poll.as_millis() as u64,
            sensor_failures: self.sensor_failures,
            shutdown_triggered: self.shutdown.is_triggered(),
        };
        self.status_tx.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::fake::{FAKE_MAX_KHZ, FAKE_MIN_KHZ, FakeCpuFreq, FakePower, FakeSensor};
    use crate::thermal::config::{ConfigKey, TemperatureBand, ThermalConfig};
    use crate::thermal::ThrottlePhase::*;

    const LOW_FREQ: Khz = 1_242_000;
    const MID_FREQ: Khz = 1_026_000;
    const MAX_FREQ: Khz = 810_000;

    fn config(lows: [Celsius; 3]) -> ThermalConfig {
        ThermalConfig {
            shutdown_temp: 80,
            low: TemperatureBand {
                high: 65,
                low: lows[0],
                freq: LOW_FREQ,
            },
            mid: TemperatureBand {
                high: 70,
                low: lows[1],
                freq: MID_FREQ,
            },
            max: TemperatureBand {
                high: 75,
                low: lows[2],
                freq: MAX_FREQ,
            },
            poll_ms: 500,
            low_poll_ms: 250,
            mid_max_poll_ms: 100,
            ..Default::default()
        }
    }

    struct Harness {
        controller: ThermalController,
        config: SharedConfig,
        sensor: FakeSensor,
        cpufreq: FakeCpuFreq,
        power: Arc<FakePower>,
    }

    fn harness_with(config: ThermalConfig, cpus: CpuId) -> Harness {
        let config = SharedConfig::new(config).unwrap();
        let sensor = FakeSensor::default();
        let cpufreq = FakeCpuFreq::new(cpus);
        let power = Arc::new(FakePower::default());
        let controller = ThermalController::new(
            config.clone(),
            Box::new(sensor.clone()),
            Box::new(cpufreq.clone()),
            power.clone(),
        );

        Harness {
            controller,
            config,
            sensor,
            cpufreq,
            power,
        }
    }

    fn harness() -> Harness {
        harness_with(config([60, 65, 70]), 4)
    }

    impl Harness {
        async fn feed(&mut self, temp: Celsius) -> TickOutcome {
            self.sensor.set(Some(temp));
            self.controller.tick().await
        }
    }

    #[tokio::test]
    async fn scenario_heating_walks_every_phase_then_shuts_down() {
        let mut h = harness();
        let mut phases = Vec::new();

        for temp in [60, 66, 71, 76] {
            h.feed(temp).await;
            phases.push(h.controller.current_phase());
        }
        let outcome = h.feed(81).await;

        assert_eq!(phases, vec![Unthrottled, Phase1, Phase2, Phase3]);
        assert_eq!(outcome, TickOutcome::Shutdown);
        assert_eq!(h.power.calls(), 1);
    }

    #[tokio::test]
    async fn scenario_cooling_walks_back_down() {
        let mut h = harness_with(config([62, 68, 73]), 4);
        h.controller.set_phase(Phase3);
        let mut phases = Vec::new();

        for temp in [76, 72, 67, 61] {
            h.feed(temp).await;
            phases.push(h.controller.current_phase());
        }

        assert_eq!(phases, vec![Phase3, Phase2, Phase1, Unthrottled]);
    }

    #[tokio::test]
    async fn sensor_failure_changes_nothing_and_polls_fast() {
        let mut h = harness();
        h.feed(66).await;
        h.cpufreq.take_writes();

        h.sensor.set(None);
        let outcome = h.controller.tick().await;

        assert_eq!(outcome, TickOutcome::Reschedule(Duration::from_millis(100)));
        assert_eq!(h.controller.current_phase(), Phase1);
        assert!(h.cpufreq.take_writes().is_empty());
        assert_eq!(h.cpufreq.max(0), Some(LOW_FREQ));
    }

    #[tokio::test]
    async fn sensor_failure_uses_fast_interval_from_any_phase() {
        let mut h = harness();
        h.sensor.set(None);

        let outcome = h.controller.tick().await;

        assert_eq!(outcome, TickOutcome::Reschedule(Duration::from_millis(100)));
        assert_eq!(h.controller.current_phase(), Unthrottled);
        assert_eq!(h.controller.subscribe().borrow().sensor_failures, 1);
    }

    #[tokio::test]
    async fn repeated_reading_writes_policy_only_once() {
        let mut h = harness();

        h.feed(66).await;
        let first = h.cpufreq.take_writes();
        h.feed(66).await;
        let second = h.cpufreq.take_writes();

        assert_eq!(
            first,
            vec![(0, LOW_FREQ), (1, LOW_FREQ), (2, LOW_FREQ), (3, LOW_FREQ)]
        );
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn poll_interval_follows_committed_phase() {
        let mut h = harness();

        assert_eq!(
            h.feed(50).await,
            TickOutcome::Reschedule(Duration::from_millis(500))
        );
        assert_eq!(
            h.feed(66).await,
            TickOutcome::Reschedule(Duration::from_millis(250))
        );
        assert_eq!(
            h.feed(71).await,
            TickOutcome::Reschedule(Duration::from_millis(100))
        );
        assert_eq!(
            h.feed(76).await,
            TickOutcome::Reschedule(Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn release_restores_ceiling_seen_while_unthrottled() {
        let mut h = harness();
        h.cpufreq.set_max(1, 1_512_000);

        h.feed(50).await;
        h.feed(76).await;
        assert_eq!(h.cpufreq.max(1), Some(MAX_FREQ));

        h.feed(55).await;

        assert_eq!(h.controller.current_phase(), Unthrottled);
        assert_eq!(h.cpufreq.max(0), Some(FAKE_MAX_KHZ));
        assert_eq!(h.cpufreq.max(1), Some(1_512_000));
    }

    #[tokio::test]
    async fn release_without_recorded_ceiling_lifts_limit() {
        let mut h = harness();
        h.controller.set_phase(Phase2);
        h.cpufreq.set_max(0, MID_FREQ);

        h.feed(55).await;

        assert_eq!(h.cpufreq.max(0), Some(FAKE_MAX_KHZ));
    }

    #[tokio::test]
    async fn cap_never_drops_below_policy_floor() {
        let mut cfg = config([60, 65, 70]);
        cfg.max.freq = 100_000;
        let mut h = harness_with(cfg, 1);

        h.feed(77).await;

        assert_eq!(h.cpufreq.max(0), Some(FAKE_MIN_KHZ));
    }

    #[tokio::test]
    async fn unplugged_cpu_is_skipped() {
        let mut h = harness();
        h.cpufreq.unplug(3);

        h.feed(66).await;

        let cpus: Vec<_> = h.cpufreq.take_writes().into_iter().map(|(c, _)| c).collect();
        assert_eq!(cpus, vec![0, 1, 2]);
        assert_eq!(h.controller.current_phase(), Phase1);
    }

    #[tokio::test]
    async fn policy_error_skips_only_that_cpu() {
        let mut h = harness();
        h.cpufreq.fail_writes(1);

        h.feed(71).await;

        let cpus: Vec<_> = h.cpufreq.take_writes().into_iter().map(|(c, _)| c).collect();
        assert_eq!(cpus, vec![0, 2, 3]);
        assert_eq!(h.controller.current_phase(), Unthrottled);
        let status = h.controller.subscribe().borrow().clone();
        assert_eq!(status.phase, Unthrottled);
        assert!(!status.ceilings.iter().any(|c| c.cpu == 1));
    }

    #[tokio::test]
    async fn rejected_cap_is_retried_until_every_cpu_takes_it() {
        let mut h = harness_with(config([60, 65, 70]), 2);
        h.cpufreq.fail_writes(1);

        h.feed(71).await;
        h.feed(71).await;
        assert_eq!(h.controller.current_phase(), Unthrottled);
        assert_eq!(h.cpufreq.max(1), Some(FAKE_MAX_KHZ));

        h.cpufreq.accept_writes(1);
        h.feed(71).await;

        assert_eq!(h.controller.current_phase(), Phase2);
        assert_eq!(h.cpufreq.max(0), Some(MID_FREQ));
        assert_eq!(h.cpufreq.max(1), Some(MID_FREQ));
    }

    #[tokio::test]
    async fn retried_transition_keeps_original_restore_ceiling() {
        let mut h = harness_with(config([60, 65, 70]), 2);
        h.cpufreq.fail_writes(1);

        h.feed(71).await;
        h.cpufreq.accept_writes(1);
        h.feed(71).await;
        assert_eq!(h.controller.current_phase(), Phase2);

        h.feed(55).await;

        assert_eq!(h.controller.current_phase(), Unthrottled);
        assert_eq!(h.cpufreq.max(0), Some(FAKE_MAX_KHZ));
        assert_eq!(h.cpufreq.max(1), Some(FAKE_MAX_KHZ));
    }

    #[tokio::test]
    async fn no_cpu_taking_the_cap_leaves_phase_alone() {
        let mut h = harness_with(config([60, 65, 70]), 2);
        h.cpufreq.fail_writes(0);
        h.cpufreq.fail_writes(1);

        for _ in 0..3 {
            h.feed(71).await;
        }

        assert_eq!(h.controller.current_phase(), Unthrottled);
        assert_eq!(h.cpufreq.max(0), Some(FAKE_MAX_KHZ));
        assert_eq!(h.cpufreq.max(1), Some(FAKE_MAX_KHZ));
        let status = h.controller.subscribe().borrow().clone();
        assert_eq!(status.phase, Unthrottled);
    }

    #[tokio::test]
    async fn max_band_is_reapplied_every_tick() {
        let mut h = harness();

        h.feed(77).await;
        h.cpufreq.take_writes();
        h.feed(77).await;

        assert_eq!(h.cpufreq.take_writes().len(), 4);
        assert_eq!(h.controller.current_phase(), Phase3);
    }

    #[tokio::test]
    async fn config_update_applies_on_next_tick() {
        let mut h = harness();
        h.feed(66).await;
        assert_eq!(h.controller.current_phase(), Phase1);

        h.config.set(ConfigKey::AllowedLowLow, 64).unwrap();
        h.config.set(ConfigKey::AllowedLowFreq, 1_134_000).unwrap();
        h.feed(63).await;

        assert_eq!(h.controller.current_phase(), Unthrottled);

        h.feed(66).await;
        assert_eq!(h.cpufreq.max(2), Some(1_134_000));
    }

    #[tokio::test]
    async fn status_snapshot_tracks_tick() {
        let mut h = harness_with(config([60, 65, 70]), 2);
        let status_rx = h.controller.subscribe();

        h.feed(71).await;

        let status = status_rx.borrow().clone();
        assert_eq!(status.phase, Phase2);
        assert_eq!(status.temperature_c, Some(71));
        assert_eq!(status.next_poll_ms, 100);
        assert_eq!(
            status.ceilings,
            vec![
                CpuCeiling {
                    cpu: 0,
                    khz: MID_FREQ
                },
                CpuCeiling {
                    cpu: 1,
                    khz: MID_FREQ
                }
            ]
        );
        assert!(!status.shutdown_triggered);
    }

    #[tokio::test]
    async fn committed_phase_is_always_defined() {
        let mut h = harness();
        // Deterministic pseudo-random walk over 40..=79 °C.
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let temp = 40 + ((seed >> 16) % 40) as Celsius;
            let outcome = h.feed(temp).await;

            assert!(matches!(outcome, TickOutcome::Reschedule(_)));
            if temp >= 75 {
                assert_eq!(h.controller.current_phase(), Phase3);
            }
            let phase = h.controller.current_phase();
            let max = h.cpufreq.max(0).unwrap();
            match phase {
                Phase3 => assert_eq!(max, MAX_FREQ),
                Phase2 => assert_eq!(max, MID_FREQ),
                Phase1 => assert_eq!(max, LOW_FREQ),
                Unthrottled => assert_eq!(max, FAKE_MAX_KHZ),
            }
        }
    }

    #[tokio::test]
    async fn tick_after_shutdown_does_nothing() {
        let mut h = harness();
        h.feed(85).await;
        let reads = h.sensor.reads();

        assert_eq!(h.feed(50).await, TickOutcome::Shutdown);
        assert_eq!(h.sensor.reads(), reads);
        assert_eq!(h.power.calls(), 1);
        assert!(h.controller.subscribe().borrow().shutdown_triggered);
    }

    #[tokio::test]
    async fn external_trigger_stops_controller() {
        let mut h = harness();
        let guard = h.controller.shutdown_guard();

        assert!(guard.trigger(90));

        assert_eq!(h.feed(50).await, TickOutcome::Shutdown);
        assert_eq!(h.power.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_reschedules_until_cancelled() {
        let h = harness();
        h.sensor.set(Some(50));
        let sensor = h.sensor.clone();
        let running = CancellationToken::new();

        let task = tokio::spawn(h.controller.run(running.clone()));

        // Ticks at 0, 500 and 1000 ms.
        tokio::time::sleep(Duration::from_millis(1250)).await;
        assert_eq!(sensor.reads(), 3);

        running.cancel();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sensor.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_faster_while_throttled() {
        let h = harness();
        h.sensor.set(Some(71));
        let sensor = h.sensor.clone();
        let running = CancellationToken::new();

        let task = tokio::spawn(h.controller.run(running.clone()));

        // Ticks at 0, 100, ..., 900 ms.
        tokio::time::sleep(Duration::from_millis(950)).await;
        running.cancel();
        task.await.unwrap();

        assert_eq!(sensor.reads(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_after_critical_shutdown() {
        let h = harness();
        h.sensor.set(Some(50));
        let sensor = h.sensor.clone();
        let power = h.power.clone();

        let task = tokio::spawn(h.controller.run(CancellationToken::new()));
        tokio::time::sleep(Duration::from_millis(600)).await;
        sensor.set(Some(90));

        task.await.unwrap();

        assert_eq!(power.calls(), 1);
        let reads = sensor.reads();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sensor.reads(), reads);
    }
}
