//! Decision engine — poll, forecast, act.

use std::sync::Arc;
use std::time::Duration;

use nfscale_fleet::InfrastructureStrategy;
use nfscale_forecast::{ForecastError, ForecastResult, Forecaster};
use nfscale_monitor::{MetricSource, MetricWindow};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::error::{EngineError, EngineResult};
use crate::settings::EngineSettings;

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The window is not full yet.
    Collecting,
    /// Metric fetch or forecast failed; nothing was decided.
    Skipped,
    /// Signal inside the thresholds.
    Hold,
    ScaledOut,
    ScaledIn,
    ScaleOutFailed,
    ScaleInFailed,
    /// Signal below the lower threshold but the fleet is at its floor.
    ScaleInRefused,
}

/// Sequential control loop over one metric stream and one fleet.
///
/// `running_services` is the engine's own count. It is exact right after a
/// reconciliation and adjusted by one on every successful action.
pub struct DecisionEngine {
    source: Box<dyn MetricSource>,
    forecaster: Arc<dyn Forecaster>,
    strategy: Box<dyn InfrastructureStrategy>,
    settings: EngineSettings,
    window: MetricWindow,
    running_services: usize,
    /// A fit that outlived its timeout. Blocking tasks cannot be cancelled,
    /// so no new fit starts until this one finishes.
    stalled: Option<PredictTask>,
    span: Span,
}

type PredictTask = JoinHandle<ForecastResult<Vec<f64>>>;

impl DecisionEngine {
    pub fn new(
        source: Box<dyn MetricSource>,
        forecaster: Arc<dyn Forecaster>,
        strategy: Box<dyn InfrastructureStrategy>,
        settings: EngineSettings,
    ) -> Self {
        let span = info_span!("engine", forecaster = forecaster.name());
        Self {
            source,
            forecaster,
            strategy,
            window: MetricWindow::new(settings.minimal_monitorings),
            settings,
            running_services: 0,
            stalled: None,
            span,
        }
    }

    pub fn running_services(&self) -> usize {
        self.running_services
    }

    pub fn window(&self) -> &MetricWindow {
        &self.window
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Reconcile with the fleet and bring it up to the service floor.
    ///
    /// Stops at the first failed add. Returns the resulting count.
    pub async fn initialize(&mut self) -> usize {
        let span = self.span.clone();
        self.initialize_inner().instrument(span).await
    }

    async fn initialize_inner(&mut self) -> usize {
        self.reconcile().await;
        let floor = self.settings.minimal_services;
        info!(running = self.running_services, floor, "initial reconciliation");

        while self.running_services < floor {
            if !self.add().await {
                warn!(
                    running = self.running_services,
                    floor,
                    "could not reach the service floor, continuing"
                );
                break;
            }
        }
        self.running_services
    }

    /// Cycle until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async {
            info!(
                interval_secs = self.settings.interval.as_secs(),
                window = self.settings.minimal_monitorings,
                lookahead = self.settings.lookahead,
                "decision engine started"
            );

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    outcome = self.cycle_inner() => debug!(?outcome, "cycle finished"),
                    _ = shutdown.changed() => break,
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.settings.interval) => {}
                    _ = shutdown.changed() => break,
                }
            }

            info!(running = self.running_services, "decision engine stopped");
        }
        .instrument(span)
        .await
    }

    /// One poll → decide → act pass.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let span = self.span.clone();
        self.cycle_inner().instrument(span).await
    }

    async fn cycle_inner(&mut self) -> CycleOutcome {
        match self.window.poll(self.source.as_ref()).await {
            Ok(added) => debug!(added, len = self.window.len(), "window polled"),
            Err(e) => {
                warn!(error = %EngineError::from(e), "skipping cycle");
                return CycleOutcome::Skipped;
            }
        }

        if self.window.len() < self.settings.minimal_monitorings {
            debug!(
                have = self.window.len(),
                need = self.settings.minimal_monitorings,
                "collecting samples"
            );
            return CycleOutcome::Collecting;
        }

        let signal = match forecast_signal(
            Arc::clone(&self.forecaster),
            self.window.series(),
            self.settings.lookahead,
            self.settings.forecast_timeout,
            &mut self.stalled,
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping cycle");
                return CycleOutcome::Skipped;
            }
        };

        let thresholds = self.settings.thresholds;
        info!(signal, upper = thresholds.upper, lower = thresholds.lower, "forecast");

        let outcome = if signal > thresholds.upper {
            self.reconcile().await;
            if self.add().await {
                CycleOutcome::ScaledOut
            } else {
                CycleOutcome::ScaleOutFailed
            }
        } else if signal < thresholds.lower {
            self.reconcile().await;
            let at_floor = self.running_services <= self.settings.minimal_services;
            if self.remove().await {
                CycleOutcome::ScaledIn
            } else if at_floor {
                CycleOutcome::ScaleInRefused
            } else {
                CycleOutcome::ScaleInFailed
            }
        } else {
            CycleOutcome::Hold
        };

        if matches!(outcome, CycleOutcome::ScaledOut | CycleOutcome::ScaledIn) {
            // The backlog predates the new capacity.
            self.window.reset();
        }
        outcome
    }

    async fn reconcile(&mut self) {
        let observed = self.strategy.get_running_services().await;
        if observed != self.running_services {
            debug!(tracked = self.running_services, observed, "running count reconciled");
        }
        self.running_services = observed;
    }

    /// Start one instance. `false` leaves the count untouched.
    pub async fn add(&mut self) -> bool {
        if self.strategy.add_service().await {
            self.running_services += 1;
            info!(running = self.running_services, "scaled out");
            true
        } else {
            warn!(running = self.running_services, "scale out failed");
            false
        }
    }

    /// Stop one instance unless the fleet is at its floor.
    pub async fn remove(&mut self) -> bool {
        let floor = self.settings.minimal_services;
        if self.running_services <= floor {
            warn!(running = self.running_services, floor, "at service floor, not scaling in");
            return false;
        }

        if self.strategy.remove_service().await {
            self.running_services -= 1;
            info!(running = self.running_services, "scaled in");
            true
        } else {
            warn!(running = self.running_services, "scale in failed");
            false
        }
    }
}

/// Fit on a blocking thread and return the last horizon point.
///
/// A fit that times out is parked in `stalled`; while it runs, later calls
/// fail fast instead of queueing more work on the blocking pool.
async fn forecast_signal(
    forecaster: Arc<dyn Forecaster>,
    series: Vec<f64>,
    horizon: usize,
    limit: Duration,
    stalled: &mut Option<PredictTask>,
) -> EngineResult<f64> {
    if stalled.as_ref().is_some_and(|task| !task.is_finished()) {
        return Err(EngineError::ForecastInFlight);
    }
    // A finished stale fit describes an old window; discard it.
    *stalled = None;

    let mut task = tokio::task::spawn_blocking(move || forecaster.predict(&series, horizon));
    let predicted = match tokio::time::timeout(limit, &mut task).await {
        Err(_) => {
            *stalled = Some(task);
            return Err(ForecastError::Timeout(limit).into());
        }
        Ok(Err(join)) => return Err(EngineError::Aborted(join.to_string())),
        Ok(Ok(result)) => result?,
    };

    let signal = predicted
        .last()
        .copied()
        .ok_or_else(|| ForecastError::InvalidModel("empty forecast".to_string()))?;
    if !signal.is_finite() {
        return Err(ForecastError::NonFinite(predicted.len() - 1).into());
    }
    Ok(signal)
}
