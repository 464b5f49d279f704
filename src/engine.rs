//! Event-driven capacity tariff engine.
//!
//! Every reading, host event and alarm is processed to completion before the next one.
//! Components talk only through the [`Hub`] channels:
//!
//! - the integrator publishes energy updates;
//! - the peak hour tracker consumes them and publishes the tariff level through the classifier;
//! - the budget estimator and the sensors consume both.

pub mod budget;
pub mod integrator;
pub mod peak_hours;
pub mod scheduler;
pub mod sensors;
pub mod snapshot;
pub mod tariff;

use std::{cell::RefCell, rc::Rc};

use chrono::{DateTime, Local};

use crate::{
    broadcast::{Hub, SubscriptionId},
    clock::{start_of_hour, start_of_next_hour, start_of_next_month},
    config::Config,
    engine::{
        budget::BudgetEstimator,
        integrator::EnergyIntegrator,
        peak_hours::{Month, PeakHours},
        scheduler::{Alarm, AlarmId, ReplayScheduler, Scheduler},
        sensors::{Readout, Sensors},
        snapshot::Snapshot,
        tariff::Classifier,
    },
    meter::{HostEventType, Input, Reading},
    prelude::*,
};

pub struct Engine {
    precision: u8,
    hub: Hub,
    integrator: EnergyIntegrator,
    peak_hours: Rc<RefCell<PeakHours>>,
    classifier: Rc<Classifier>,
    estimator: Rc<RefCell<BudgetEstimator>>,
    sensors: Rc<RefCell<Sensors>>,
    effect_subscriptions: Vec<SubscriptionId>,
    threshold_subscriptions: Vec<SubscriptionId>,
    hour_alarm: Option<AlarmId>,
    month_alarm: Option<AlarmId>,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        let hub = Hub::default();
        let peak_hours = Rc::new(RefCell::new(PeakHours::default()));
        let classifier =
            Rc::new(Classifier::new(config.levels.clone(), Rc::clone(&hub.threshold)));
        let estimator =
            Rc::new(RefCell::new(BudgetEstimator::new(config.target(), config.max_power)));
        let sensors = Rc::new(RefCell::new(Sensors::default()));

        let mut effect_subscriptions = Vec::new();
        let mut threshold_subscriptions = Vec::new();

        effect_subscriptions.push({
            let peak_hours = Rc::clone(&peak_hours);
            let classifier = Rc::clone(&classifier);
            hub.effect.subscribe(move |update| {
                let Some(update) = update else {
                    return Ok(());
                };
                let mut peak_hours =
                    peak_hours.try_borrow_mut().context("peak hours are being updated")?;
                if peak_hours.roll_over(Month::of(&update.at)) {
                    classifier.clear();
                }
                if peak_hours.observe(&update.at, update.energy).is_changed() {
                    classifier.reclassify(&peak_hours);
                }
                Ok(())
            })
        });

        effect_subscriptions.push({
            let estimator = Rc::clone(&estimator);
            hub.effect.subscribe(move |update| {
                estimator.try_borrow_mut().context("estimator is busy")?.on_energy(update);
                Ok(())
            })
        });
        if estimator.borrow().follows_tariff() {
            let estimator = Rc::clone(&estimator);
            threshold_subscriptions.push(hub.threshold.subscribe(move |update| {
                estimator.try_borrow_mut().context("estimator is busy")?.on_threshold(update);
                Ok(())
            }));
        }

        effect_subscriptions.push({
            let sensors = Rc::clone(&sensors);
            hub.effect.subscribe(move |update| {
                sensors.try_borrow_mut().context("sensors are busy")?.on_energy(update);
                Ok(())
            })
        });
        threshold_subscriptions.push({
            let sensors = Rc::clone(&sensors);
            hub.threshold.subscribe(move |update| {
                sensors.try_borrow_mut().context("sensors are busy")?.on_threshold(update);
                Ok(())
            })
        });

        Self {
            precision: config.precision,
            hub,
            integrator: EnergyIntegrator::default(),
            peak_hours,
            classifier,
            estimator,
            sensors,
            effect_subscriptions,
            threshold_subscriptions,
            hour_alarm: None,
            month_alarm: None,
        }
    }

    pub const fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Seed the state from a snapshot saved at an earlier run.
    #[instrument(skip_all, fields(saved_at = ?snapshot.saved_at))]
    pub fn restore(&mut self, snapshot: Snapshot, now: DateTime<Local>) {
        if let Some(energy) = snapshot.energy_used_this_hour {
            if start_of_hour(&snapshot.saved_at) == start_of_hour(&now) {
                info!(?energy, "restored the energy used this hour");
                self.integrator.restore(energy);
            } else {
                info!("the saved energy belongs to another hour, ignoring");
            }
        }

        let month = Month::of(&now);
        if Month::of(&snapshot.saved_at) != month {
            info!("the snapshot belongs to another month, ignoring the peak hours");
            return;
        }

        if !snapshot.peak_hours.is_empty() {
            let mut peak_hours = self.peak_hours.borrow_mut();
            match peak_hours.restore(month, snapshot.peak_hours) {
                Ok(()) => {
                    info!(n_entries = peak_hours.entries().len(), "restored the peak hours");
                    self.classifier.reclassify(&peak_hours);
                    if self.hub.threshold.current().is_some() {
                        return;
                    }
                }
                Err(error) => {
                    warn!("ignoring the saved peak hours: {error:#}");
                }
            }
        }

        if let Some(threshold) = snapshot.level_threshold {
            info!(?threshold, "restored the level threshold");
            self.estimator.borrow_mut().restore_threshold(threshold);
        }
    }

    /// Arm the hour and month alarms.
    pub fn start(&mut self, now: DateTime<Local>, scheduler: &mut impl Scheduler) {
        self.hour_alarm = Some(scheduler.schedule(Alarm::HourBoundary, start_of_next_hour(&now)));
        self.month_alarm = Self::schedule_month_alarm(now, scheduler);
    }

    #[instrument(skip_all, fields(at = ?reading.at, state = %reading.state, unit = %reading.unit))]
    pub fn on_reading(&mut self, reading: Reading) {
        if let Some(update) = self.integrator.push(reading) {
            self.hub.effect.publish(update);
        }
    }

    #[instrument(skip(self, scheduler))]
    pub fn on_alarm(&mut self, alarm: Alarm, at: DateTime<Local>, scheduler: &mut impl Scheduler) {
        match alarm {
            Alarm::HourBoundary => {
                let boundary = start_of_hour(&at);
                let (closing, opening) = self.integrator.reset_hour(boundary);
                if let Some(closing) = closing {
                    self.hub.effect.publish(closing);
                }
                self.hub.effect.publish(opening);
                self.hour_alarm =
                    Some(scheduler.schedule(Alarm::HourBoundary, start_of_next_hour(&boundary)));
            }
            Alarm::MonthBoundary => {
                info!("new month");
                self.reset_peak_hours();
                self.month_alarm = Self::schedule_month_alarm(at, scheduler);
            }
        }
    }

    #[instrument(skip(self))]
    pub fn on_reset_peak_hours(&mut self, at: DateTime<Local>) {
        info!("peak hours reset requested");
        self.reset_peak_hours();
    }

    pub fn on_input(&mut self, input: Input) {
        match input {
            Input::Reading(reading) => self.on_reading(reading),
            Input::Event(event) => match event.event_type {
                HostEventType::ResetPeakHours => self.on_reset_peak_hours(event.time_fired),
            },
        }
    }

    /// Fire the replay alarms due at or before the instant.
    pub fn advance_to(&mut self, until: DateTime<Local>, scheduler: &mut ReplayScheduler) {
        while let Some((at, alarm)) = scheduler.pop_due(until) {
            self.on_alarm(alarm, at, scheduler);
        }
    }

    pub fn readout(&self) -> Readout {
        self.sensors.borrow().readout(self.estimator.borrow().budget(), self.precision)
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Local>) -> Snapshot {
        let estimator = self.estimator.borrow();
        Snapshot {
            saved_at: now,
            energy_used_this_hour: self.integrator.accumulated(),
            peak_hours: self.peak_hours.borrow().entries().to_vec(),
            level_threshold: if estimator.follows_tariff() { estimator.threshold() } else { None },
        }
    }

    /// Cancel the alarms and release the channel subscriptions.
    pub fn shutdown(&mut self, scheduler: &mut impl Scheduler) {
        for id in [self.hour_alarm.take(), self.month_alarm.take()].into_iter().flatten() {
            scheduler.cancel(id);
        }
        for id in self.effect_subscriptions.drain(..) {
            self.hub.effect.unsubscribe(id);
        }
        for id in self.threshold_subscriptions.drain(..) {
            self.hub.threshold.unsubscribe(id);
        }
        debug!(
            effect = self.hub.effect.n_subscribers(),
            threshold = self.hub.threshold.n_subscribers(),
            "shut down",
        );
    }

    fn reset_peak_hours(&self) {
        self.peak_hours.borrow_mut().clear();
        self.classifier.clear();
    }

    fn schedule_month_alarm(
        now: DateTime<Local>,
        scheduler: &mut impl Scheduler,
    ) -> Option<AlarmId> {
        let Some(at) = start_of_next_month(&now) else {
            error!(?now, "the start of the next month does not exist in the local time zone");
            return None;
        };
        Some(scheduler.schedule(Alarm::MonthBoundary, at))
    }
}
