//! Scheduling of simulation events on top of the `Context` plan queue.
//!
//! A scheduled event is kept in a store keyed by [`EventId`] and indexed by the people it
//! references. Each one owns exactly one pending plan on the `Context`; when the plan comes due
//! the event is taken out of the store and either discarded (if useless) or logged and fired.
//!
//! Hazard-driven events draw a unit exponential budget when scheduled. When one of their people
//! is marked affected, the budget consumed so far is measured with the hazard snapshot that was
//! in force, and only the remainder is spent under the new hazard.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::{error, trace};
use rand_distr::Exp1;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Timing};
use crate::event_log::ContextEventLogExt;
use crate::hashing::{HashMap, HashMapExt};
use crate::hazard::{HazardFunction, TimeLimitedHazardFunction};
use crate::plan::PlanId;
use crate::population::{ContextPopulationExt, PersonId};
use crate::random::ContextRandomExt;

define_rng!(SchedulerRng);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy)]
enum Clock {
    Hazard {
        hazard: TimeLimitedHazardFunction,
        budget: f64,
        since: f64,
    },
    Fixed,
}

struct ScheduledEvent {
    event: Rc<dyn Event>,
    plan_id: PlanId,
    fire_time: f64,
    clock: Clock,
}

struct SchedulerData {
    next_id: u64,
    events: BTreeMap<EventId, ScheduledEvent>,
    by_person: HashMap<PersonId, BTreeSet<EventId>>,
}

define_data_plugin!(
    SchedulerPlugin,
    SchedulerData,
    SchedulerData {
        next_id: 0,
        events: BTreeMap::new(),
        by_person: HashMap::new(),
    }
);

fn check_fire_time(event: &dyn Event, now: f64, fire_time: f64) -> Result<f64, SimError> {
    if fire_time.is_nan() || fire_time.is_infinite() || fire_time < now {
        return Err(SimError::InvariantViolation(format!(
            "{} computed an invalid fire time {fire_time} at t={now}",
            event.name()
        )));
    }
    Ok(fire_time)
}

/// True if the event references a dead person or reports itself useless
fn event_is_useless(context: &Context, event: &dyn Event) -> bool {
    event.persons().iter().any(|p| !context.is_alive(*p)) || event.is_useless(context)
}

fn initial_clock(context: &Context, event: &dyn Event, now: f64) -> Result<(f64, Clock), SimError> {
    match event.timing(context, now)? {
        Timing::Hazard(hazard) => {
            let budget: f64 = context.sample_distr(SchedulerRng, Exp1);
            let dt = hazard.capped_time_interval(now, budget);
            let fire_time = check_fire_time(event, now, now + dt)?;
            Ok((
                fire_time,
                Clock::Hazard {
                    hazard,
                    budget,
                    since: now,
                },
            ))
        }
        Timing::Delay(dt) => Ok((check_fire_time(event, now, now + dt)?, Clock::Fixed)),
        Timing::At(t) => Ok((check_fire_time(event, now, t.max(now))?, Clock::Fixed)),
    }
}

fn take_event(context: &mut Context, id: EventId) -> Option<ScheduledEvent> {
    let data = context.get_data_container_mut(SchedulerPlugin);
    let entry = data.events.remove(&id)?;
    for person in entry.event.persons() {
        if let Some(ids) = data.by_person.get_mut(&person) {
            ids.remove(&id);
            if ids.is_empty() {
                data.by_person.remove(&person);
            }
        }
    }
    Some(entry)
}

fn fire_scheduled_event(context: &mut Context, id: EventId) {
    if let Err(e) = try_fire_scheduled_event(context, id) {
        error!("stopping at t={}: {e}", context.get_current_time());
        context.abort(e);
    }
}

fn try_fire_scheduled_event(context: &mut Context, id: EventId) -> Result<(), SimError> {
    let Some(entry) = take_event(context, id) else {
        return Ok(());
    };
    let event = entry.event;
    let now = context.get_current_time();
    if event_is_useless(context, &*event) {
        trace!("discarding useless {} event {id}", event.name());
        return Ok(());
    }

    let persons = event.persons();
    context.log_event(&event.name(), &persons)?;
    event.fire(context, now)?;

    let mut affected = persons;
    for person in event.mark_other_affected(context) {
        if !affected.contains(&person) {
            affected.push(person);
        }
    }
    for person in affected {
        context.mark_affected(person)?;
    }
    Ok(())
}

pub trait ContextSchedulerExt {
    /// Compute the event's first firing time and queue it
    ///
    /// # Errors
    ///
    /// Returns an error if the event's timing cannot be computed or yields an invalid time.
    fn schedule_event<E: Event>(&mut self, event: E) -> Result<EventId, SimError>;

    /// Recompute every pending event that references `person`, in event id order. Useless events
    /// are discarded; hazard-driven events are rescheduled with their remaining budget; events
    /// with a fixed time keep it.
    ///
    /// # Errors
    ///
    /// Returns an error if a recomputed timing is invalid.
    fn mark_affected(&mut self, person: PersonId) -> Result<(), SimError>;

    /// When a pending event will fire
    fn pending_event_time(&self, id: EventId) -> Option<f64>;

    /// The log category of a pending event
    fn pending_event_name(&self, id: EventId) -> Option<String>;

    /// Pending events referencing `person`, in id order
    fn pending_events_for(&self, person: PersonId) -> Vec<EventId>;

    /// Number of pending events of the category
    fn pending_event_count(&self, name: &str) -> usize;

    /// True if an event of the category is pending for exactly these people, in this order
    fn has_pending_event(&self, name: &str, persons: &[PersonId]) -> bool;
}

impl ContextSchedulerExt for Context {
    fn schedule_event<E: Event>(&mut self, event: E) -> Result<EventId, SimError> {
        let now = self.get_current_time();
        let event: Rc<dyn Event> = Rc::new(event);
        let (fire_time, clock) = initial_clock(self, &*event, now)?;

        let data = self.get_data_container_mut(SchedulerPlugin);
        let id = EventId(data.next_id);
        data.next_id += 1;
        for person in event.persons() {
            data.by_person.entry(person).or_default().insert(id);
        }

        trace!("scheduling {} event {id} at t={fire_time}", event.name());
        let plan_id = self.add_plan(fire_time, move |context| fire_scheduled_event(context, id));
        self.get_data_container_mut(SchedulerPlugin).events.insert(
            id,
            ScheduledEvent {
                event,
                plan_id,
                fire_time,
                clock,
            },
        );
        Ok(id)
    }

    fn mark_affected(&mut self, person: PersonId) -> Result<(), SimError> {
        let ids: Vec<EventId> = self
            .get_data_container(SchedulerPlugin)
            .and_then(|data| data.by_person.get(&person))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let now = self.get_current_time();

        for id in ids {
            let Some((event, clock)) = self
                .get_data_container(SchedulerPlugin)
                .and_then(|data| data.events.get(&id))
                .map(|entry| (Rc::clone(&entry.event), entry.clock))
            else {
                continue;
            };

            if event_is_useless(self, &*event) {
                trace!("discarding useless {} event {id}", event.name());
                if let Some(entry) = take_event(self, id) {
                    self.cancel_plan(entry.plan_id);
                }
                continue;
            }

            let Clock::Hazard {
                hazard: old_hazard,
                budget,
                since,
            } = clock
            else {
                continue;
            };
            let consumed = old_hazard.cumulative_hazard(since, now - since);
            let remaining = (budget - consumed).max(0.0);
            let Timing::Hazard(hazard) = event.timing(self, now)? else {
                return Err(SimError::InvariantViolation(format!(
                    "{} switched from a hazard to a fixed timing",
                    event.name()
                )));
            };
            let fire_time =
                check_fire_time(&*event, now, now + hazard.capped_time_interval(now, remaining))?;

            let old_plan = self
                .get_data_container(SchedulerPlugin)
                .and_then(|data| data.events.get(&id))
                .map(|entry| entry.plan_id);
            if let Some(old_plan) = old_plan {
                self.cancel_plan(old_plan);
            }
            let plan_id = self.add_plan(fire_time, move |context| fire_scheduled_event(context, id));
            if let Some(entry) = self
                .get_data_container_mut(SchedulerPlugin)
                .events
                .get_mut(&id)
            {
                entry.plan_id = plan_id;
                entry.fire_time = fire_time;
                entry.clock = Clock::Hazard {
                    hazard,
                    budget: remaining,
                    since: now,
                };
            }
        }
        Ok(())
    }

    fn pending_event_time(&self, id: EventId) -> Option<f64> {
        self.get_data_container(SchedulerPlugin)?
            .events
            .get(&id)
            .map(|entry| entry.fire_time)
    }

    fn pending_event_name(&self, id: EventId) -> Option<String> {
        self.get_data_container(SchedulerPlugin)?
            .events
            .get(&id)
            .map(|entry| entry.event.name())
    }

    fn pending_events_for(&self, person: PersonId) -> Vec<EventId> {
        self.get_data_container(SchedulerPlugin)
            .and_then(|data| data.by_person.get(&person))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn pending_event_count(&self, name: &str) -> usize {
        self.get_data_container(SchedulerPlugin).map_or(0, |data| {
            data.events
                .values()
                .filter(|entry| entry.event.name() == name)
                .count()
        })
    }

    fn has_pending_event(&self, name: &str, persons: &[PersonId]) -> bool {
        let Some(first) = persons.first() else {
            return self.pending_event_count(name) > 0;
        };
        self.pending_events_for(*first).into_iter().any(|id| {
            self.get_data_container(SchedulerPlugin)
                .and_then(|data| data.events.get(&id))
                .is_some_and(|entry| entry.event.name() == name && entry.event.persons() == persons)
        })
    }
}
