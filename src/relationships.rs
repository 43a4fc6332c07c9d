//! The contact network: sexual debut, then formation and dissolution of relationships under
//! hazards that depend on how many partners each person already has.
//!
//! Formation is tracked per pair. A pair gets one pending formation event from the moment the
//! second of the two debuts, and a new one each time their relationship dissolves.
use log::trace;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::create_report_trait;
use crate::define_rng;
use crate::disease::{earliest_birth, in_final_aids, schedule_partnership_transmissions};
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::{ContextParametersExt, FormationParams};
use crate::population::{
    ContextPopulationExt, ContextPopulationLoaderExt, PersonId, Sex, SexualRole,
};
use crate::prep::{refresh_prep_eligibility, schedule_prep_start};
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;
use crate::scheduler::{ContextSchedulerExt, EventId};
use crate::screening::schedule_routine_testing;

define_rng!(RelationshipRng);

/// One row of `relations.csv`, written when a relationship ends or is still running at the end
/// of the simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub person1: PersonId,
    pub person2: PersonId,
    pub formation_time: f64,
    pub dissolution_time: Option<f64>,
    pub condom_use: bool,
}

create_report_trait!(RelationshipRecord);

/// The man of a heterosexual pair comes first, otherwise the lower id
fn ordered(context: &Context, a: PersonId, b: PersonId) -> (PersonId, PersonId) {
    let (pa, pb) = (context.person(a), context.person(b));
    match (pa.sex, pb.sex) {
        (Sex::Female, Sex::Male) => (b, a),
        (Sex::Male, Sex::Female) => (a, b),
        _ => (a.min(b), a.max(b)),
    }
}

fn is_msm_pair(context: &Context, a: PersonId, b: PersonId) -> bool {
    context.person(a).is_man() && context.person(b).is_man()
}

#[allow(clippy::cast_precision_loss)]
fn relationship_count(context: &Context, person: PersonId) -> f64 {
    context.person(person).num_relationships() as f64
}

/// The probability that `person` insists on condoms with `partner`: their own condom use
/// probability, scaled when both share the same known HIV status and again when `person` is
/// uninfected and on PrEP
fn condom_use_threshold(context: &Context, person: PersonId, partner: PersonId) -> f64 {
    let factors = &context.params().condom_use;
    let p = context.person(person);
    let mut threshold = p.condom_use_probability;
    if p.hiv.diagnosed == context.person(partner).hiv.diagnosed {
        threshold *= factors.concordance_factor;
    }
    if !p.hiv.is_infected() && p.prep.is_on_prep() {
        threshold *= factors.prep_factor;
    }
    threshold
}

/// Formation of a relationship between two people who are not currently partners
pub struct FormationEvent {
    first: PersonId,
    second: PersonId,
    created: f64,
}

impl FormationEvent {
    #[must_use]
    pub fn new(context: &Context, a: PersonId, b: PersonId) -> Self {
        let (first, second) = ordered(context, a, b);
        Self {
            first,
            second,
            created: context.get_current_time(),
        }
    }

    fn params<'a>(&self, context: &'a Context) -> &'a FormationParams {
        if is_msm_pair(context, self.first, self.second) {
            &context.params().formation_msm
        } else {
            &context.params().formation
        }
    }
}

impl Invalidatable for FormationEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let (a, b) = (context.person(self.first), context.person(self.second));
        if !a.is_sexually_active() || !b.is_sexually_active() {
            return true;
        }
        if in_final_aids(context, self.first) || in_final_aids(context, self.second) {
            return true;
        }
        if a.has_relationship_with(self.second) {
            return true;
        }
        if is_msm_pair(context, self.first, self.second)
            && a.sexual_role == b.sexual_role
            && a.sexual_role != SexualRole::Variable
        {
            return true;
        }
        context.params().population.eyecap_fraction < 1.0
            && (a.location.time > self.created || b.location.time > self.created)
    }
}

impl Event for FormationEvent {
    fn name(&self) -> String {
        "formation".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.first, self.second]
    }

    /// `A = baseline + numrel_man·P_1 + numrel_woman·P_2 + gap_factor·|gap - preferred|`, `B = 0`
    ///
    /// The age gap is the man's age minus the woman's, or the absolute difference between two
    /// men.
    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let params = self.params(context);
        let (a, b) = (context.person(self.first), context.person(self.second));
        let gap = if is_msm_pair(context, self.first, self.second) {
            (a.date_of_birth - b.date_of_birth).abs()
        } else {
            b.date_of_birth - a.date_of_birth
        };
        let value = params.baseline
            + params.numrel_man * relationship_count(context, self.first)
            + params.numrel_woman * relationship_count(context, self.second)
            + params.gap_factor * (gap - params.preferred_age_gap).abs();
        Ok(Timing::Hazard(TimeLimitedHazardFunction::exponential(
            value,
            0.0,
            earliest_birth(context, self.first, self.second) + params.t_max,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        let pa = condom_use_threshold(context, self.first, self.second);
        let pb = condom_use_threshold(context, self.second, self.first);
        let condom_use = context.sample_bool(RelationshipRng, pa)
            || context.sample_bool(RelationshipRng, pb);
        context.add_relationship(self.first, self.second, t, condom_use)?;
        context.schedule_event(DissolutionEvent {
            first: self.first,
            second: self.second,
            formation_time: t,
        })?;
        refresh_prep_eligibility(context, self.first, t, false)?;
        refresh_prep_eligibility(context, self.second, t, false)?;
        schedule_partnership_transmissions(context, self.first, self.second)
    }
}

/// The end of the relationship formed at `formation_time`
pub struct DissolutionEvent {
    first: PersonId,
    second: PersonId,
    formation_time: f64,
}

impl Invalidatable for DissolutionEvent {
    fn is_useless(&self, context: &Context) -> bool {
        context
            .person(self.first)
            .relationship_with(self.second)
            .is_none_or(|r| r.formation_time != self.formation_time)
    }
}

impl Event for DissolutionEvent {
    fn name(&self) -> String {
        "dissolution".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.first, self.second]
    }

    /// `A = alpha_0 + alpha_1·P_1 + alpha_2·P_2 - beta·t_formation`, `B = beta`
    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let params = &context.params().dissolution;
        let value = params.alpha_0
            + params.alpha_1 * relationship_count(context, self.first)
            + params.alpha_2 * relationship_count(context, self.second)
            - params.beta * self.formation_time;
        Ok(Timing::Hazard(TimeLimitedHazardFunction::exponential(
            value,
            params.beta,
            earliest_birth(context, self.first, self.second) + params.t_max,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        end_relationship(context, self.first, self.second, t)?;
        schedule_formation(context, self.first, self.second)?;
        Ok(())
    }
}

/// The start of a person's sexual activity
pub struct DebutEvent {
    person: PersonId,
}

impl DebutEvent {
    #[must_use]
    pub fn new(person: PersonId) -> Self {
        Self { person }
    }
}

impl Invalidatable for DebutEvent {
    fn is_useless(&self, context: &Context) -> bool {
        context.person(self.person).debut_time.is_some()
    }
}

impl Event for DebutEvent {
    fn name(&self) -> String {
        "debut".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::At(
            context.person(self.person).date_of_birth + context.params().debut.debut_age,
        ))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        context.person_mut(self.person).debut_time = Some(t);
        schedule_formations_for(context, self.person)?;
        schedule_prep_start(context, self.person)?;
        schedule_routine_testing(context, self.person)
    }
}

/// Remove a relationship and write its `relations.csv` row
///
/// # Errors
///
/// Returns `SimError::InvariantViolation` if the two are not partners, or an error if the report
/// cannot be written.
pub fn end_relationship(
    context: &mut Context,
    a: PersonId,
    b: PersonId,
    t: f64,
) -> Result<(), SimError> {
    let relationship = context.remove_relationship(a, b).ok_or_else(|| {
        SimError::InvariantViolation(format!("{a:?} and {b:?} are not in a relationship"))
    })?;
    trace!("relationship between {a:?} and {b:?} ended at t={t}");
    if context.has_report::<RelationshipRecord>() {
        context.send_report(RelationshipRecord {
            person1: a,
            person2: b,
            formation_time: relationship.formation_time,
            dissolution_time: Some(t),
            condom_use: relationship.condom_use,
        })?;
    }
    refresh_prep_eligibility(context, a, t, false)?;
    refresh_prep_eligibility(context, b, t, false)?;
    Ok(())
}

/// Write a row for every relationship still running
///
/// # Errors
///
/// Returns an error if the report cannot be written.
pub fn report_open_relationships(context: &Context) -> Result<(), SimError> {
    if !context.has_report::<RelationshipRecord>() {
        return Ok(());
    }
    for id in context.person_ids() {
        for relationship in &context.person(id).relationships {
            if relationship.partner > id {
                context.send_report(RelationshipRecord {
                    person1: id,
                    person2: relationship.partner,
                    formation_time: relationship.formation_time,
                    dissolution_time: None,
                    condom_use: relationship.condom_use,
                })?;
            }
        }
    }
    Ok(())
}

/// Schedule a formation for the pair unless one is pending or it would be useless
///
/// # Errors
///
/// Returns an error if the formation hazard cannot be computed.
pub fn schedule_formation(
    context: &mut Context,
    a: PersonId,
    b: PersonId,
) -> Result<Option<EventId>, SimError> {
    let event = FormationEvent::new(context, a, b);
    if !context.is_alive(a)
        || !context.is_alive(b)
        || event.is_useless(context)
        || context.has_pending_event("formation", &event.persons())
    {
        return Ok(None);
    }
    context.schedule_event(event).map(Some)
}

/// Schedule formations between `person` and every sexually active candidate
///
/// # Errors
///
/// Returns an error if a formation hazard cannot be computed.
pub fn schedule_formations_for(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    for other in context.formation_candidates(person) {
        if context.person(other).is_sexually_active() {
            schedule_formation(context, person, other)?;
        }
    }
    Ok(())
}

/// Schedule the debut of everyone in the population
///
/// # Errors
///
/// Returns an error if a debut time is invalid.
pub fn schedule_debuts(context: &mut Context) -> Result<(), SimError> {
    for person in context.living_person_ids() {
        context.schedule_event(DebutEvent::new(person))?;
    }
    Ok(())
}

/// Move a person. With a limited eyecap this draws new persons of interest: formations created
/// before the move become useless and new ones are scheduled.
///
/// # Errors
///
/// Returns an error if a formation hazard cannot be computed.
pub fn relocate(
    context: &mut Context,
    person: PersonId,
    x: f64,
    y: f64,
    t: f64,
) -> Result<(), SimError> {
    context.set_location(person, x, y, t);
    if context.params().population.eyecap_fraction >= 1.0 {
        return Ok(());
    }
    context.choose_persons_of_interest(person);
    context.mark_affected(person)?;
    if context.person(person).is_sexually_active() {
        schedule_formations_for(context, person)?;
    }
    Ok(())
}
