//! Introduction of infections from outside the contact network: a one-off seeding at a
//! configured time, then repeated imports.
use std::marker::PhantomData;

use log::{info, warn};
use rand_distr::Binomial;

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::parameters::{ContextParametersExt, SeedGender, SeedType};
use crate::population::{ContextPopulationExt, PersonId, Sex};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

use super::{infect, Disease, InfectionType};

define_rng!(SeedingRng);

/// Remove `count` people from `pool`, each picked at index `floor(len·U)`
pub(crate) fn pick_from_pool(
    context: &Context,
    pool: &mut Vec<PersonId>,
    count: usize,
) -> Vec<PersonId> {
    let mut picked = Vec::with_capacity(count.min(pool.len()));
    while picked.len() < count && !pool.is_empty() {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let index = ((pool.len() as f64 * context.sample_uniform(SeedingRng)) as usize)
            .min(pool.len() - 1);
        picked.push(pool.swap_remove(index));
    }
    picked
}

fn susceptible_pool<D: Disease>(context: &Context) -> Vec<PersonId> {
    context
        .living_person_ids()
        .into_iter()
        .filter(|id| D::record(context.person(*id)).is_susceptible())
        .collect()
}

/// The one-off introduction of `D` into the population
pub struct SeedEvent<D: Disease> {
    disease: PhantomData<D>,
}

impl<D: Disease> SeedEvent<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            disease: PhantomData,
        }
    }
}

impl<D: Disease> Default for SeedEvent<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Disease> Invalidatable for SeedEvent<D> {
    fn is_useless(&self, _context: &Context) -> bool {
        false
    }
}

impl<D: Disease> Event for SeedEvent<D> {
    fn name(&self) -> String {
        format!("{} seeding", D::NAME)
    }

    fn persons(&self) -> Vec<PersonId> {
        Vec::new()
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::At(D::outbreak(context.params()).seed.time))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        let seed = D::outbreak(context.params()).seed.clone();
        let mut pool: Vec<PersonId> = susceptible_pool::<D>(context)
            .into_iter()
            .filter(|id| {
                let person = context.person(*id);
                let age = person.age(t);
                let gender_matches = match seed.gender {
                    SeedGender::Any => true,
                    SeedGender::Male => person.sex == Sex::Male,
                    SeedGender::Female => person.sex == Sex::Female,
                };
                gender_matches && age >= seed.age_min && age <= seed.age_max
            })
            .collect();

        let wanted = match seed.seed_type {
            SeedType::Amount => seed.amount,
            SeedType::Fraction => {
                let binomial = Binomial::new(pool.len() as u64, seed.fraction.clamp(0.0, 1.0))
                    .map_err(|e| SimError::SeedingError(e.to_string()))?;
                usize::try_from(context.sample_distr(SeedingRng, binomial))
                    .map_err(|e| SimError::SeedingError(e.to_string()))?
            }
        };
        if wanted > pool.len() {
            if seed.seed_type == SeedType::Amount && seed.stop_short {
                return Err(SimError::SeedingError(format!(
                    "Could only seed {} of the requested {wanted} {} infections",
                    pool.len(),
                    D::NAME
                )));
            }
            warn!(
                "only {} people available for {} seeding, {wanted} requested",
                pool.len(),
                D::NAME
            );
        }

        let seeded = pick_from_pool(context, &mut pool, wanted);
        for person in &seeded {
            infect::<D>(context, *person, None, InfectionType::Seed, t)?;
        }
        info!("seeded {} {} infections at t={t}", seeded.len(), D::NAME);
        D::after_seeding(context, &seeded, t)?;

        if D::outbreak(context.params()).import.interval > 0.0 {
            context.schedule_event(ImportEvent::<D>::new())?;
        }
        Ok(())
    }
}

/// A recurring import of `amount` infections among random susceptible people
pub struct ImportEvent<D: Disease> {
    disease: PhantomData<D>,
}

impl<D: Disease> ImportEvent<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            disease: PhantomData,
        }
    }
}

impl<D: Disease> Default for ImportEvent<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Disease> Invalidatable for ImportEvent<D> {
    fn is_useless(&self, _context: &Context) -> bool {
        false
    }
}

impl<D: Disease> Event for ImportEvent<D> {
    fn name(&self) -> String {
        format!("{} import", D::NAME)
    }

    fn persons(&self) -> Vec<PersonId> {
        Vec::new()
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::Delay(D::outbreak(context.params()).import.interval))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        let amount = D::outbreak(context.params()).import.amount;
        let mut pool = susceptible_pool::<D>(context);
        for person in pick_from_pool(context, &mut pool, amount) {
            infect::<D>(context, person, None, InfectionType::Seed, t)?;
        }
        context.schedule_event(ImportEvent::<D>::new())?;
        Ok(())
    }
}

/// Schedule the seeding of `D` if its seed time is not negative
///
/// # Errors
///
/// Returns an error if the seeding event cannot be scheduled.
pub fn schedule_outbreak<D: Disease>(context: &mut Context) -> Result<(), SimError> {
    if D::outbreak(context.params()).seed.time >= 0.0 {
        context.schedule_event(SeedEvent::<D>::new())?;
    }
    Ok(())
}
