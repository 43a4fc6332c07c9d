//! The `Context` is the central object of a simulation run. It owns the clock, the plan queue and
//! every module's data container ("data plugin"). Modules extend it through `Context*Ext` traits.
use std::any::{Any, TypeId};
use std::collections::VecDeque;

use log::{debug, trace};

use crate::error::SimError;
use crate::hashing::{HashMap, HashMapExt};
use crate::plan::{PlanId, Queue};

/// A module-specific piece of state stored on the `Context`, keyed by the plugin type
pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a unit struct naming a data container of the given type, with its initial value
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        #[derive(Copy, Clone)]
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

type Callback = dyn FnOnce(&mut Context);

/// A simulation: the current time, future plans, queued callbacks and module data
pub struct Context {
    plan_queue: Queue<Box<Callback>>,
    callback_queue: VecDeque<Box<Callback>>,
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    end_time: Option<f64>,
    shutdown_requested: bool,
    failure: Option<SimError>,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            callback_queue: VecDeque::new(),
            data_plugins: HashMap::new(),
            current_time: 0.0,
            end_time: None,
            shutdown_requested: false,
            failure: None,
        }
    }

    /// Add a plan to execute `callback` at `time`
    ///
    /// # Panics
    ///
    /// Panics if the time is NaN, infinite or in the past.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        assert!(
            !time.is_nan() && !time.is_infinite() && time >= self.current_time,
            "Invalid time value"
        );
        self.plan_queue.add_plan(time, Box::new(callback))
    }

    pub fn cancel_plan(&mut self, id: PlanId) {
        self.plan_queue.cancel_plan(id);
    }

    #[must_use]
    pub fn is_plan_pending(&self, id: PlanId) -> bool {
        self.plan_queue.is_pending(id)
    }

    /// Run `callback` before the next plan, at the current time
    pub fn queue_callback(&mut self, callback: impl FnOnce(&mut Context) + 'static) {
        self.callback_queue.push_back(Box::new(callback));
    }

    fn add_plugin<T: DataPlugin>(&mut self) {
        self.data_plugins
            .insert(TypeId::of::<T>(), Box::new(T::create_data_container()));
    }

    /// Returns the data container for the plugin, creating it on first use
    ///
    /// # Panics
    ///
    /// Panics if the stored container has the wrong type, which cannot happen
    /// through this API.
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        let type_id = TypeId::of::<T>();
        if !self.data_plugins.contains_key(&type_id) {
            self.add_plugin::<T>();
        }
        self.data_plugins
            .get_mut(&type_id)
            .and_then(|container| container.downcast_mut::<T::DataContainer>())
            .expect("Data container has an unexpected type")
    }

    /// Returns the data container for the plugin if it has been created
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Plans scheduled strictly after `end_time` are never executed
    pub fn set_end_time(&mut self, end_time: f64) {
        self.end_time = Some(end_time);
    }

    #[must_use]
    pub fn get_end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Stop the run once the current plan returns
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at t={}", self.current_time);
        self.shutdown_requested = true;
    }

    /// Stop the run and make `execute` return `error`. Only the first error is kept.
    pub fn abort(&mut self, error: SimError) {
        debug!("aborting at t={}: {error}", self.current_time);
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self.shutdown();
    }

    /// Number of plans still waiting in the queue
    #[must_use]
    pub fn remaining_plan_count(&self) -> usize {
        self.plan_queue.len()
    }

    /// Execute the simulation until the plan queue is empty, the end time is reached, or a
    /// shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns the error passed to `abort`, if any.
    pub fn execute(&mut self) -> Result<(), SimError> {
        loop {
            if self.shutdown_requested {
                break;
            }

            // If there is a callback, run it.
            if let Some(callback) = self.callback_queue.pop_front() {
                callback(self);
                continue;
            }

            // There aren't any callbacks, so look at the first plan.
            match self.plan_queue.next_time() {
                None => break,
                Some(time) => {
                    if let Some(end_time) = self.end_time {
                        if time > end_time {
                            self.current_time = end_time;
                            break;
                        }
                    }
                }
            }
            if let Some(plan) = self.plan_queue.get_next_plan() {
                self.current_time = plan.time;
                (plan.data)(self);
            }
        }

        self.shutdown_requested = false;
        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
