//! Wiring a tax-benefit system, a configuration and populations together.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{CalcResult, ExecutionError, ValidationError};
use crate::population::{GroupPopulation, Population};
use crate::storage::{MemoryPressure, SystemMemoryPressure};
use crate::system::TaxBenefitSystem;

use super::{Simulation, SimulationConfig};

#[derive(Debug)]
struct GroupMembership {
    ids: Vec<String>,
    members_entity_id: Vec<usize>,
    members_role: Vec<String>,
}

/// Builder for [`Simulation`].
///
/// Group entities without an explicit membership get one group per person,
/// each person holding the entity's first role.
#[derive(Debug)]
pub struct SimulationBuilder {
    system: Arc<TaxBenefitSystem>,
    config: Option<SimulationConfig>,
    person_ids: Option<Vec<String>>,
    groups: BTreeMap<String, GroupMembership>,
    pressure: Option<Arc<dyn MemoryPressure>>,
}

impl SimulationBuilder {
    /// Starts a simulation of `system` with the default configuration.
    #[must_use]
    pub fn new(system: Arc<TaxBenefitSystem>) -> Self {
        Self {
            system,
            config: None,
            person_ids: None,
            groups: BTreeMap::new(),
            pressure: None,
        }
    }

    /// Replaces the configuration. It is validated by `build`.
    #[must_use]
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// `count` persons identified by their index.
    #[must_use]
    pub fn persons(mut self, count: usize) -> Self {
        self.person_ids = Some((0..count).map(|i| i.to_string()).collect());
        self
    }

    /// Sets the persons, in array order.
    #[must_use]
    pub fn person_ids(mut self, ids: Vec<String>) -> Self {
        self.person_ids = Some(ids);
        self
    }

    /// Declares the groups of entity `key` and the membership of every
    /// person, in person order.
    #[must_use]
    pub fn group(
        mut self,
        key: impl Into<String>,
        ids: Vec<String>,
        members_entity_id: Vec<usize>,
        members_role: Vec<String>,
    ) -> Self {
        self.groups.insert(
            key.into(),
            GroupMembership {
                ids,
                members_entity_id,
                members_role,
            },
        );
        self
    }

    /// Overrides the memory pressure policy of the disk tier.
    #[must_use]
    pub fn pressure(mut self, pressure: Arc<dyn MemoryPressure>) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Build the simulation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an invalid configuration, missing
    /// persons, membership tables that do not cover every person or unknown
    /// roles, `ExecutionError::EntityNotFound` for groups of unknown
    /// entities, and `StorageError` when the disk tier cannot be prepared.
    pub fn build(mut self) -> CalcResult<Simulation> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;
        let person_ids = self
            .person_ids
            .take()
            .ok_or_else(|| ValidationError::InvalidSimulation {
                reason: "persons are required".to_string(),
            })?;
        let nb_persons = person_ids.len();

        if let Some(key) = self
            .groups
            .keys()
            .find(|key| self.system.entity(key).is_none())
        {
            return Err(ExecutionError::EntityNotFound { key: key.clone() }.into());
        }

        let mut groups = BTreeMap::new();
        for entity in self.system.group_entities() {
            let membership = match self.groups.remove(&entity.key) {
                Some(membership) => membership,
                None => GroupMembership {
                    ids: person_ids.clone(),
                    members_entity_id: (0..nb_persons).collect(),
                    members_role: entity
                        .roles
                        .first()
                        .map(|role| vec![role.key.clone(); nb_persons])
                        .unwrap_or_default(),
                },
            };
            if membership.members_entity_id.len() != nb_persons {
                return Err(ValidationError::InvalidSimulation {
                    reason: format!(
                        "'{}' lists {} members but there are {nb_persons} persons",
                        entity.plural,
                        membership.members_entity_id.len()
                    ),
                }
                .into());
            }
            let population = GroupPopulation::new(
                Arc::clone(entity),
                membership.ids,
                membership.members_entity_id,
                membership.members_role,
            )?;
            groups.insert(entity.key.clone(), population);
        }
        if let Some(key) = self.groups.keys().next() {
            return Err(ValidationError::NotAGroup { entity: key.clone() }.into());
        }

        let persons = Population::new(Arc::clone(self.system.person_entity()), person_ids);
        let pressure = self
            .pressure
            .take()
            .unwrap_or_else(|| Arc::new(SystemMemoryPressure));
        Simulation::from_parts(self.system, config, persons, groups, pressure)
    }
}
