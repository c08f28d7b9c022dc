use std::{collections::BTreeSet, time::Duration};

use bevy::prelude::*;

use crate::common::{
    components::{
        ability::{AbilityDef, AbilityType, CasterState},
        charges::Charges,
        crowd_control::{CrowdControl, CrowdControlType, Restrictions},
        modifiers::{LengthKind, LengthModifiers},
        prediction::PredictionId,
        resources::{ResourceCost, ResourcePool},
    },
    resources::AbilityConfig,
};

/// Resource pools consumed by ability costs
pub trait ResourceCostAuthority {
    fn check_met(&self, costs: &[ResourceCost]) -> bool;
    fn commit(&mut self, costs: &[ResourceCost]);
    fn predict_commit(&mut self, prediction_id: PredictionId, costs: &[ResourceCost]);
    fn rollback(&mut self, prediction_id: PredictionId);
    fn update_from_server(&mut self, prediction_id: PredictionId, costs: &[ResourceCost]);
}

pub trait ChargeAuthority {
    fn check_met(&self, ability: AbilityType, charges: u32) -> bool;
    /// `cooldown` is the recharge time after modifiers
    fn commit(&mut self, ability: AbilityType, charges: u32, cooldown: Duration, now: Duration);
    fn predict_commit(&mut self, prediction_id: PredictionId, ability: AbilityType, charges: u32);
    fn rollback(&mut self, prediction_id: PredictionId);
    fn update_from_server(&mut self, prediction_id: PredictionId, ability: AbilityType, charges_spent: u32);
}

pub trait RestrictionAuthority {
    fn is_restricted(&self, ability: AbilityType) -> bool;
}

pub trait CrowdControlAuthority {
    fn active_types(&self) -> BTreeSet<CrowdControlType>;
}

/// Single source of truth for every timestamp in the ability protocol
pub trait ClockAuthority {
    fn now(&self) -> Duration;
}

/// A clock frozen at one instant, as the server reads `Time` once per system run
impl ClockAuthority for Duration {
    fn now(&self) -> Duration {
        *self
    }
}

/// Collaborators available to one actor for the duration of an operation.
/// Any of them may be absent; a missing cost or charge authority fails the
/// corresponding check rather than letting an ability through for free.
pub struct Authorities<'a> {
    pub costs: Option<&'a mut dyn ResourceCostAuthority>,
    pub charges: Option<&'a mut dyn ChargeAuthority>,
    pub restrictions: Option<&'a dyn RestrictionAuthority>,
    pub crowd_control: Option<&'a dyn CrowdControlAuthority>,
    pub modifiers: Option<&'a LengthModifiers>,
    pub caster: CasterState,
}

impl<'a> Authorities<'a> {
    pub fn none(caster: CasterState) -> Self {
        Self { costs: None, charges: None, restrictions: None, crowd_control: None, modifiers: None, caster }
    }

    /// Borrow an actor's collaborator components, whichever it has
    pub fn of(
        costs: Option<&'a mut ResourcePool>,
        charges: Option<&'a mut Charges>,
        restrictions: Option<&'a Restrictions>,
        crowd_control: Option<&'a CrowdControl>,
        caster: CasterState,
    ) -> Self {
        Self {
            costs: costs.map(|pool| pool as &mut dyn ResourceCostAuthority),
            charges: charges.map(|charges| charges as &mut dyn ChargeAuthority),
            restrictions: restrictions.map(|restrictions| restrictions as &dyn RestrictionAuthority),
            crowd_control: crowd_control.map(|cc| cc as &dyn CrowdControlAuthority),
            modifiers: None,
            caster,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Option<&'a LengthModifiers>) -> Self {
        self.modifiers = modifiers;
        self
    }

    fn modified(&self, kind: LengthKind, ability: AbilityType, base: Duration) -> Duration {
        self.modifiers.map_or(base, |modifiers| modifiers.apply(kind, ability, base))
    }

    pub fn gcd_length(&self, ability: AbilityType, config: &AbilityConfig) -> Duration {
        config.gcd_length(self.modified(LengthKind::GlobalCooldown, ability, ability.def().gcd))
    }

    pub fn cast_length(&self, ability: AbilityType, config: &AbilityConfig) -> Duration {
        config.cast_length(self.modified(LengthKind::CastLength, ability, ability.def().cast))
    }

    pub fn cooldown(&self, ability: AbilityType) -> Duration {
        self.modified(LengthKind::Cooldown, ability, ability.def().cooldown)
    }

    pub fn costs_met(&self, def: &AbilityDef) -> bool {
        if def.costs.is_empty() { return true; }
        match self.costs.as_deref() {
            Some(costs) => costs.check_met(def.costs),
            None => {
                warn!("no resource authority to pay {:?}", def.costs);
                false
            }
        }
    }

    pub fn charges_met(&self, ability: AbilityType, def: &AbilityDef) -> bool {
        if !def.uses_charges() { return true; }
        match self.charges.as_deref() {
            Some(charges) => charges.check_met(ability, def.charge_cost),
            None => {
                warn!("no charge authority for {ability:?}");
                false
            }
        }
    }

    pub fn is_restricted(&self, ability: AbilityType) -> bool {
        self.restrictions.is_some_and(|restrictions| restrictions.is_restricted(ability))
    }

    pub fn is_crowd_controlled(&self, def: &AbilityDef) -> bool {
        self.crowd_control.is_some_and(|cc| {
            cc.active_types().iter().any(|typ| def.restricted_by.contains(typ))
        })
    }

    pub fn commit(&mut self, ability: AbilityType, now: Duration) {
        let def = ability.def();
        if let Some(costs) = self.costs.as_deref_mut() {
            costs.commit(def.costs);
        }
        let cooldown = self.cooldown(ability);
        if let Some(charges) = self.charges.as_deref_mut() {
            charges.commit(ability, def.charge_cost, cooldown, now);
        }
    }

    pub fn predict_commit(&mut self, prediction_id: PredictionId, ability: AbilityType) {
        let def = ability.def();
        if let Some(costs) = self.costs.as_deref_mut() {
            costs.predict_commit(prediction_id, def.costs);
        }
        if let Some(charges) = self.charges.as_deref_mut() {
            charges.predict_commit(prediction_id, ability, def.charge_cost);
        }
    }

    pub fn rollback(&mut self, prediction_id: PredictionId) {
        if let Some(costs) = self.costs.as_deref_mut() {
            costs.rollback(prediction_id);
        }
        if let Some(charges) = self.charges.as_deref_mut() {
            charges.rollback(prediction_id);
        }
    }

    pub fn update_from_server(
        &mut self,
        prediction_id: PredictionId,
        ability: AbilityType,
        charges_spent: u32,
        costs: &[ResourceCost],
    ) {
        if let Some(pool) = self.costs.as_deref_mut() {
            pool.update_from_server(prediction_id, costs);
        }
        if let Some(charges) = self.charges.as_deref_mut() {
            charges.update_from_server(prediction_id, ability, charges_spent);
        }
    }
}
