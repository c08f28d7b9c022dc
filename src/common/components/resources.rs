use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{
    components::prediction::PredictionId,
    systems::combat::authorities::ResourceCostAuthority,
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ResourceKind {
    Stamina,
    Mana,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResourceCost {
    pub kind: ResourceKind,
    pub amount: f32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Resource {
    pub state: f32,
    pub max: f32,
}

/// Stamina and mana pools following the state/step prediction pattern
/// - state: authoritative value as last known to this process
/// - step: state minus spends still predicted under an unresolved prediction id
#[derive(Clone, Component, Debug, Default)]
pub struct ResourcePool {
    pools: BTreeMap<ResourceKind, Resource>,
    predictions: BTreeMap<PredictionId, Vec<ResourceCost>>,
}

impl ResourcePool {
    pub fn new(stamina: f32, mana: f32) -> Self {
        let mut pool = Self::default();
        pool.set(ResourceKind::Stamina, stamina, stamina);
        pool.set(ResourceKind::Mana, mana, mana);
        pool
    }

    pub fn state(&self, kind: ResourceKind) -> f32 {
        self.pools.get(&kind).map_or(0., |resource| resource.state)
    }

    pub fn max(&self, kind: ResourceKind) -> f32 {
        self.pools.get(&kind).map_or(0., |resource| resource.max)
    }

    pub fn step(&self, kind: ResourceKind) -> f32 {
        let predicted: f32 = self.predictions.values()
            .flatten()
            .filter(|cost| cost.kind == kind)
            .map(|cost| cost.amount)
            .sum();
        self.state(kind) - predicted
    }

    /// Authoritative snapshot
    pub fn set(&mut self, kind: ResourceKind, state: f32, max: f32) {
        self.pools.insert(kind, Resource { state: state.clamp(0., max), max });
    }

    pub fn pools(&self) -> impl Iterator<Item = (ResourceKind, Resource)> + '_ {
        self.pools.iter().map(|(&kind, &resource)| (kind, resource))
    }

    pub fn is_predicting(&self, prediction_id: PredictionId) -> bool {
        self.predictions.contains_key(&prediction_id)
    }

    fn spend(&mut self, costs: &[ResourceCost]) {
        for cost in costs {
            if let Some(resource) = self.pools.get_mut(&cost.kind) {
                resource.state = (resource.state - cost.amount).max(0.);
            }
        }
    }
}

impl ResourceCostAuthority for ResourcePool {
    fn check_met(&self, costs: &[ResourceCost]) -> bool {
        let mut totals = BTreeMap::<ResourceKind, f32>::new();
        for cost in costs {
            *totals.entry(cost.kind).or_default() += cost.amount;
        }
        totals.into_iter().all(|(kind, amount)| self.step(kind) >= amount)
    }

    fn commit(&mut self, costs: &[ResourceCost]) {
        self.spend(costs);
    }

    fn predict_commit(&mut self, prediction_id: PredictionId, costs: &[ResourceCost]) {
        if costs.is_empty() { return; }
        self.predictions.entry(prediction_id).or_default().extend_from_slice(costs);
    }

    fn rollback(&mut self, prediction_id: PredictionId) {
        self.predictions.remove(&prediction_id);
    }

    fn update_from_server(&mut self, prediction_id: PredictionId, costs: &[ResourceCost]) {
        self.predictions.remove(&prediction_id);
        self.spend(costs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mana(amount: f32) -> ResourceCost {
        ResourceCost { kind: ResourceKind::Mana, amount }
    }

    #[test]
    fn test_predicted_spend_lowers_step_not_state() {
        let mut pool = ResourcePool::new(100., 50.);
        pool.predict_commit(PredictionId(1), &[mana(20.)]);

        assert_eq!(pool.state(ResourceKind::Mana), 50.);
        assert_eq!(pool.step(ResourceKind::Mana), 30.);
        assert!(pool.check_met(&[mana(30.)]));
        assert!(!pool.check_met(&[mana(31.)]));
    }

    #[test]
    fn test_check_met_sums_same_kind() {
        let pool = ResourcePool::new(100., 50.);
        assert!(!pool.check_met(&[mana(30.), mana(30.)]));
    }

    #[test]
    fn test_rollback_only_touches_its_own_prediction() {
        let mut pool = ResourcePool::new(100., 50.);
        pool.predict_commit(PredictionId(1), &[mana(10.)]);
        pool.predict_commit(PredictionId(2), &[mana(15.)]);

        pool.rollback(PredictionId(2));

        assert_eq!(pool.step(ResourceKind::Mana), 40.);
        assert!(pool.is_predicting(PredictionId(1)));
    }

    #[test]
    fn test_update_from_server_applies_authoritative_delta() {
        let mut pool = ResourcePool::new(100., 50.);
        pool.predict_commit(PredictionId(3), &[mana(20.), ResourceCost { kind: ResourceKind::Stamina, amount: 5. }]);

        // server only charged mana; the predicted stamina spend goes away
        pool.update_from_server(PredictionId(3), &[mana(20.)]);

        assert_eq!(pool.state(ResourceKind::Mana), 30.);
        assert_eq!(pool.step(ResourceKind::Mana), 30.);
        assert_eq!(pool.step(ResourceKind::Stamina), 100.);
    }

    #[test]
    fn test_commit_never_goes_negative() {
        let mut pool = ResourcePool::new(100., 5.);
        pool.commit(&[mana(20.)]);
        assert_eq!(pool.state(ResourceKind::Mana), 0.);
    }
}
