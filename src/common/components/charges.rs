use std::{collections::BTreeMap, time::Duration};

use bevy::prelude::*;

use crate::common::{
    components::{ability::AbilityType, prediction::PredictionId},
    systems::combat::authorities::ChargeAuthority,
};

#[derive(Clone, Copy, Debug, PartialEq)]
struct ChargeState {
    state: u32,
    max: u32,
    cooldown: Duration,
    recharge_at: Option<Duration>,
}

/// Charges for abilities that use them. The authority recharges one charge per
/// cooldown; the owning client layers predicted spends on top of the last known state.
#[derive(Clone, Component, Debug, Default)]
pub struct Charges {
    abilities: BTreeMap<AbilityType, ChargeState>,
    predictions: BTreeMap<PredictionId, (AbilityType, u32)>,
}

impl Charges {
    pub fn for_abilities(abilities: impl IntoIterator<Item = AbilityType>) -> Self {
        let mut charges = Self::default();
        for ability in abilities {
            charges.track(ability);
        }
        charges
    }

    pub fn track(&mut self, ability: AbilityType) {
        let def = ability.def();
        if def.max_charges == 0 { return; }
        self.abilities.entry(ability).or_insert(ChargeState {
            state: def.max_charges,
            max: def.max_charges,
            cooldown: def.cooldown,
            recharge_at: None,
        });
    }

    pub fn untrack(&mut self, ability: AbilityType) {
        self.abilities.remove(&ability);
        self.predictions.retain(|_, (predicted, _)| *predicted != ability);
    }

    pub fn state(&self, ability: AbilityType) -> u32 {
        self.abilities.get(&ability).map_or(0, |charges| charges.state)
    }

    pub fn step(&self, ability: AbilityType) -> u32 {
        let predicted: u32 = self.predictions.values()
            .filter(|(predicted, _)| *predicted == ability)
            .map(|(_, spent)| spent)
            .sum();
        self.state(ability).saturating_sub(predicted)
    }

    /// Authoritative snapshot
    pub fn set(&mut self, ability: AbilityType, state: u32) {
        if let Some(charges) = self.abilities.get_mut(&ability) {
            charges.state = state.min(charges.max);
        }
    }

    pub fn recharge_at(&self, ability: AbilityType) -> Option<Duration> {
        self.abilities.get(&ability).and_then(|charges| charges.recharge_at)
    }

    /// Restore charges whose cooldown elapsed; returns the abilities that changed with their new count
    pub fn recharge(&mut self, now: Duration) -> Vec<(AbilityType, u32)> {
        let mut changed = Vec::new();
        for (&ability, charges) in self.abilities.iter_mut() {
            let mut restored = false;
            while let Some(at) = charges.recharge_at {
                if at > now { break; }
                charges.state = (charges.state + 1).min(charges.max);
                charges.recharge_at = (charges.state < charges.max).then_some(at + charges.cooldown);
                restored = true;
            }
            if restored { changed.push((ability, charges.state)); }
        }
        changed
    }

    fn spend(&mut self, ability: AbilityType, spent: u32) -> Option<&mut ChargeState> {
        let charges = self.abilities.get_mut(&ability)?;
        charges.state = charges.state.saturating_sub(spent);
        Some(charges)
    }
}

impl ChargeAuthority for Charges {
    fn check_met(&self, ability: AbilityType, charges: u32) -> bool {
        charges == 0 || self.step(ability) >= charges
    }

    fn commit(&mut self, ability: AbilityType, charges: u32, cooldown: Duration, now: Duration) {
        if charges == 0 { return; }
        if let Some(state) = self.spend(ability, charges) {
            state.cooldown = cooldown;
            if state.recharge_at.is_none() && state.state < state.max && !state.cooldown.is_zero() {
                state.recharge_at = Some(now + state.cooldown);
            }
        }
    }

    fn predict_commit(&mut self, prediction_id: PredictionId, ability: AbilityType, charges: u32) {
        if charges == 0 { return; }
        self.predictions.insert(prediction_id, (ability, charges));
    }

    fn rollback(&mut self, prediction_id: PredictionId) {
        self.predictions.remove(&prediction_id);
    }

    fn update_from_server(&mut self, prediction_id: PredictionId, ability: AbilityType, charges_spent: u32) {
        self.predictions.remove(&prediction_id);
        if charges_spent > 0 {
            self.spend(ability, charges_spent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_charge_abilities_are_tracked() {
        let charges = Charges::for_abilities([AbilityType::Strike, AbilityType::Dash]);
        assert_eq!(charges.state(AbilityType::Dash), 2);
        assert_eq!(charges.state(AbilityType::Strike), 0);
        assert!(charges.check_met(AbilityType::Strike, 0));
    }

    #[test]
    fn test_predicted_spend_blocks_further_use() {
        let mut charges = Charges::for_abilities([AbilityType::Ward]);
        charges.predict_commit(PredictionId(1), AbilityType::Ward, 1);

        assert_eq!(charges.state(AbilityType::Ward), 1);
        assert!(!charges.check_met(AbilityType::Ward, 1));

        charges.rollback(PredictionId(1));
        assert!(charges.check_met(AbilityType::Ward, 1));
    }

    #[test]
    fn test_rollback_scoped_to_prediction() {
        let mut charges = Charges::for_abilities([AbilityType::Dash]);
        charges.predict_commit(PredictionId(4), AbilityType::Dash, 1);
        charges.predict_commit(PredictionId(5), AbilityType::Dash, 1);

        charges.rollback(PredictionId(5));

        assert_eq!(charges.step(AbilityType::Dash), 1);
    }

    #[test]
    fn test_update_from_server_replaces_prediction() {
        let mut charges = Charges::for_abilities([AbilityType::Dash]);
        charges.predict_commit(PredictionId(2), AbilityType::Dash, 1);
        charges.update_from_server(PredictionId(2), AbilityType::Dash, 1);

        assert_eq!(charges.state(AbilityType::Dash), 1);
        assert_eq!(charges.step(AbilityType::Dash), 1);
    }

    #[test]
    fn test_commit_starts_recharge_and_restores_one_per_cooldown() {
        let mut charges = Charges::for_abilities([AbilityType::Dash]);
        let cooldown = AbilityType::Dash.def().cooldown;

        charges.commit(AbilityType::Dash, 1, cooldown, Duration::ZERO);
        charges.commit(AbilityType::Dash, 1, cooldown, Duration::from_secs(1));
        assert_eq!(charges.state(AbilityType::Dash), 0);
        assert_eq!(charges.recharge_at(AbilityType::Dash), Some(cooldown));

        assert!(charges.recharge(cooldown - Duration::from_millis(1)).is_empty());
        assert_eq!(charges.recharge(cooldown), vec![(AbilityType::Dash, 1)]);
        assert_eq!(charges.recharge_at(AbilityType::Dash), Some(cooldown * 2));

        assert_eq!(charges.recharge(cooldown * 3), vec![(AbilityType::Dash, 2)]);
        assert_eq!(charges.recharge_at(AbilityType::Dash), None);
    }

    #[test]
    fn test_modified_cooldown_paces_recharge() {
        let mut charges = Charges::for_abilities([AbilityType::Ward]);
        charges.commit(AbilityType::Ward, 1, Duration::from_secs(6), Duration::from_secs(1));

        assert_eq!(charges.recharge_at(AbilityType::Ward), Some(Duration::from_secs(7)));
        assert_eq!(charges.recharge(Duration::from_secs(7)), vec![(AbilityType::Ward, 1)]);
    }
}
