use std::{collections::BTreeMap, time::Duration};

use bevy::prelude::*;

use crate::common::components::ability::AbilityType;

/// Which of an ability's lengths a modifier changes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LengthKind {
    GlobalCooldown,
    CastLength,
    /// Charge recharge time
    Cooldown,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Modifier {
    /// Seconds added to the base length; negative shortens
    Additive(f32),
    Multiplicative(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LengthModifier {
    pub kind: LengthKind,
    /// Applies to every ability when `None`
    pub ability: Option<AbilityType>,
    pub modifier: Modifier,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModifierHandle(u32);

/// Haste and slow effects on an actor's ability timing. Held by the authority
/// only, so confirmed lengths may differ from what the owner predicted.
#[derive(Clone, Component, Debug, Default)]
pub struct LengthModifiers {
    next: u32,
    modifiers: BTreeMap<ModifierHandle, LengthModifier>,
}

impl LengthModifiers {
    pub fn add(&mut self, modifier: LengthModifier) -> ModifierHandle {
        self.next += 1;
        let handle = ModifierHandle(self.next);
        self.modifiers.insert(handle, modifier);
        handle
    }

    pub fn remove(&mut self, handle: ModifierHandle) -> Option<LengthModifier> {
        self.modifiers.remove(&handle)
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Additive modifiers sum, multiplicative ones compound; the result never goes below zero.
    /// Rounded to whole milliseconds.
    pub fn apply(&self, kind: LengthKind, ability: AbilityType, base: Duration) -> Duration {
        let (mut add, mut mul) = (0f64, 1f64);
        let matching = self.modifiers.values()
            .filter(|modifier| modifier.kind == kind && modifier.ability.is_none_or(|only| only == ability));
        for modifier in matching {
            match modifier.modifier {
                Modifier::Additive(seconds) => add += seconds as f64,
                Modifier::Multiplicative(factor) => mul *= factor.max(0.) as f64,
            }
        }
        if add == 0. && mul == 1. {
            return base;
        }
        let millis = ((base.as_secs_f64() + add) * mul * 1000.).round().max(0.);
        Duration::from_millis(millis as u64)
    }
}
