use std::{collections::BTreeSet, time::Duration};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use tinyvec::ArrayVec;

use crate::common::{
    components::{
        crowd_control::CrowdControlType,
        resources::{ResourceCost, ResourceKind},
    },
    message::{CancelEvent, InterruptEvent},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AbilityType {
    Strike,
    Fireball,
    Siphon,
    Bandage,
    Dash,
    Ward,
}

impl AbilityType {
    pub const ALL: [AbilityType; 6] = [
        AbilityType::Strike,
        AbilityType::Fireball,
        AbilityType::Siphon,
        AbilityType::Bandage,
        AbilityType::Dash,
        AbilityType::Ward,
    ];

    pub fn def(self) -> &'static AbilityDef {
        match self {
            AbilityType::Strike => &STRIKE,
            AbilityType::Fireball => &FIREBALL,
            AbilityType::Siphon => &SIPHON,
            AbilityType::Bandage => &BANDAGE,
            AbilityType::Dash => &DASH,
            AbilityType::Ward => &WARD,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ability| format!("{ability:?}").eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CastType {
    /// Resolves with a single tick 0 at use time
    Instant,
    /// Runs `ticks` evenly spaced ticks over the cast length
    Channel,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AbilityTag {
    Physical,
    Magic,
    Healing,
    Movement,
}

/// Ability-specific requirements on the caster, checked after costs and charges
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CastCondition {
    Alive,
    Stationary,
}

#[derive(Debug, PartialEq)]
pub struct AbilityDef {
    pub cast_type: CastType,
    pub on_gcd: bool,
    pub gcd: Duration,
    pub cast: Duration,
    pub ticks: u32,
    /// Channels that also tick once at cast start
    pub initial_tick: bool,
    pub interruptible: bool,
    pub costs: &'static [ResourceCost],
    pub charge_cost: u32,
    pub max_charges: u32,
    pub cooldown: Duration,
    pub tags: &'static [AbilityTag],
    pub restricted_by: &'static [CrowdControlType],
    pub conditions: &'static [CastCondition],
    /// Upper bound on the per-tick magnitude a client may claim
    pub power: f32,
}

impl AbilityDef {
    pub fn uses_charges(&self) -> bool {
        self.charge_cost > 0
    }

    /// Channels need at least one tick and a non-zero length; instants never schedule ticks
    pub fn has_valid_cast_type(&self) -> bool {
        match self.cast_type {
            CastType::Instant => self.ticks == 0,
            CastType::Channel => self.ticks > 0 && !self.cast.is_zero(),
        }
    }
}

const STRIKE: AbilityDef = AbilityDef {
    cast_type: CastType::Instant,
    on_gcd: true,
    gcd: Duration::from_millis(1000),
    cast: Duration::ZERO,
    ticks: 0,
    initial_tick: true,
    interruptible: false,
    costs: &[ResourceCost { kind: ResourceKind::Stamina, amount: 10. }],
    charge_cost: 0,
    max_charges: 0,
    cooldown: Duration::ZERO,
    tags: &[AbilityTag::Physical],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate, CrowdControlType::Disarm],
    conditions: &[CastCondition::Alive],
    power: 12.,
};

const FIREBALL: AbilityDef = AbilityDef {
    cast_type: CastType::Channel,
    on_gcd: true,
    gcd: Duration::from_millis(1500),
    cast: Duration::from_millis(2000),
    ticks: 1,
    initial_tick: false,
    interruptible: true,
    costs: &[ResourceCost { kind: ResourceKind::Mana, amount: 20. }],
    charge_cost: 0,
    max_charges: 0,
    cooldown: Duration::ZERO,
    tags: &[AbilityTag::Magic],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate, CrowdControlType::Silence],
    conditions: &[CastCondition::Alive, CastCondition::Stationary],
    power: 30.,
};

const SIPHON: AbilityDef = AbilityDef {
    cast_type: CastType::Channel,
    on_gcd: true,
    gcd: Duration::from_millis(1000),
    cast: Duration::from_millis(2000),
    ticks: 4,
    initial_tick: false,
    interruptible: true,
    costs: &[ResourceCost { kind: ResourceKind::Mana, amount: 15. }],
    charge_cost: 0,
    max_charges: 0,
    cooldown: Duration::ZERO,
    tags: &[AbilityTag::Magic],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate, CrowdControlType::Silence],
    conditions: &[CastCondition::Alive],
    power: 5.,
};

const BANDAGE: AbilityDef = AbilityDef {
    cast_type: CastType::Channel,
    on_gcd: true,
    gcd: Duration::from_millis(1000),
    cast: Duration::from_millis(3000),
    ticks: 3,
    initial_tick: true,
    interruptible: false,
    costs: &[],
    charge_cost: 0,
    max_charges: 0,
    cooldown: Duration::ZERO,
    tags: &[AbilityTag::Healing],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate],
    conditions: &[CastCondition::Alive, CastCondition::Stationary],
    power: 8.,
};

const DASH: AbilityDef = AbilityDef {
    cast_type: CastType::Instant,
    on_gcd: false,
    gcd: Duration::ZERO,
    cast: Duration::ZERO,
    ticks: 0,
    initial_tick: true,
    interruptible: false,
    costs: &[],
    charge_cost: 1,
    max_charges: 2,
    cooldown: Duration::from_secs(8),
    tags: &[AbilityTag::Movement],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate, CrowdControlType::Root],
    conditions: &[CastCondition::Alive],
    power: 4.,
};

const WARD: AbilityDef = AbilityDef {
    cast_type: CastType::Instant,
    on_gcd: true,
    gcd: Duration::from_millis(1000),
    cast: Duration::ZERO,
    ticks: 0,
    initial_tick: true,
    interruptible: false,
    costs: &[ResourceCost { kind: ResourceKind::Mana, amount: 10. }],
    charge_cost: 1,
    max_charges: 1,
    cooldown: Duration::from_secs(12),
    tags: &[AbilityTag::Magic],
    restricted_by: &[CrowdControlType::Stun, CrowdControlType::Incapacitate, CrowdControlType::Silence],
    conditions: &[CastCondition::Alive],
    power: 20.,
};

/// Caster facts consulted by custom conditions
#[derive(Clone, Component, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct CasterState {
    pub alive: bool,
    pub moving: bool,
}

impl Default for CasterState {
    fn default() -> Self {
        Self { alive: true, moving: false }
    }
}

impl CasterState {
    pub fn meets(&self, conditions: &[CastCondition]) -> bool {
        conditions.iter().all(|condition| match condition {
            CastCondition::Alive => self.alive,
            CastCondition::Stationary => !self.moving,
        })
    }
}

/// Opaque per-tick payload (aim, magnitude, ...) carried from the predicting client
/// to the authority and on to observers
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TickParams(pub ArrayVec<[f32; 4]>);

impl TickParams {
    pub fn with(values: &[f32]) -> Self {
        let mut params = ArrayVec::new();
        for &value in values.iter().take(4) {
            params.push(value);
        }
        Self(params)
    }

    pub fn magnitude(&self) -> Option<f32> {
        self.0.first().copied()
    }
}

/// Per-ability behaviour invoked by the ability handler as casts progress.
/// Predicted ticks run on the owning client, server ticks on the authority and
/// simulated ticks on every other observer.
pub trait AbilityHooks {
    fn predicted_tick(&self, tick: u32, caster: &CasterState) -> TickParams;
    fn server_tick(&self, tick: u32, params: &TickParams) -> TickParams;
    fn simulated_tick(&self, tick: u32, params: &TickParams);
    fn cast_complete(&self);
    fn cast_interrupted(&self, event: &InterruptEvent);
    fn cast_cancelled(&self, event: &CancelEvent);
}

impl AbilityHooks for AbilityType {
    fn predicted_tick(&self, tick: u32, caster: &CasterState) -> TickParams {
        let def = self.def();
        // moving casters land weaker strikes; the authority clamps anything else
        let magnitude = if caster.moving { def.power * 0.5 } else { def.power };
        debug!("predicted {self:?} tick {tick}: {magnitude}");
        TickParams::with(&[magnitude])
    }

    fn server_tick(&self, tick: u32, params: &TickParams) -> TickParams {
        let power = self.def().power;
        let magnitude = match params.magnitude() {
            Some(claimed) if claimed.is_finite() => claimed.clamp(0., power),
            Some(claimed) => {
                warn!("{self:?} tick {tick} rejected non-finite magnitude {claimed}");
                0.
            }
            None => power,
        };
        debug!("server {self:?} tick {tick}: {magnitude}");
        TickParams::with(&[magnitude])
    }

    fn simulated_tick(&self, tick: u32, params: &TickParams) {
        trace!("simulated {self:?} tick {tick}: {:?}", params.magnitude());
    }

    fn cast_complete(&self) {
        debug!("{self:?} cast complete");
    }

    fn cast_interrupted(&self, event: &InterruptEvent) {
        debug!("{self:?} interrupted by {:?} after {} ticks", event.source, event.elapsed_ticks);
    }

    fn cast_cancelled(&self, event: &CancelEvent) {
        debug!("{self:?} cancelled after {} ticks", event.elapsed_ticks);
    }
}

/// Abilities an actor currently knows
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Abilities(BTreeSet<AbilityType>);

impl Abilities {
    pub fn insert(&mut self, ability: AbilityType) -> bool {
        self.0.insert(ability)
    }

    pub fn remove(&mut self, ability: AbilityType) -> bool {
        self.0.remove(&ability)
    }

    pub fn contains(&self, ability: AbilityType) -> bool {
        self.0.contains(&ability)
    }

    pub fn iter(&self) -> impl Iterator<Item = AbilityType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<AbilityType> for Abilities {
    fn from_iter<I: IntoIterator<Item = AbilityType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
