use std::collections::BTreeSet;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{
    components::ability::{AbilityTag, AbilityType},
    systems::combat::authorities::{CrowdControlAuthority, RestrictionAuthority},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CrowdControlType {
    Stun,
    Silence,
    Root,
    Disarm,
    Incapacitate,
}

/// Crowd control currently applied to an actor. Applied by the authority and
/// replicated to the owning client.
#[derive(Clone, Component, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CrowdControl(BTreeSet<CrowdControlType>);

impl CrowdControl {
    pub fn apply(&mut self, typ: CrowdControlType) -> bool {
        self.0.insert(typ)
    }

    pub fn remove(&mut self, typ: CrowdControlType) -> bool {
        self.0.remove(&typ)
    }

    pub fn replace(&mut self, active: impl IntoIterator<Item = CrowdControlType>) {
        self.0 = active.into_iter().collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = CrowdControlType> + '_ {
        self.0.iter().copied()
    }

    /// Whether any active crowd control prevents `ability`
    pub fn restricts(&self, ability: AbilityType) -> bool {
        ability.def().restricted_by.iter().any(|typ| self.0.contains(typ))
    }
}

impl CrowdControlAuthority for CrowdControl {
    fn active_types(&self) -> BTreeSet<CrowdControlType> {
        self.0.clone()
    }
}

/// What placed a restriction; each source lifts only its own
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum RestrictionSource {
    /// Another ability's effect, such as a lockout after use
    Ability(AbilityType),
    /// A buff, zone or scripted effect known by id
    Effect(u32),
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Restriction {
    Ability(AbilityType),
    Tag(AbilityTag),
}

impl Restriction {
    pub fn covers(&self, ability: AbilityType) -> bool {
        match *self {
            Restriction::Ability(restricted) => restricted == ability,
            Restriction::Tag(tag) => ability.def().tags.contains(&tag),
        }
    }
}

/// Abilities and ability tags locked out for an actor, keyed by source. The same
/// restriction from two sources holds until both remove it. Applied by the
/// authority and replicated to the owning client.
#[derive(Clone, Component, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Restrictions(BTreeSet<(RestrictionSource, Restriction)>);

impl Restrictions {
    pub fn add(&mut self, source: RestrictionSource, restriction: Restriction) -> bool {
        self.0.insert((source, restriction))
    }

    pub fn remove(&mut self, source: RestrictionSource, restriction: Restriction) -> bool {
        self.0.remove(&(source, restriction))
    }

    /// Lift everything `source` placed; returns how many were lifted
    pub fn remove_source(&mut self, source: RestrictionSource) -> usize {
        let before = self.0.len();
        self.0.retain(|(placed_by, _)| *placed_by != source);
        before - self.0.len()
    }

    pub fn replace(&mut self, active: impl IntoIterator<Item = (RestrictionSource, Restriction)>) {
        self.0 = active.into_iter().collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = (RestrictionSource, Restriction)> + '_ {
        self.0.iter().copied()
    }
}

impl RestrictionAuthority for Restrictions {
    fn is_restricted(&self, ability: AbilityType) -> bool {
        self.0.iter().any(|(_, restriction)| restriction.covers(ability))
    }
}
