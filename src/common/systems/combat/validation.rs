use std::time::Duration;

use crate::common::{
    components::{
        ability::{AbilityDef, AbilityType},
        handler::AbilityHandler,
    },
    error::CastFailReason,
    systems::combat::authorities::Authorities,
};

/// Ordered ability-use checks shared by the predicting client and the authority.
/// `at` is when the use would start: local now on the client, the compensated
/// request time on the server. Role checks are the caller's concern.
pub fn validate_use(
    handler: &AbilityHandler,
    authorities: &Authorities,
    ability: AbilityType,
    at: Duration,
) -> Result<&'static AbilityDef, CastFailReason> {
    if !handler.abilities().contains(ability) {
        return Err(CastFailReason::InvalidAbility);
    }
    let def = ability.def();
    if def.on_gcd && handler.gcd().blocks_at(at) {
        return Err(CastFailReason::OnGlobalCooldown);
    }
    if handler.casting().blocks_at(at) {
        return Err(CastFailReason::AlreadyCasting);
    }
    if !authorities.costs_met(def) {
        return Err(CastFailReason::CostsNotMet);
    }
    if !authorities.charges_met(ability, def) {
        return Err(CastFailReason::ChargesNotMet);
    }
    if !authorities.caster.meets(def.conditions) {
        return Err(CastFailReason::ConditionsNotMet);
    }
    if authorities.is_restricted(ability) {
        return Err(CastFailReason::Restricted);
    }
    if authorities.is_crowd_controlled(def) {
        return Err(CastFailReason::CrowdControlled);
    }
    if !def.has_valid_cast_type() {
        return Err(CastFailReason::InvalidCastType);
    }
    Ok(def)
}
