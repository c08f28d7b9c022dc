use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use bevy::prelude::*;

use crate::common::{
    components::{
        ability::AbilityType,
        ability_queue::AbilityQueue,
        prediction::{PredictionId, PredictionIdAllocator},
        resources::ResourceCost,
    },
    message::{AbilityUseRequest, CancelRequest},
};

/// What the client assumed when it predicted an ability use. Kept until the
/// server's result for this id, or any later id, arrives.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPrediction {
    pub ability: AbilityType,
    pub prediction_id: PredictionId,
    pub client_timestamp: Duration,
    pub predicted_gcd: Option<Duration>,
    pub predicted_cast: Option<Duration>,
    pub predicted_costs: Vec<ResourceCost>,
}

/// Wire requests produced while predicting, drained into `Try` messages
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    Use(AbilityUseRequest),
    Cancel(CancelRequest),
}

/// Client-only prediction bookkeeping for the locally controlled actor
#[derive(Component, Debug, Default)]
pub struct PredictionState {
    pub ids: PredictionIdAllocator,
    pub pending: BTreeMap<PredictionId, PendingPrediction>,
    pub queue: AbilityQueue,
    /// Highest id the server has answered
    pub last_acked: PredictionId,
    /// Casts that ended here by cancel, interrupt or completion; their results never restart them
    pub stopped: BTreeSet<PredictionId>,
    outbox: Vec<Outgoing>,
}

impl PredictionState {
    pub fn send(&mut self, outgoing: Outgoing) {
        self.outbox.push(outgoing);
    }

    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Results acknowledge cumulatively: every pending id up to and including `id` is settled
    pub fn acknowledge(&mut self, id: PredictionId) -> usize {
        self.last_acked = self.last_acked.max(id);
        self.stopped.retain(|&stopped| stopped > id);
        let before = self.pending.len();
        self.pending.retain(|&pending, _| pending > id);
        before - self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: u32) -> PendingPrediction {
        PendingPrediction {
            ability: AbilityType::Strike,
            prediction_id: PredictionId(id),
            client_timestamp: Duration::ZERO,
            predicted_gcd: None,
            predicted_cast: None,
            predicted_costs: Vec::new(),
        }
    }

    #[test]
    fn test_acknowledge_is_cumulative() {
        let mut state = PredictionState::default();
        for id in 3..=6 {
            state.pending.insert(PredictionId(id), pending(id));
        }

        state.stopped.extend([PredictionId(4), PredictionId(6)]);

        assert_eq!(state.acknowledge(PredictionId(5)), 3);
        assert_eq!(state.pending.keys().copied().collect::<Vec<_>>(), vec![PredictionId(6)]);
        assert_eq!(state.stopped.iter().copied().collect::<Vec<_>>(), vec![PredictionId(6)]);
        assert_eq!(state.last_acked, PredictionId(5));

        assert_eq!(state.acknowledge(PredictionId(4)), 0);
        assert_eq!(state.last_acked, PredictionId(5));
    }

    #[test]
    fn test_outbox_drains_in_order() {
        let mut state = PredictionState::default();
        let cancel = CancelRequest {
            prediction_id: PredictionId(2),
            cancelled_cast_id: PredictionId(1),
            timestamp: Duration::ZERO,
        };
        state.send(Outgoing::Cancel(cancel.clone()));
        assert_eq!(state.drain_outgoing(), vec![Outgoing::Cancel(cancel)]);
        assert!(state.drain_outgoing().is_empty());
    }
}
