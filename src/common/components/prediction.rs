use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlates a client's speculative ability use with its authoritative resolution.
/// Scoped to a single connection. `PredictionId::AUTHORITY` marks events the server
/// originated without any client prediction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PredictionId(pub u32);

impl PredictionId {
    pub const AUTHORITY: Self = Self(0);

    pub fn is_predicted(self) -> bool {
        self != Self::AUTHORITY
    }
}

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-connection id source, owned by the predicting client's `PredictionState`.
/// Ids are never reused; on overflow the reserved `0` is skipped.
#[derive(Clone, Debug, Default)]
pub struct PredictionIdAllocator {
    last: u32,
}

impl PredictionIdAllocator {
    pub fn next(&mut self) -> PredictionId {
        let mut id = self.last.wrapping_add(1);
        if id == PredictionId::AUTHORITY.0 {
            id = id.wrapping_add(1);
        }
        self.last = id;
        PredictionId(id)
    }

    pub fn last(&self) -> PredictionId {
        PredictionId(self.last)
    }
}
