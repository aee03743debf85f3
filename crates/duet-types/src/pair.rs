use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairKeyError {
    #[error("a user cannot pair with themself")]
    SelfPair,
}

/// Canonical, order-independent key for a pair of users.
///
/// Used as the friendship record key and to route a message's
/// (sender, receiver) into the same conversation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    lo: Uuid,
    hi: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Result<Self, PairKeyError> {
        if a == b {
            return Err(PairKeyError::SelfPair);
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> Uuid {
        self.lo
    }

    pub fn hi(&self) -> Uuid {
        self.hi
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.lo == user_id || self.hi == user_id
    }
}
