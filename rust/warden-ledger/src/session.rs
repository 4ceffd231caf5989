use crate::Commitment;
use serde::{Deserialize, Serialize};

/// Snapshot of the session a contract holds for one owner.
///
/// Contracts return a zeroed record for owners that never registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Commitment to the authorized tool list.
    pub commitment: Commitment,
    /// Absolute expiry in unix seconds.
    pub expires_at: u64,
    /// Cleared by revocation.
    pub active: bool,
}

impl SessionRecord {
    /// Returns `true` for the zeroed record of an owner with no session.
    pub fn is_empty(&self) -> bool {
        self.commitment.is_zero() && self.expires_at == 0
    }

    /// Returns `true` if the session is active and unexpired at `now`
    /// (unix seconds).
    pub fn is_live_at(&self, now: u64) -> bool {
        self.active && now < self.expires_at
    }

    /// Returns `true` if this session is live at `now` and attests to exactly
    /// `commitment`. This is the contract's `verifySession` predicate.
    pub fn attests(&self, commitment: &Commitment, now: u64) -> bool {
        self.is_live_at(now) && self.commitment == *commitment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit;

    #[test]
    fn it_treats_the_zeroed_record_as_empty() {
        assert!(SessionRecord::default().is_empty());
        assert!(!SessionRecord::default().is_live_at(0));
    }

    #[test]
    fn it_attests_only_while_live() {
        let record = SessionRecord {
            commitment: commit(&["search"]),
            expires_at: 100,
            active: true,
        };
        assert!(record.attests(&commit(&["search"]), 99));
        assert!(!record.attests(&commit(&["search"]), 100));
        assert!(!record.attests(&commit(&["query"]), 50));

        let revoked = SessionRecord {
            active: false,
            ..record
        };
        assert!(!revoked.attests(&commit(&["search"]), 50));
    }
}
