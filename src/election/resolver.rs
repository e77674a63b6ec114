//! Pure leader resolution over a membership snapshot.
//!
//! The leader of a group is simply the member with the lowest creation
//! index. Nothing is negotiated: two members evaluating the same snapshot
//! always agree.

use crate::metadata::Member;

/// Result of resolving leadership against one snapshot.
#[derive(Debug, Clone)]
pub struct Leadership {
    pub leader: Member,
    /// True iff the resolved leader is the calling member itself.
    pub is_self: bool,
}

/// Resolve the leader of `self_member`'s group from a snapshot.
///
/// The scan is seeded with the caller's own record and tracks the strict
/// minimum creation index, so under a creation-index tie the first holder
/// encountered wins. Creation indexes are assigned uniquely by the
/// metadata service, so ties should not occur; when they do (untrusted
/// source), resolution stays deterministic for a fixed snapshot order.
pub fn resolve_leader(self_member: &Member, snapshot: &[Member]) -> Leadership {
    let mut leader = self_member;
    let mut min_index = self_member.create_index;

    for member in snapshot {
        if member.create_index < min_index {
            min_index = member.create_index;
            leader = member;
        }
    }

    Leadership {
        is_self: leader.uuid == self_member.uuid,
        leader: leader.clone(),
    }
}

/// Resolve the leader of an arbitrary snapshot, without a caller seed.
///
/// Used when asking about another service's leader. `None` for an empty
/// snapshot.
pub fn resolve_leader_of(snapshot: &[Member]) -> Option<&Member> {
    let mut members = snapshot.iter();
    let mut leader = members.next()?;

    for member in members {
        if member.create_index < leader.create_index {
            leader = member;
        }
    }

    Some(leader)
}
