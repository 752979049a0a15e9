//! Conditional semantics shared by the TTL-setting path (C2/C3/C4/C8)
//!
//! `ExpireSetCond` is the `NX|XX|GT|LT` qualifier `HEXPIRE`-family commands
//! accept; `FieldSetCond` is the analogous qualifier for plain field sets
//! used by `SetExBatch` (`HSET` vs `HSETNX`).

/// Condition on an existing per-field TTL, as accepted by `HEXPIRE` et al.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpireSetCond {
    /// No condition: always apply.
    #[default]
    None,
    /// Only if the field has no TTL.
    Nx,
    /// Only if the field already has a TTL.
    Xx,
    /// Only if the new expiry is later than the current one (field must
    /// already have a TTL).
    Gt,
    /// Only if the new expiry is earlier than the current one, or the
    /// field has no TTL yet.
    Lt,
}

/// Condition on field existence, as accepted by `SetExBatch` (`HSET` is
/// `CreateOrOverwrite`, `HSETNX` is `DontOverwrite`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSetCond {
    #[default]
    CreateOrOverwrite,
    /// Refuse if the field does not already exist.
    DontCreate,
    /// Refuse if the field already exists (`HSETNX`).
    DontOverwrite,
}

/// Result of evaluating an `ExpireSetCond` against a field's current TTL
/// (`0` meaning "no TTL", matching the tuple-ordering convention of
/// `LpStoreEx`).
pub fn condition_met(cond: ExpireSetCond, current_ttl: u64, new_expire_at: u64) -> bool {
    match cond {
        ExpireSetCond::None => true,
        ExpireSetCond::Nx => current_ttl == 0,
        ExpireSetCond::Xx => current_ttl != 0,
        ExpireSetCond::Gt => current_ttl != 0 && new_expire_at > current_ttl,
        ExpireSetCond::Lt => current_ttl == 0 || new_expire_at < current_ttl,
    }
}

/// Outcome of a single-field TTL-setting operation (C2/C3 `set_ttl`, and
/// the hashtable-backed equivalent in C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetExRes {
    Ok,
    NoField,
    NoConditionMet,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nx_refuses_when_ttl_present() {
        assert!(condition_met(ExpireSetCond::Nx, 0, 1_000));
        assert!(!condition_met(ExpireSetCond::Nx, 500, 1_000));
    }

    #[test]
    fn gt_requires_existing_ttl_and_later_value() {
        assert!(!condition_met(ExpireSetCond::Gt, 0, 1_000));
        assert!(!condition_met(ExpireSetCond::Gt, 2_000, 1_000));
        assert!(condition_met(ExpireSetCond::Gt, 500, 1_000));
    }

    #[test]
    fn lt_allows_no_ttl_or_earlier_value() {
        assert!(condition_met(ExpireSetCond::Lt, 0, 1_000));
        assert!(condition_met(ExpireSetCond::Lt, 2_000, 1_000));
        assert!(!condition_met(ExpireSetCond::Lt, 500, 1_000));
    }
}
