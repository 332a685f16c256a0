//! This module provides ways to tweak the in-memory remote store, so that it can return errors on some tests

use crate::error::StoreError;

/// The error a mocked failure produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The store is unreachable
    Transient,
    /// The store refuses the request
    PermissionDenied,
}

impl Default for FailureKind {
    fn default() -> Self {
        FailureKind::Transient
    }
}

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,
    /// What a failure looks like
    pub failure: FailureKind,

    pub is_ready_behaviour: (u32, u32),
    pub list_behaviour: (u32, u32),
    pub get_behaviour: (u32, u32),
    pub create_behaviour: (u32, u32),
    pub merge_behaviour: (u32, u32),
    pub create_if_absent_behaviour: (u32, u32),
    pub delete_behaviour: (u32, u32),
    pub subscribe_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All items will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            failure: FailureKind::Transient,
            is_ready_behaviour: (0, n_fails),
            list_behaviour: (0, n_fails),
            get_behaviour: (0, n_fails),
            create_behaviour: (0, n_fails),
            merge_behaviour: (0, n_fails),
            create_if_absent_behaviour: (0, n_fails),
            delete_behaviour: (0, n_fails),
            subscribe_behaviour: (0, n_fails),
        }
    }

    /// Every write (create, merge, create-if-absent, delete) is refused for `n_fails` times
    pub fn deny_writes(n_fails: u32) -> Self {
        Self {
            failure: FailureKind::PermissionDenied,
            create_behaviour: (0, n_fails),
            merge_behaviour: (0, n_fails),
            create_if_absent_behaviour: (0, n_fails),
            delete_behaviour: (0, n_fails),
            ..Self::default()
        }
    }

    /// Use `failure` for the failures of this behaviour
    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = failure;
        self
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_check_ready(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.is_ready_behaviour, "is_ready", self.failure, collection)
    }
    pub fn can_list(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.list_behaviour, "list", self.failure, collection)
    }
    pub fn can_get(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.get_behaviour, "get", self.failure, collection)
    }
    pub fn can_create(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_behaviour, "create", self.failure, collection)
    }
    pub fn can_merge(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.merge_behaviour, "merge", self.failure, collection)
    }
    pub fn can_create_if_absent(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_if_absent_behaviour, "create_if_absent", self.failure, collection)
    }
    pub fn can_delete(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.delete_behaviour, "delete", self.failure, collection)
    }
    pub fn can_subscribe(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.subscribe_behaviour, "subscribe", self.failure, collection)
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str, failure: FailureKind, collection: &str) -> Result<(), StoreError> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 = value.0 - 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else {
        if remaining_failures > 0 {
            value.1 = value.1 - 1;
            log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
            match failure {
                FailureKind::Transient => Err(StoreError::Transient(
                    format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value))),
                FailureKind::PermissionDenied => Err(StoreError::PermissionDenied { collection: collection.to_string() }),
            }
        } else {
            log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mock_behaviour() {
        let mut ok = MockBehaviour::new();
        assert!(ok.can_list("doctors").is_ok());
        assert!(ok.can_list("doctors").is_ok());
        assert!(ok.can_list("doctors").is_ok());
        assert!(ok.can_create("doctors").is_ok());

        let mut now = MockBehaviour::fail_now(2);
        assert!(now.can_list("doctors").is_err());
        assert!(now.can_create("doctors").is_err());
        assert!(now.can_create("doctors").is_err());
        assert!(now.can_list("doctors").is_err());
        assert!(now.can_list("doctors").is_ok());
        assert!(now.can_list("doctors").is_ok());
        assert!(now.can_create("doctors").is_ok());

        let mut custom = MockBehaviour{
            list_behaviour: (0,1),
            create_behaviour: (1,3),
            ..MockBehaviour::default()
        };
        assert!(custom.can_list("shifts").is_err());
        assert!(custom.can_list("shifts").is_ok());
        assert!(custom.can_list("shifts").is_ok());
        assert!(custom.can_create("shifts").is_ok());
        assert!(custom.can_create("shifts").is_err());
        assert!(custom.can_create("shifts").is_err());
        assert!(custom.can_create("shifts").is_err());
        assert!(custom.can_create("shifts").is_ok());
    }

    #[test]
    fn failures_carry_their_kind() {
        let mut denied = MockBehaviour::deny_writes(1);
        assert!(denied.can_list("shifts").is_ok());
        assert!(denied.can_merge("shifts").unwrap_err().is_permission());
        assert!(denied.can_merge("shifts").is_ok());

        let mut suspended = MockBehaviour::fail_now(5);
        suspended.suspend();
        assert!(suspended.can_get("doctors").is_ok());
        suspended.resume();
        assert!(suspended.can_get("doctors").unwrap_err().is_transient());
    }
}
