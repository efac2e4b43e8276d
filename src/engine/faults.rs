// Fault injection for exercising client retry paths
// Deterministic, per-operation failure policies

//! # Fault Injection
//!
//! Some mutating operations are *guarded*: each call first takes a ticket
//! from the [`FaultInjector`], which bumps that operation's own call counter
//! and asks a [`FaultPolicy`] whether this call should fail. A failing ticket
//! turns into [`ControllerError::Transient`] before any state is written.
//!
//! Counters are independent per [`GuardedOperation`] and count every guarded
//! call, failed ones included. With [`EveryNthCall`] set to 3, calls 3, 6, 9,
//! ... of each operation fail and every other call goes through.
//!
//! A disabled injector (the production default) never touches its counters,
//! so the guarded paths cost one branch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ControllerError, Result};

/// Operations that go through the fault injector, each with its own counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardedOperation {
    SaveContainerSpec,
    SaveServerTemplate,
    UpdateContainerConfig,
    StartContainer,
    StopContainer,
    ScanNow,
    StartScanner,
    StopScanner,
    VersionUpgrade,
}

impl GuardedOperation {
    pub const ALL: [GuardedOperation; 9] = [
        GuardedOperation::SaveContainerSpec,
        GuardedOperation::SaveServerTemplate,
        GuardedOperation::UpdateContainerConfig,
        GuardedOperation::StartContainer,
        GuardedOperation::StopContainer,
        GuardedOperation::ScanNow,
        GuardedOperation::StartScanner,
        GuardedOperation::StopScanner,
        GuardedOperation::VersionUpgrade,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardedOperation::SaveContainerSpec => "save_container_spec",
            GuardedOperation::SaveServerTemplate => "save_server_template",
            GuardedOperation::UpdateContainerConfig => "update_container_config",
            GuardedOperation::StartContainer => "start_container",
            GuardedOperation::StopContainer => "stop_container",
            GuardedOperation::ScanNow => "scan_now",
            GuardedOperation::StartScanner => "start_scanner",
            GuardedOperation::StopScanner => "stop_scanner",
            GuardedOperation::VersionUpgrade => "version_upgrade",
        }
    }
}

impl fmt::Display for GuardedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides, from the operation and its 1-based call number, whether a call fails
pub trait FaultPolicy: Send + Sync {
    fn should_fail(&self, operation: GuardedOperation, call: u64) -> bool;
}

/// Policy that never injects a fault
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFail;

impl FaultPolicy for NeverFail {
    fn should_fail(&self, _operation: GuardedOperation, _call: u64) -> bool {
        false
    }
}

/// Fails every `n`th call of each operation
#[derive(Debug, Clone, Copy)]
pub struct EveryNthCall {
    n: u64,
}

impl EveryNthCall {
    pub fn new(n: u64) -> Result<Self> {
        if n == 0 {
            return Err(ControllerError::InvalidArgument(
                "fault modulus must be at least 1".to_string(),
            ));
        }
        Ok(Self { n })
    }

    pub fn n(&self) -> u64 {
        self.n
    }
}

impl FaultPolicy for EveryNthCall {
    fn should_fail(&self, _operation: GuardedOperation, call: u64) -> bool {
        call % self.n == 0
    }
}

/// Adapter turning a closure into a [`FaultPolicy`]
pub struct FnPolicy<F>(pub F);

impl<F> FaultPolicy for FnPolicy<F>
where
    F: Fn(GuardedOperation, u64) -> bool + Send + Sync,
{
    fn should_fail(&self, operation: GuardedOperation, call: u64) -> bool {
        (self.0)(operation, call)
    }
}

/// Outcome of one guarded call, decided up front and enforced later
#[derive(Debug, Clone, Copy)]
#[must_use = "a ticket does nothing until it is checked"]
pub struct FaultTicket {
    operation: GuardedOperation,
    call: u64,
    fail: bool,
}

impl FaultTicket {
    /// Call number within this operation's counter (0 when injection is off)
    pub fn call(&self) -> u64 {
        self.call
    }

    pub fn will_fail(&self) -> bool {
        self.fail
    }

    /// Turn a failing ticket into a transient error
    pub fn check(self) -> Result<()> {
        if !self.fail {
            return Ok(());
        }

        warn!(
            operation = %self.operation,
            call = self.call,
            "Injected transient fault"
        );
        Err(ControllerError::Transient {
            operation: self.operation.to_string(),
            call: self.call,
        })
    }
}

/// Per-operation call counters plus the policy that judges them
pub struct FaultInjector {
    policy: Option<Arc<dyn FaultPolicy>>,
    counters: [AtomicU64; 9],
}

impl FaultInjector {
    /// Injector that never fails and never counts
    pub fn disabled() -> Self {
        Self {
            policy: None,
            counters: Default::default(),
        }
    }

    pub fn with_policy(policy: impl FaultPolicy + 'static) -> Self {
        Self {
            policy: Some(Arc::new(policy)),
            counters: Default::default(),
        }
    }

    /// Injector failing calls n, 2n, 3n, ... of every guarded operation
    pub fn every_nth_call(n: u64) -> Result<Self> {
        Ok(Self::with_policy(EveryNthCall::new(n)?))
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_some()
    }

    /// Count one call of `operation` and decide its fate
    pub fn tick(&self, operation: GuardedOperation) -> FaultTicket {
        let Some(policy) = &self.policy else {
            return FaultTicket {
                operation,
                call: 0,
                fail: false,
            };
        };

        let call = self.counters[operation.index()].fetch_add(1, Ordering::SeqCst) + 1;
        FaultTicket {
            operation,
            call,
            fail: policy.should_fail(operation, call),
        }
    }

    /// Number of calls counted so far for `operation`
    pub fn calls(&self, operation: GuardedOperation) -> u64 {
        self.counters[operation.index()].load(Ordering::SeqCst)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for FaultInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters: Vec<(GuardedOperation, u64)> = GuardedOperation::ALL
            .iter()
            .map(|operation| (*operation, self.calls(*operation)))
            .collect();

        f.debug_struct("FaultInjector")
            .field("enabled", &self.is_enabled())
            .field("counters", &counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_third_call_fails() {
        let injector = FaultInjector::every_nth_call(3).unwrap();

        let outcomes: Vec<bool> = (0..9)
            .map(|_| injector.tick(GuardedOperation::SaveContainerSpec).will_fail())
            .collect();

        assert_eq!(
            outcomes,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(injector.calls(GuardedOperation::SaveContainerSpec), 9);
    }

    #[test]
    fn test_counters_are_independent() {
        let injector = FaultInjector::every_nth_call(3).unwrap();

        assert!(!injector.tick(GuardedOperation::StartContainer).will_fail());
        assert!(!injector.tick(GuardedOperation::StartContainer).will_fail());
        // A different operation starts from its own first call
        assert!(!injector.tick(GuardedOperation::StopContainer).will_fail());
        assert!(injector.tick(GuardedOperation::StartContainer).will_fail());

        assert_eq!(injector.calls(GuardedOperation::StartContainer), 3);
        assert_eq!(injector.calls(GuardedOperation::StopContainer), 1);
        assert_eq!(injector.calls(GuardedOperation::ScanNow), 0);
    }

    #[test]
    fn test_disabled_injector_does_not_count() {
        let injector = FaultInjector::disabled();
        for _ in 0..6 {
            assert!(injector.tick(GuardedOperation::ScanNow).check().is_ok());
        }
        assert_eq!(injector.calls(GuardedOperation::ScanNow), 0);
    }

    #[test]
    fn test_failing_ticket_is_transient() {
        let injector = FaultInjector::with_policy(FnPolicy(|operation, call| {
            operation == GuardedOperation::StopScanner && call == 1
        }));

        let err = injector.tick(GuardedOperation::StopScanner).check().unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ControllerError::Transient { ref operation, call: 1 } if operation == "stop_scanner"
        ));
        assert!(injector.tick(GuardedOperation::StopScanner).check().is_ok());
    }

    #[test]
    fn test_never_fail_still_counts() {
        let injector = FaultInjector::with_policy(NeverFail);
        assert!(injector.is_enabled());

        for call in 1..=6 {
            let ticket = injector.tick(GuardedOperation::StartScanner);
            assert_eq!(ticket.call(), call);
            assert!(ticket.check().is_ok());
        }
        assert_eq!(injector.calls(GuardedOperation::StartScanner), 6);
    }

    #[test]
    fn test_modulus_of_one_fails_every_call() {
        let policy = EveryNthCall::new(1).unwrap();
        assert_eq!(policy.n(), 1);
        assert!((1..=4).all(|call| policy.should_fail(GuardedOperation::ScanNow, call)));
    }

    #[test]
    fn test_zero_modulus_is_rejected() {
        assert!(matches!(
            EveryNthCall::new(0),
            Err(ControllerError::InvalidArgument(_))
        ));
    }
}
