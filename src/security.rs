//! Credential impersonation boundary.
//!
//! The OS-level mechanism (token logon, identity switch, undo) lives behind
//! the [`Impersonator`] trait. [`ImpersonationScope`] is the only way to
//! switch identity: it acquires on construction and releases on drop, so the
//! undo runs exactly once per acquire no matter how the impersonated block
//! exits. Only one impersonation may be active at a time within an execution
//! context, and every call that depends on the impersonated identity must
//! happen while the scope is alive.

use crate::config::CompanyCredentials;
use crate::error::Result;

pub trait Impersonator: Send + Sync {
    /// True when the caller already runs under a web/user security context.
    /// Impersonated backend access is for service callers only.
    fn has_user_context(&self) -> bool;

    /// Acquire an access token for the identity and switch the execution
    /// context to it.
    fn logon(&self, user_id: &str, domain: &str, password: &str) -> Result<()>;

    /// Revert the execution context to its original identity.
    fn undo(&self);
}

/// Scoped impersonation guard.
pub struct ImpersonationScope<'a> {
    provider: &'a dyn Impersonator,
}

impl<'a> ImpersonationScope<'a> {
    pub fn acquire(
        provider: &'a dyn Impersonator,
        credentials: &CompanyCredentials,
    ) -> Result<Self> {
        provider.logon(&credentials.user_id, &credentials.domain, &credentials.password)?;
        Ok(ImpersonationScope { provider })
    }
}

impl Drop for ImpersonationScope<'_> {
    fn drop(&mut self) {
        self.provider.undo();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameworkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingImpersonator {
        logons: AtomicUsize,
        undos: AtomicUsize,
        refuse: bool,
    }

    impl Impersonator for CountingImpersonator {
        fn has_user_context(&self) -> bool {
            false
        }

        fn logon(&self, _: &str, _: &str, _: &str) -> Result<()> {
            if self.refuse {
                return Err(FrameworkError::Access("logon refused".to_string()));
            }
            self.logons.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn undo(&self) {
            self.undos.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn credentials() -> CompanyCredentials {
        CompanyCredentials {
            domain: "CREDIT".to_string(),
            user_id: "svc_framework".to_string(),
            password: "secret".to_string(),
            from_cache: false,
        }
    }

    #[test]
    fn undo_runs_once_per_acquire() {
        let provider = CountingImpersonator::default();
        {
            let _scope = ImpersonationScope::acquire(&provider, &credentials()).unwrap();
        }
        assert_eq!(provider.logons.load(Ordering::SeqCst), 1);
        assert_eq!(provider.undos.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undo_runs_even_when_the_impersonated_block_fails() {
        let provider = CountingImpersonator::default();
        let outcome: Result<()> = (|| {
            let _scope = ImpersonationScope::acquire(&provider, &credentials())?;
            Err(FrameworkError::Validation("backend call failed".to_string()))
        })();
        assert!(outcome.is_err());
        assert_eq!(provider.undos.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_logon_does_not_undo() {
        let provider = CountingImpersonator {
            refuse: true,
            ..CountingImpersonator::default()
        };
        assert!(ImpersonationScope::acquire(&provider, &credentials()).is_err());
        assert_eq!(provider.undos.load(Ordering::SeqCst), 0);
    }
}
