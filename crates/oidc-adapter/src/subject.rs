//! Ambient subject resolution.
//!
//! Upstream authentication (bearer-token validation, session providers) is
//! not part of this crate. When a payload does not name its subject, the
//! adapter asks a [`SubjectResolver`] for the caller that is authenticated
//! at write time. The resolver is injected; the adapter never reaches into an
//! auth module on its own.

use async_trait::async_trait;

use crate::AdapterResult;

/// Resolves the subject of the currently authenticated caller.
#[async_trait]
pub trait SubjectResolver: Send + Sync {
    /// Returns the caller's subject, `None` when nobody is authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream identity source fails. The adapter
    /// logs the failure and stores the record without a subject.
    async fn current_subject(&self) -> AdapterResult<Option<String>>;
}

/// Resolver that always yields the same subject.
///
/// Handy for request-scoped factories where the caller has already been
/// authenticated.
#[derive(Debug, Clone)]
pub struct FixedSubject(pub Option<String>);

impl FixedSubject {
    /// Creates a resolver for `subject`.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self(Some(subject.into()))
    }

    /// Creates a resolver for an unauthenticated caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl SubjectResolver for FixedSubject {
    async fn current_subject(&self) -> AdapterResult<Option<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::block_on;

    #[test]
    fn test_fixed_subject() {
        let resolver = FixedSubject::new("u1");
        assert_eq!(
            block_on(resolver.current_subject()).unwrap().as_deref(),
            Some("u1")
        );

        let resolver = FixedSubject::anonymous();
        assert_eq!(block_on(resolver.current_subject()).unwrap(), None);
    }
}
