// Copyright 2026 The Bakery Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::str_to_string, rustdoc::broken_intra_doc_links)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

//! Authorizer glue (C11): the target-side policy that decides which
//! operations an identity may perform, and what extra caveats (if any) that
//! decision should be conditioned on.
//!
//! An [`Authorizer`] never itself denies by returning an error — an error
//! means the decision is undecidable (a backing store is unreachable, say).
//! A plain "no" is `allowed[i] == false`.

use async_trait::async_trait;
use bakery_core::NewCaveat;
use thiserror::Error;

/// Something an identity is asking to do, e.g. `Op { entity: "doc:42",
/// action: "read" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Op {
    pub entity: String,
    pub action: String,
}

impl Op {
    #[must_use]
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthorizerError {
    #[error("authorization decision could not be made: {0}")]
    Undecidable(String),
}

/// The authenticated party an [`Authorizer`] is deciding for. `None` means
/// the request carried no identity macaroon at all.
#[async_trait]
pub trait Identity: Send + Sync {
    fn id(&self) -> &str;

    /// An identity-specific override of ACL membership, consulted by
    /// [`ACLAuthorizer`] before falling back to `allow_public`. Returns
    /// `None` when this identity has no opinion beyond plain ACL membership
    /// (the common case); most implementations never override this.
    async fn allow(&self, _acl: &[String]) -> Option<Result<bool, AuthorizerError>> {
        None
    }
}

/// Looks up the ACL and public-access flag for a single operation.
#[async_trait]
pub trait AclSource: Send + Sync {
    /// Returns the list of principals allowed `op`, and whether
    /// unauthenticated/public access is permitted when `identity` has no
    /// overriding [`Identity::allow`] opinion.
    async fn get_acl(&self, op: &Op) -> Result<(Vec<String>, bool), AuthorizerError>;
}

/// Decides whether `identity` may perform each of `ops`, returning one
/// bool per op (in the same order) plus any caveats the grant should carry.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        identity: Option<&(dyn Identity)>,
        ops: &[Op],
    ) -> Result<(Vec<bool>, Vec<NewCaveat>), AuthorizerError>;
}

/// Allows everything, unconditionally.
pub struct OpenAuthorizer;

#[async_trait]
impl Authorizer for OpenAuthorizer {
    async fn authorize(&self, _identity: Option<&(dyn Identity)>, ops: &[Op]) -> Result<(Vec<bool>, Vec<NewCaveat>), AuthorizerError> {
        Ok((vec![true; ops.len()], Vec::new()))
    }
}

/// Denies everything, unconditionally.
pub struct ClosedAuthorizer;

#[async_trait]
impl Authorizer for ClosedAuthorizer {
    async fn authorize(&self, _identity: Option<&(dyn Identity)>, ops: &[Op]) -> Result<(Vec<bool>, Vec<NewCaveat>), AuthorizerError> {
        Ok((vec![false; ops.len()], Vec::new()))
    }
}

/// "everyone" in an ACL grants access to any identity, including no
/// identity at all, when the source also permits public access for that op.
const EVERYONE: &str = "everyone";

/// Looks up each op's ACL through an [`AclSource`] and checks membership:
/// the identity's own [`Identity::allow`] if it has an opinion, else
/// `allow_public && acl.contains("everyone")`.
pub struct ACLAuthorizer<S> {
    source: S,
}

impl<S: AclSource> ACLAuthorizer<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: AclSource> Authorizer for ACLAuthorizer<S> {
    async fn authorize(&self, identity: Option<&(dyn Identity)>, ops: &[Op]) -> Result<(Vec<bool>, Vec<NewCaveat>), AuthorizerError> {
        let mut allowed = Vec::with_capacity(ops.len());
        for op in ops {
            let (acl, allow_public) = self.source.get_acl(op).await?;

            let decision = match identity {
                Some(identity) => match identity.allow(&acl).await {
                    Some(result) => result?,
                    None => allow_public && acl.iter().any(|p| p == EVERYONE),
                },
                None => allow_public && acl.iter().any(|p| p == EVERYONE),
            };
            allowed.push(decision);
        }
        Ok((allowed, Vec::new()))
    }
}

/// A per-op callback authorizer, for ad hoc policies that don't warrant a
/// full [`AclSource`] implementation.
pub struct AuthorizerFunc<F> {
    func: F,
}

impl<F> AuthorizerFunc<F>
where
    F: Fn(Option<&(dyn Identity)>, &Op) -> Result<(bool, Vec<NewCaveat>), AuthorizerError> + Send + Sync,
{
    #[must_use]
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Authorizer for AuthorizerFunc<F>
where
    F: Fn(Option<&(dyn Identity)>, &Op) -> Result<(bool, Vec<NewCaveat>), AuthorizerError> + Send + Sync,
{
    async fn authorize(&self, identity: Option<&(dyn Identity)>, ops: &[Op]) -> Result<(Vec<bool>, Vec<NewCaveat>), AuthorizerError> {
        let mut allowed = Vec::with_capacity(ops.len());
        let mut caveats = Vec::new();
        for op in ops {
            let (decision, extra) = (self.func)(identity, op)?;
            allowed.push(decision);
            caveats.extend(extra);
        }
        Ok((allowed, caveats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Anon;

    #[async_trait]
    impl Identity for Anon {
        fn id(&self) -> &str {
            "alice"
        }
    }

    struct Denier;

    #[async_trait]
    impl Identity for Denier {
        fn id(&self) -> &str {
            "bob"
        }

        async fn allow(&self, _acl: &[String]) -> Option<Result<bool, AuthorizerError>> {
            Some(Ok(false))
        }
    }

    struct StaticAcls;

    #[async_trait]
    impl AclSource for StaticAcls {
        async fn get_acl(&self, op: &Op) -> Result<(Vec<String>, bool), AuthorizerError> {
            if op.action == "read" {
                Ok((vec![EVERYONE.to_owned()], true))
            } else {
                Ok((vec!["admin".to_owned()], false))
            }
        }
    }

    #[tokio::test]
    async fn open_authorizer_allows_everything() {
        let (allowed, _) = OpenAuthorizer.authorize(None, &[Op::new("doc:1", "write")]).await.unwrap();
        assert_eq!(allowed, vec![true]);
    }

    #[tokio::test]
    async fn closed_authorizer_denies_everything() {
        let (allowed, _) = ClosedAuthorizer.authorize(None, &[Op::new("doc:1", "read")]).await.unwrap();
        assert_eq!(allowed, vec![false]);
    }

    #[tokio::test]
    async fn acl_authorizer_allows_public_read_without_identity() {
        let authorizer = ACLAuthorizer::new(StaticAcls);
        let (allowed, _) = authorizer.authorize(None, &[Op::new("doc:1", "read")]).await.unwrap();
        assert_eq!(allowed, vec![true]);
    }

    #[tokio::test]
    async fn acl_authorizer_denies_non_public_op_without_identity() {
        let authorizer = ACLAuthorizer::new(StaticAcls);
        let (allowed, _) = authorizer.authorize(None, &[Op::new("doc:1", "write")]).await.unwrap();
        assert_eq!(allowed, vec![false]);
    }

    #[tokio::test]
    async fn acl_authorizer_defers_to_identity_override() {
        let authorizer = ACLAuthorizer::new(StaticAcls);
        let denier = Denier;
        let (allowed, _) = authorizer.authorize(Some(&denier), &[Op::new("doc:1", "read")]).await.unwrap();
        assert_eq!(allowed, vec![false], "identity's own Allow overrides public ACL membership");
    }

    #[tokio::test]
    async fn acl_authorizer_falls_back_to_public_when_identity_has_no_opinion() {
        let authorizer = ACLAuthorizer::new(StaticAcls);
        let anon = Anon;
        let (allowed, _) = authorizer.authorize(Some(&anon), &[Op::new("doc:1", "read")]).await.unwrap();
        assert_eq!(allowed, vec![true]);
    }

    #[tokio::test]
    async fn authorizer_func_concatenates_per_op_caveats() {
        let authorizer = AuthorizerFunc::new(|_identity, op: &Op| {
            Ok((op.action == "read", vec![NewCaveat::FirstParty(format!("op:{}", op.action))]))
        });
        let (allowed, caveats) = authorizer
            .authorize(None, &[Op::new("doc:1", "read"), Op::new("doc:1", "write")])
            .await
            .unwrap();
        assert_eq!(allowed, vec![true, false]);
        assert_eq!(caveats.len(), 2);
    }
}
