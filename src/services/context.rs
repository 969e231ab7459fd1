//! Caller identity passed to notebook operations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
    pub user: String,
}

impl AuthenticationInfo {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER)
    }
}

/// Identity plus the principals (user and roles) it may act as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContext {
    pub authentication_info: AuthenticationInfo,
    #[serde(default)]
    pub user_and_roles: BTreeSet<String>,
}

impl ServiceContext {
    pub fn new(authentication_info: AuthenticationInfo, user_and_roles: BTreeSet<String>) -> Self {
        Self {
            authentication_info,
            user_and_roles,
        }
    }

    /// Anonymous identity with no granted roles.
    pub fn anonymous() -> Self {
        Self::new(AuthenticationInfo::anonymous(), BTreeSet::new())
    }

    pub fn user(&self) -> &str {
        &self.authentication_info.user
    }

    pub fn is_anonymous(&self) -> bool {
        self.user() == ANONYMOUS_USER && self.user_and_roles.is_empty()
    }

    /// The user followed by every granted role.
    pub fn principals(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.user()).chain(self.user_and_roles.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_roles() {
        let context = ServiceContext::anonymous();
        assert!(context.is_anonymous());
        assert_eq!(context.principals().collect::<Vec<_>>(), vec!["anonymous"]);
    }

    #[test]
    fn parses_camel_case_json() {
        let context: ServiceContext = serde_json::from_str(
            r#"{"authenticationInfo":{"user":"alice"},"userAndRoles":["alice","admin"]}"#,
        )
        .unwrap();
        assert_eq!(context.user(), "alice");
        assert!(context.user_and_roles.contains("admin"));
        assert!(!context.is_anonymous());
    }
}
