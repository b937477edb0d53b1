//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod shipping {
    use super::*;

    pub const NAMESPACE: &str = "shipping";

    /// Bearer token for one aggregator account
    #[derive(Debug, Clone)]
    pub struct SessionTokenKey {
        pub account: String,
    }

    impl SessionTokenKey {
        pub fn new(account: impl Into<String>) -> Self {
            Self {
                account: account.into().to_lowercase(),
            }
        }
    }

    impl fmt::Display for SessionTokenKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:token:{}", VERSION, NAMESPACE, self.account)
        }
    }
}
