pub mod assets;
pub mod events;
pub mod explain;
pub mod generate;
pub mod generations;
pub mod jobs;
pub mod system;

use serde::Deserialize;
use std::time::Duration;

use crate::coordinator::SignOptions;

/// `?signed=1&ttl=N` on read paths
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignQuery {
    pub signed: Option<String>,
    /// Seconds
    pub ttl: Option<u64>,
}

impl SignQuery {
    pub fn options(&self) -> SignOptions {
        let signed = matches!(
            self.signed.as_deref().map(str::trim),
            Some("1" | "true" | "yes")
        );
        SignOptions {
            signed,
            ttl: self.ttl.filter(|ttl| *ttl > 0).map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_query_options() {
        let query = SignQuery {
            signed: Some("1".to_string()),
            ttl: Some(120),
        };
        assert_eq!(query.options(), SignOptions::signed(Some(Duration::from_secs(120))));

        let off = SignQuery {
            signed: Some("0".to_string()),
            ttl: Some(0),
        };
        assert_eq!(off.options(), SignOptions::default());
        assert_eq!(SignQuery::default().options(), SignOptions::default());
    }
}
