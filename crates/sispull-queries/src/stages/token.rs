//! OAuth client-credentials token stage.

use serde_json::{Value, json};

use sispull_core::{Outcome, RequestDescriptor};

use crate::stage::QueryStage;

pub struct TokenStage {
    token_url: String,
    client_id: String,
    client_secret: String,
    /// Parsed token, set only when the grant response was accepted.
    pub token: Option<String>,
}

impl TokenStage {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: None,
        }
    }
}

impl QueryStage for TokenStage {
    fn name(&self) -> &str {
        "token"
    }

    fn prepare(&mut self, _acc: &Value) -> (Value, Vec<RequestDescriptor>) {
        let desc = RequestDescriptor::new(self.token_url.clone(), "token")
            .with_params(vec![
                ("grant_type".into(), "client_credentials".into()),
                ("client_id".into(), self.client_id.clone()),
                ("client_secret".into(), self.client_secret.clone()),
            ])
            .with_headers(vec![(
                "Content-Type".into(),
                "application/x-www-form-urlencoded".into(),
            )]);
        (json!({}), vec![desc])
    }

    fn fold(&mut self, outcome: Outcome, _desc: &RequestDescriptor) -> Value {
        self.token = outcome
            .json()
            .and_then(|body| body["access_token"].as_str().map(str::to_string));
        json!({ "token": self.token.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_builds_credential_query() {
        let mut stage = TokenStage::new("/oauth/access_token", "id", "secret");
        let (seed, descs) = stage.prepare(&json!({}));
        assert_eq!(seed, json!({}));
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].url, "/oauth/access_token");
        assert!(
            descs[0]
                .params
                .contains(&("grant_type".to_string(), "client_credentials".to_string()))
        );
        assert_eq!(descs[0].headers.len(), 1);
    }

    #[test]
    fn fold_extracts_access_token() {
        let mut stage = TokenStage::new("/oauth/access_token", "id", "secret");
        let outcome = Outcome {
            status: 200,
            body: sispull_core::OutcomeBody::Text(r#"{"access_token": "tok-1"}"#.into()),
        };
        let desc = RequestDescriptor::new("/oauth/access_token", "token");
        assert_eq!(stage.fold(outcome, &desc), json!({ "token": "tok-1" }));
        assert_eq!(stage.token.as_deref(), Some("tok-1"));
    }

    #[test]
    fn fold_leaves_no_token_on_malformed_grant() {
        let mut stage = TokenStage::new("/oauth/access_token", "id", "secret");
        let outcome = Outcome {
            status: 200,
            body: sispull_core::OutcomeBody::Text(r#"{"token_type": "Bearer"}"#.into()),
        };
        let desc = RequestDescriptor::new("/oauth/access_token", "token");
        stage.fold(outcome, &desc);
        assert!(stage.token.is_none());
    }
}
