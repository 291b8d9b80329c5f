//! Stage orchestration.
//!
//! A pull is a sequence of stages (token, year id, counts, data). Each
//! stage prepares a batch of request descriptors, classifies responses,
//! and folds accepted payloads into a shared JSON accumulator. Rejected
//! responses fold in as a raw string under the entity's key, so a
//! failed entity degrades the accumulator's shape instead of aborting
//! the run.

use std::time::Duration;

use serde_json::{Value, json};

use sispull_core::{Outcome, RequestDescriptor, Transport, merge_value, retry_descriptor};

use crate::classify;

/// Application-level retry policy for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StagePolicy {
    pub attempts: u32,
    pub sleep: Duration,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            sleep: Duration::from_secs(1),
        }
    }
}

/// One step of a pull.
pub trait QueryStage {
    fn name(&self) -> &str;

    /// Accumulator seed and the batch of requests this stage issues.
    fn prepare(&mut self, acc: &Value) -> (Value, Vec<RequestDescriptor>);

    /// Whether an outcome is acceptable; may rewrite the status in place.
    fn classify(&self, outcome: &mut Outcome, desc: &RequestDescriptor) -> bool {
        classify::accept(outcome, desc)
    }

    /// Fold one accepted outcome into the stage's value.
    fn fold(&mut self, outcome: Outcome, desc: &RequestDescriptor) -> Value;
}

/// Drive one stage to completion against the transport.
///
/// Each descriptor goes through the application retry wrapper with
/// classification applied inside the loop, so a 200-with-error-document
/// gets retried like any other failure. Accepted outcomes fold via the
/// stage; rejections fold in as the raw body text keyed by entity.
pub fn run_stage(
    stage: &mut dyn QueryStage,
    transport: &Transport,
    policy: StagePolicy,
    acc: &mut Value,
) {
    let (seed, descriptors) = stage.prepare(acc);
    merge_value(acc, seed);

    for desc in descriptors {
        let (outcome, desc) = retry_descriptor(policy.attempts, policy.sleep, desc, |d| {
            let (mut outcome, d) = transport.send(d);
            stage.classify(&mut outcome, &d);
            (outcome, d)
        });

        let folded = if outcome.ok() {
            stage.fold(outcome, &desc)
        } else {
            log::warn!(
                "{}: {} failed with status {}",
                stage.name(),
                desc.entity_name,
                outcome.status
            );
            json!({ desc.entity_name.clone(): outcome.text() })
        };
        merge_value(acc, folded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use sispull_core::HttpConfig;

    struct EchoStage {
        urls: Vec<(String, String)>,
    }

    impl QueryStage for EchoStage {
        fn name(&self) -> &str {
            "echo"
        }

        fn prepare(&mut self, _acc: &Value) -> (Value, Vec<RequestDescriptor>) {
            let descs = self
                .urls
                .iter()
                .map(|(url, entity)| RequestDescriptor::new(url.clone(), entity.clone()))
                .collect();
            (json!({ "seen": 0 }), descs)
        }

        fn fold(&mut self, outcome: Outcome, desc: &RequestDescriptor) -> Value {
            json!({ desc.entity_name.clone(): outcome.json().unwrap(), "seen": 1 })
        }
    }

    fn fast_transport(base: String) -> Transport {
        Transport::new(base).with_policy(HttpConfig {
            pool_retries: 0,
            backoff_factor: 0,
            ..HttpConfig::default()
        })
    }

    fn fast_policy() -> StagePolicy {
        StagePolicy {
            attempts: 2,
            sleep: Duration::from_millis(0),
        }
    }

    #[test]
    fn accepted_outcomes_fold_into_accumulator() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/q/students");
            then.status(200).body(r#"{"record": [{"id": "1"}]}"#);
        });

        let mut stage = EchoStage {
            urls: vec![("/q/students".into(), "students".into())],
        };
        let mut acc = json!({});
        run_stage(
            &mut stage,
            &fast_transport(server.base_url()),
            fast_policy(),
            &mut acc,
        );
        assert_eq!(acc["seen"], 1);
        assert_eq!(acc["students"]["record"][0]["id"], "1");
    }

    #[test]
    fn rejected_outcome_degrades_to_raw_string() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/q/students");
            then.status(200).body(r#"{"message": "Unauthorized query"}"#);
        });

        let mut stage = EchoStage {
            urls: vec![("/q/students".into(), "students".into())],
        };
        let mut acc = json!({});
        run_stage(
            &mut stage,
            &fast_transport(server.base_url()),
            fast_policy(),
            &mut acc,
        );
        // Classified as failure, retried once, then folded as raw text
        assert_eq!(mock.hits(), 2);
        assert!(acc["students"].is_string());
        assert!(acc["students"].as_str().unwrap().contains("Unauthorized"));
        assert_eq!(acc["seen"], 0);
    }

    #[test]
    fn exhausted_retries_fold_raw_body() {
        let server = MockServer::start();
        let fail = server.mock(|when, then| {
            when.method(POST).path("/q/students");
            then.status(404);
        });
        let mut stage = EchoStage {
            urls: vec![("/q/students".into(), "students".into())],
        };
        let mut acc = json!({});
        run_stage(
            &mut stage,
            &fast_transport(server.base_url()),
            fast_policy(),
            &mut acc,
        );
        assert_eq!(fail.hits(), 2);
        assert!(acc["students"].is_string());
    }
}
