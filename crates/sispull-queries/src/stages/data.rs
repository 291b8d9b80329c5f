//! Data fetch stage: page fan-out, streaming, and flat-file writes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use serde_json::{Value, json};

use sispull_core::{
    Outcome, OutcomeBody, RequestDescriptor, SharedProgress, append_page, check_and_delete,
    scratch_path, scratch_to_txt, stream_to_scratch, text_tmp_path, upgrade_to_bar,
};

use crate::client::{ClientConfig, short_name};
use crate::paging::{self, PagePlan};
use crate::stage::QueryStage;

/// Running totals folded so far for one entity.
#[derive(Debug, Default, Clone, Copy)]
struct EntityTally {
    pages: u64,
    streams: u64,
    records: u64,
}

pub struct DataStage {
    entities: Vec<String>,
    config: ClientConfig,
    output_dir: PathBuf,
    progress: SharedProgress,
    /// Payload echo from the count stage, sent with every page request.
    payloads: HashMap<String, Value>,
    headers: HashMap<String, Vec<String>>,
    plans: HashMap<String, PagePlan>,
    tally: HashMap<String, EntityTally>,
}

impl DataStage {
    pub fn new(
        entities: Vec<String>,
        config: ClientConfig,
        output_dir: PathBuf,
        progress: SharedProgress,
        payloads: HashMap<String, Value>,
    ) -> Self {
        Self {
            entities,
            config,
            output_dir,
            progress,
            payloads,
            headers: HashMap::new(),
            plans: HashMap::new(),
            tally: HashMap::new(),
        }
    }

    /// Clear stale temp files for one entity. Returns the names that
    /// could not be removed; any leftover means the entity must not
    /// fetch this run, or it would append onto stale data.
    fn clear_stale(&self, short: &str) -> Vec<String> {
        let scratch = scratch_path(&self.output_dir, short);
        let txt = text_tmp_path(&self.output_dir, short);
        let scratch_ok = check_and_delete(&scratch);
        let txt_ok = check_and_delete(&txt);

        // A stale scratch file blocks page mode too; it would be promoted
        // on top of whatever the pages wrote.
        let mut errors = Vec::new();
        if !txt_ok {
            errors.push(txt.display().to_string());
        }
        if !scratch_ok {
            errors.push(scratch.display().to_string());
        }
        errors
    }

    fn fold_stream(&mut self, outcome: Outcome, short: &str) -> u64 {
        let mut body = match outcome.body {
            OutcomeBody::Stream(s) => s,
            OutcomeBody::Text(_) => {
                log::warn!("{short}: expected streamed body, got buffered text");
                return 0;
            }
        };
        let pb = self.progress.entity_bar(short);
        if let Some(total) = body.total_bytes {
            upgrade_to_bar(&pb, total);
        }

        let scratch = scratch_path(&self.output_dir, short);
        let chunks = match stream_to_scratch(&mut body.reader, &scratch, &pb) {
            Ok(n) => n,
            Err(err) => {
                log::warn!("{short}: stream aborted: {err}");
                pb.finish_and_clear();
                return 0;
            }
        };
        pb.finish_and_clear();
        if chunks == 0 {
            return 0;
        }

        let headers = self.headers.get(short).cloned().unwrap_or_default();
        match scratch_to_txt(&headers, short, &self.output_dir) {
            Ok(records) => records as u64,
            Err(err) => {
                log::warn!("{short}: scratch conversion failed: {err}");
                0
            }
        }
    }

    fn fold_page(&mut self, outcome: Outcome, desc: &RequestDescriptor, short: &str) -> u64 {
        let records = outcome
            .json()
            .and_then(|body| body["record"].as_array().cloned())
            .unwrap_or_default();
        let headers = self.headers.get(short).cloned().unwrap_or_default();
        let txt = text_tmp_path(&self.output_dir, short);
        match append_page(&txt, &headers, &records) {
            Ok(written) => {
                let page = desc
                    .params
                    .iter()
                    .find(|(k, _)| k == "page")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("?");
                let total = self.plans.get(short).map(|p| p.pages).unwrap_or(0);
                log::debug!(
                    "page {page} out of {total} successfully created for {short} with {written} records"
                );
                written as u64
            }
            Err(err) => {
                log::warn!("{short}: page write failed: {err}");
                0
            }
        }
    }
}

impl QueryStage for DataStage {
    fn name(&self) -> &str {
        "data"
    }

    /// Plan every entity from the counts folded by the count stage.
    ///
    /// An entity whose stale temp files cannot be cleared produces zero
    /// descriptors and an `error_file` entry instead.
    fn prepare(&mut self, acc: &Value) -> (Value, Vec<RequestDescriptor>) {
        let mut seed = json!({});
        let mut descriptors = Vec::new();

        for entity in self.entities.clone() {
            let short = short_name(&entity).to_string();
            let count = acc[&short]["count"].as_u64().unwrap_or(0) as usize;
            let plan = paging::plan(
                count,
                self.config.records_per_page,
                self.config.stream_threshold,
            );
            self.plans.insert(short.clone(), plan);

            let headers = self
                .config
                .file_headers(&entity)
                .cloned()
                .unwrap_or_default();
            self.headers.insert(short.clone(), headers);

            let payload = self
                .payloads
                .get(&short)
                .cloned()
                .unwrap_or_else(|| json!({}));

            let errors = self.clear_stale(&short);
            let counters = if plan.stream {
                json!({ "stream": 0, "records": 0 })
            } else {
                json!({ "pages": 0, "records": 0 })
            };
            let mut entry = counters;
            entry["error_file"] = json!(errors.clone());
            entry["payload"] = payload.clone();
            seed[&short] = entry;

            if !errors.is_empty() {
                log::warn!("{short}: skipping fetch, stale files remain: {errors:?}");
                continue;
            }

            let pages = if plan.stream { 1 } else { plan.pages };
            let pagesize = if plan.stream {
                0
            } else {
                self.config.records_per_page
            };
            for page in 1..=pages {
                let mut desc = RequestDescriptor::new(entity.clone(), short.clone())
                    .with_params(vec![
                        ("page".into(), page.to_string()),
                        ("pagesize".into(), pagesize.to_string()),
                    ])
                    .with_payload(payload.clone());
                desc.stream = plan.stream;
                descriptors.push(desc);
            }
        }
        (seed, descriptors)
    }

    fn fold(&mut self, outcome: Outcome, desc: &RequestDescriptor) -> Value {
        let short = desc.entity_name.clone();
        let started = Instant::now();
        let stream = desc.stream;
        let records = if stream {
            self.fold_stream(outcome, &short)
        } else {
            self.fold_page(outcome, desc, &short)
        };

        let tally = self.tally.entry(short.clone()).or_default();
        tally.records += records;
        if stream {
            tally.streams += 1;
        } else {
            tally.pages += 1;
        }
        log::debug!(
            "{short}: folded {records} records in {:.2?}",
            started.elapsed()
        );

        let counters = if stream {
            json!({ "stream": tally.streams, "records": tally.records })
        } else {
            json!({ "pages": tally.pages, "records": tally.records })
        };
        json!({ short: counters })
    }
}
