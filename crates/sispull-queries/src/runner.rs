//! Top-level pull orchestration.
//!
//! Sequences the stages of one run: token, year id, per-entity counts,
//! data fetch, then temp-file review. Entity-level failures are folded
//! into the result document; only configuration and authentication
//! failures abort the run.

use std::path::Path;
use std::time::Instant;

use anyhow::bail;
use chrono::NaiveDate;
use serde_json::{Value, json};

use sispull_core::{SharedProgress, Transport, merge_value, review_temporary_file};

use crate::client::{ClientConfig, short_name};
use crate::stage::{QueryStage, StagePolicy, run_stage};
use crate::stages::{CountStage, DataStage, TokenStage, YearIdStage};
use crate::year;

/// Entity selection flags from the CLI.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Pull only the attendance catalog
    pub attendance: bool,
    /// Pull a single entity, matched by short name
    pub single: Option<String>,
    /// Short names excluded from the standard pull
    pub exclude: Vec<String>,
}

/// Which entities this run will pull.
pub fn select_entities(config: &ClientConfig, options: &PullOptions) -> Vec<String> {
    if options.attendance {
        return config.attendance_list.clone();
    }
    let full = config.full_list();
    if let Some(single) = &options.single {
        return full
            .into_iter()
            .filter(|e| short_name(e) == single)
            .collect();
    }
    full.into_iter()
        .filter(|e| !options.exclude.iter().any(|x| x == short_name(e)))
        .collect()
}

/// Run one stage behind a spinner line naming it.
fn run_stage_with_status(
    stage: &mut dyn QueryStage,
    transport: &Transport,
    policy: StagePolicy,
    acc: &mut Value,
    progress: &SharedProgress,
) {
    let status = progress.stage_line(stage.name());
    run_stage(stage, transport, policy, acc);
    status.finish_and_clear();
}

/// Execute one pull end to end.
///
/// Returns the folded result document. Token and rollover-date failures
/// are fatal; everything else degrades into the document.
pub fn run_pull(
    config: &ClientConfig,
    options: &PullOptions,
    transport: &mut Transport,
    output_dir: &Path,
    progress: SharedProgress,
    today: NaiveDate,
    policy: StagePolicy,
) -> anyhow::Result<Value> {
    let started = Instant::now();
    std::fs::create_dir_all(output_dir)?;

    let entities = select_entities(config, options);
    if entities.is_empty() {
        log::warn!("nothing to pull with the given selection");
    }

    let mut acc = json!({});

    // Token exchange. Without a bearer token nothing else can run.
    let mut token_stage = TokenStage::new(
        &config.token_url,
        &config.client_id,
        &config.client_secret,
    );
    run_stage_with_status(&mut token_stage, transport, policy, &mut acc, &progress);
    let token = match token_stage.token {
        Some(token) => token,
        None => bail!("could not obtain an access token: {}", acc["token"]),
    };
    transport.set_headers(vec![
        ("Authorization".into(), format!("Bearer {token}")),
        ("Content-Type".into(), "application/JSON".into()),
    ]);

    let rollover = year::rollover_date(&config.rollover_month_day)?;

    let mut yearid_stage = YearIdStage::new(&config.year_id_url, today, rollover);
    run_stage_with_status(&mut yearid_stage, transport, policy, &mut acc, &progress);
    let yearid = match acc["yearid"].as_i64() {
        Some(id) => id,
        None => {
            let id = year::fallback_year_id(today, rollover);
            log::warn!("year query failed, using locally derived yearid {id}");
            id
        }
    };
    transport.set_retry_payload(Some(json!({ "yearid": yearid })));

    let mut count_stage = CountStage::new(entities.clone());
    run_stage_with_status(&mut count_stage, transport, policy, &mut acc, &progress);

    let mut data_stage = DataStage::new(
        entities.clone(),
        config.clone(),
        output_dir.to_path_buf(),
        progress.clone(),
        count_stage.payloads,
    );
    run_stage_with_status(&mut data_stage, transport, policy, &mut acc, &progress);

    // Promote every entity's temp file, recording the size transition.
    for entity in &entities {
        let short = short_name(entity);
        let (original, new) = review_temporary_file(short, output_dir);
        merge_value(
            &mut acc,
            json!({ short: { "file_sizes": { "original": original, "new": new } } }),
        );
    }

    log::info!(
        "final pull results: {}",
        serde_json::to_string_pretty(&acc).unwrap_or_default()
    );
    log::info!("pull finished in {:.2?}", started.elapsed());
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        serde_json::from_str(
            r#"{
            "hostname": "sis.district.example.org",
            "clientId": "abc",
            "clientSecret": "s3cret",
            "tokenUrl": "/oauth/access_token",
            "yearIdUrl": "/y",
            "headerDict": {},
            "fileList": ["org.district.pulls.students", "org.district.pulls.staff"],
            "byYearList": ["org.district.pulls.grades"],
            "attendanceList": ["org.district.pulls.attendance"]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn default_selection_is_everything_but_excluded() {
        let options = PullOptions {
            exclude: vec!["staff".into()],
            ..PullOptions::default()
        };
        assert_eq!(
            select_entities(&config(), &options),
            vec!["org.district.pulls.students", "org.district.pulls.grades"]
        );
    }

    #[test]
    fn standard_pull_leaves_attendance_alone() {
        let selected = select_entities(&config(), &PullOptions::default());
        assert_eq!(
            selected,
            vec![
                "org.district.pulls.students",
                "org.district.pulls.staff",
                "org.district.pulls.grades",
            ]
        );
    }

    #[test]
    fn attendance_flag_restricts_to_attendance_catalog() {
        let options = PullOptions {
            attendance: true,
            ..PullOptions::default()
        };
        assert_eq!(
            select_entities(&config(), &options),
            vec!["org.district.pulls.attendance"]
        );
    }

    #[test]
    fn single_matches_by_short_name() {
        let options = PullOptions {
            single: Some("grades".into()),
            ..PullOptions::default()
        };
        assert_eq!(
            select_entities(&config(), &options),
            vec!["org.district.pulls.grades"]
        );
    }

    #[test]
    fn single_with_unknown_name_selects_nothing() {
        let options = PullOptions {
            single: Some("unknown".into()),
            ..PullOptions::default()
        };
        assert!(select_entities(&config(), &options).is_empty());
    }
}
