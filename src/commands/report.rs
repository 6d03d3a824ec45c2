use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tracing::{error, info, warn};

use crate::cli::ReportArgs;
use crate::clients::http_client;
use crate::clients::openai::ChatCompletionsClient;
use crate::clients::slack::SlackWebhook;
use crate::commands::resolve_db_path;
use crate::config::{Credentials, ReportConfig};
use crate::error::CycleError;
use crate::model::{ReportRunManifest, SourceKind};
use crate::pipeline::lenient::parse_date;
use crate::pipeline::normalize::ResultsOutcome;
use crate::pipeline::{CycleInputs, PreparedCycle, ReportPipeline};
use crate::store::Store;
use crate::store::load::{load_baselines, load_cards, load_raw_lines, load_styles, load_weekly};
use crate::store::runs::record_run;
use crate::util::{now_utc_string, sha256_text, utc_compact_string, write_json_pretty};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: ReportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let manifest_path = args
        .cache_root
        .join("manifests")
        .join(format!("report_run_{}.json", utc_compact_string(started_ts)));
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());

    let config = build_config(&args)?;
    let today = resolve_today(args.today.as_deref())?;
    let credentials = if args.dry_run {
        None
    } else {
        Some(Credentials::resolve(
            args.openai_api_key.as_deref(),
            args.slack_webhook_url.as_deref(),
            args.openai_endpoint.as_deref(),
        )?)
    };
    let pipeline = ReportPipeline::new(config)?;

    info!(
        run_id = %run_id,
        db = %db_path.display(),
        today = %today,
        dry_run = args.dry_run,
        "starting report cycle"
    );

    let store = Store::open(&db_path)?;
    let inputs = load_inputs(&store, pipeline.config())?;
    let prepared = pipeline.prepare(&inputs, today)?;

    let mut manifest = initial_manifest(&run_id, started_ts, &prepared, &pipeline, args.dry_run);
    persist_manifest(&store, &manifest_path, &manifest)?;

    let Some(credentials) = credentials else {
        print_dry_run(&prepared)?;
        manifest.status = "dry_run".to_string();
        manifest.updated_at = now_utc_string();
        persist_manifest(&store, &manifest_path, &manifest)?;
        info!(run_id = %run_id, manifest = %manifest_path.display(), "dry run complete");
        return Ok(());
    };

    let client = http_client()?;
    let generator =
        ChatCompletionsClient::new(client.clone(), &credentials.endpoint, &credentials.api_key);
    let sink = SlackWebhook::new(client, &credentials.webhook_url);

    match pipeline.run(prepared, &generator, &sink) {
        Ok(outcome) => {
            let report = &outcome.normalized.report;
            manifest.status = "delivered".to_string();
            manifest.results_synthesized = report.results == ResultsOutcome::Synthesized;
            manifest.ambiguous_line_count = report.ambiguous_lines;
            manifest.updated_at = now_utc_string();
            persist_manifest(&store, &manifest_path, &manifest)?;
            if report.results == ResultsOutcome::Missing {
                warn!("delivered report has no results section");
            }
            info!(
                run_id = %run_id,
                title = %outcome.prepared.title,
                manifest = %manifest_path.display(),
                "report cycle complete"
            );
            Ok(())
        }
        Err(err) => {
            manifest.status = "failed".to_string();
            manifest.failure_reason = Some(format!("{err:#}"));
            manifest.updated_at = now_utc_string();
            if let Err(persist_err) = persist_manifest(&store, &manifest_path, &manifest) {
                error!(error = %persist_err, "failed to record failed run");
            }
            Err(err)
        }
    }
}

/// Defaults, then the optional JSON file, then explicit flags.
pub fn build_config(args: &ReportArgs) -> Result<ReportConfig> {
    let mut config = match &args.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::default(),
    };

    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    if let Some(weeks) = args.lookback_weeks {
        config.lookback_weeks = weeks;
    }
    if let Some(cards) = args.cards_per_campaign {
        config.cards_per_campaign = cards;
    }
    if let Some(exemplars) = args.style_exemplars {
        config.style_exemplars = exemplars;
    }
    if let Some(channel) = &args.force_channel {
        config.force_channel = Some(channel.clone());
    }
    if let Some(brand) = &args.force_brand {
        config.force_brand = Some(brand.clone());
    }
    if args.no_synthesize_results {
        config.synthesize_missing_results = false;
    }

    config.validate()?;
    Ok(config)
}

fn resolve_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(raw) => parse_date(raw).ok_or_else(|| {
            CycleError::InvalidConfiguration(format!("--today is not a date: {raw}")).into()
        }),
        None => Ok(Utc::now().date_naive()),
    }
}

fn load_inputs(store: &Store, config: &ReportConfig) -> Result<CycleInputs> {
    let connection = store.connection();
    Ok(CycleInputs {
        weekly: load_weekly(connection)?,
        raw_lines: load_raw_lines(connection, config.raw_scan_rows)?,
        baselines: load_baselines(connection)?,
        doc_cards: load_cards(connection, SourceKind::Doc)?,
        report_cards: load_cards(connection, SourceKind::Report)?,
        styles: load_styles(connection)?,
    })
}

fn initial_manifest(
    run_id: &str,
    started_ts: DateTime<Utc>,
    prepared: &PreparedCycle,
    pipeline: &ReportPipeline,
    dry_run: bool,
) -> ReportRunManifest {
    let started_at = started_ts.to_rfc3339_opts(SecondsFormat::Secs, true);
    ReportRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.to_string(),
        status: "prepared".to_string(),
        started_at: started_at.clone(),
        updated_at: started_at,
        dry_run,
        title: prepared.title.clone(),
        model: pipeline.config().model.clone(),
        period_starts: prepared
            .window
            .starts
            .iter()
            .map(ToString::to_string)
            .collect(),
        campaign_count: prepared.campaigns.len(),
        issue_count: prepared.issue_count(),
        knowledge_card_count: prepared.knowledge_card_count(),
        allow_list_size: prepared.allow_list.len(),
        prompt_sha256: sha256_text(&format!(
            "{}\n{}",
            prepared.request.system, prepared.request.user
        )),
        results_synthesized: false,
        ambiguous_line_count: 0,
        failure_reason: None,
    }
}

fn persist_manifest(store: &Store, path: &Path, manifest: &ReportRunManifest) -> Result<()> {
    write_json_pretty(path, manifest)?;
    record_run(store.connection(), manifest)
}

fn print_dry_run(prepared: &PreparedCycle) -> Result<()> {
    let rendered = format!(
        "# {}\n\n## system\n{}\n\n## user\n{}\n\n## results\n{}\n",
        prepared.title,
        prepared.request.system,
        prepared.request.user,
        prepared.results.text()
    );
    std::io::stdout()
        .lock()
        .write_all(rendered.as_bytes())
        .context("failed to write dry run output")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::store::import::import_csv;
    use crate::store::runs::latest_run;
    use crate::store::SheetTable;

    const WEEKLY_CSV: &str = "\
WeekStart,WeekEnd,Campaign,Impressions,Clicks,CV,Cost,CTR,CVR,CPC,CPA
2025-09-01,2025-09-07,Brand-A,20000,800,10,100000,4.00%,5.00%,125,10000
2025-09-08,2025-09-14,Brand-A,20000,800,8,120000,4.00%,5.00%,150,15000
";

    const GENERATED: &str = "✅ 進捗\n・CVは堅調\n⚠️ 課題\nCPA が上昇\n💨 ネクストアクション\n- 入札を調整\n📈 結果\n・全体 : CPA¥1";

    fn args(cache_root: PathBuf) -> ReportArgs {
        ReportArgs {
            cache_root,
            db_path: None,
            config: None,
            model: None,
            temperature: None,
            max_tokens: None,
            lookback_weeks: None,
            cards_per_campaign: None,
            style_exemplars: None,
            force_channel: None,
            force_brand: None,
            no_synthesize_results: false,
            today: Some("2025-09-16".to_string()),
            openai_api_key: None,
            openai_endpoint: None,
            slack_webhook_url: None,
            dry_run: true,
        }
    }

    fn seeded_cache() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        let mut store = Store::open(&resolve_db_path(dir.path(), None)).expect("store");
        import_csv(
            store.connection_mut(),
            SheetTable::WeeklyAgg,
            WEEKLY_CSV.as_bytes(),
            false,
        )
        .expect("import");
        dir
    }

    fn latest_status(dir: &TempDir) -> (String, Option<String>) {
        let store = Store::open(&resolve_db_path(dir.path(), None)).expect("store");
        let run = latest_run(store.connection())
            .expect("query")
            .expect("recorded run");
        (run.status, run.failure_reason)
    }

    fn manifest_files(dir: &TempDir) -> Vec<PathBuf> {
        fs::read_dir(dir.path().join("manifests"))
            .expect("manifest dir")
            .map(|entry| entry.expect("entry").path())
            .collect()
    }

    #[test]
    fn flags_override_file_values() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("report.json");
        fs::write(&config_path, r#"{"model": "file-model", "lookback_weeks": 6}"#).expect("write");

        let mut args = args(dir.path().to_path_buf());
        args.config = Some(config_path);
        args.model = Some("flag-model".to_string());
        args.no_synthesize_results = true;

        let config = build_config(&args).expect("config");
        assert_eq!(config.model, "flag-model");
        assert_eq!(config.lookback_weeks, 6);
        assert!(!config.synthesize_missing_results);
    }

    #[test]
    fn invalid_flag_values_are_configuration_errors() {
        let dir = TempDir::new().expect("tempdir");
        let mut args = args(dir.path().to_path_buf());
        args.lookback_weeks = Some(0);
        let error = build_config(&args).expect_err("zero weeks");
        assert!(matches!(
            error.downcast_ref::<CycleError>(),
            Some(CycleError::InvalidConfiguration(_))
        ));

        let error = resolve_today(Some("someday")).expect_err("bad date");
        assert!(matches!(
            error.downcast_ref::<CycleError>(),
            Some(CycleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn dry_run_records_manifest_without_credentials() {
        let dir = seeded_cache();
        run(args(dir.path().to_path_buf())).expect("dry run");

        let (status, failure) = latest_status(&dir);
        assert_eq!(status, "dry_run");
        assert_eq!(failure, None);

        let files = manifest_files(&dir);
        assert_eq!(files.len(), 1);
        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(&files[0]).expect("read")).expect("json");
        assert_eq!(manifest["title"], "週次広告レポート 2025.09.08（月） ~ 09.14（日）");
        assert_eq!(manifest["campaign_count"], 1);
        assert_eq!(manifest["dry_run"], true);
    }

    #[test]
    fn full_cycle_generates_once_and_delivers_guarded_results() {
        let dir = seeded_cache();
        let server = MockServer::start();
        let completion = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": GENERATED } }]
            }));
        });
        let delivery = server.mock(|when, then| {
            when.method(POST)
                .path("/hooks/weekly")
                .body_contains("CPA¥15,000、CV8、Cost¥120,000");
            then.status(200).body("ok");
        });

        let mut args = args(dir.path().to_path_buf());
        args.dry_run = false;
        args.openai_api_key = Some("sk-test".to_string());
        args.openai_endpoint = Some(server.url("/v1/chat/completions"));
        args.slack_webhook_url = Some(server.url("/hooks/weekly"));
        run(args).expect("cycle");

        completion.assert_hits(1);
        delivery.assert_hits(1);
        assert_eq!(latest_status(&dir).0, "delivered");
    }

    #[test]
    fn generator_failure_is_recorded_and_nothing_is_delivered() {
        let dir = seeded_cache();
        let server = MockServer::start();
        let completion = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503).body("overloaded");
        });
        let delivery = server.mock(|when, then| {
            when.method(POST).path("/hooks/weekly");
            then.status(200);
        });

        let mut args = args(dir.path().to_path_buf());
        args.dry_run = false;
        args.openai_api_key = Some("sk-test".to_string());
        args.openai_endpoint = Some(server.url("/v1/chat/completions"));
        args.slack_webhook_url = Some(server.url("/hooks/weekly"));
        let error = run(args).expect_err("generation failed");

        assert!(format!("{error:#}").contains("overloaded"));
        completion.assert_hits(1);
        delivery.assert_hits(0);
        let (status, failure) = latest_status(&dir);
        assert_eq!(status, "failed");
        assert!(failure.expect("reason").contains("nothing was delivered"));
    }
}
