mod common;

use std::fs;
use std::sync::Arc;

use sectorsweep::evidence::DataSource;
use sectorsweep::expanded::ParseError;
use sectorsweep::pipeline::{PipelineError, PipelineState, ProcessResult, ToolPhase};
use sectorsweep::tool::ToolError;

use common::{Harness, ReadOnlyCase, ScriptedRunner, expanded_line, source_json};

const ALERT_TITLE: &str = "Error processing block hash blacklist module";

fn assert_single_alert(harness: &Harness) {
    let alerts = harness.alerts();
    assert_eq!(alerts.len(), 1, "alerts: {alerts:?}");
    assert_eq!(alerts[0].0, ALERT_TITLE);
}

#[test]
fn scanner_nonzero_exit_ends_the_run() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner {
        scan_result: Some(|| ToolError::NonZeroExit(2)),
        ..ScriptedRunner::default()
    });
    let pipeline = harness.pipeline(runner.clone());

    let err = pipeline
        .run(&DataSource::image(&harness.image_path))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Tool {
            phase: ToolPhase::Scan,
            source: ToolError::NonZeroExit(2)
        }
    ));
    assert_eq!(runner.calls().len(), 1);
    assert!(harness.messages().is_empty());
    assert_eq!(pipeline.last_state(), PipelineState::Errored);
}

#[test]
fn scanner_failure_alerts_once() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner {
        scan_result: Some(|| ToolError::NonZeroExit(1)),
        ..ScriptedRunner::default()
    });
    let pipeline = harness.pipeline(runner);

    let result = pipeline.process(&DataSource::image(&harness.image_path));

    assert_eq!(result, ProcessResult::Error);
    assert_single_alert(&harness);
    assert!(harness.case.reports().expect("reports").is_empty());
}

#[test]
fn scanner_launch_failure_is_reported() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner {
        scan_result: Some(|| ToolError::LaunchFailed {
            program: "bulk_extractor".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }),
        ..ScriptedRunner::default()
    });
    let pipeline = harness.pipeline(runner);

    match pipeline.run(&DataSource::image(&harness.image_path)) {
        Err(PipelineError::Tool { phase, source }) => {
            assert_eq!(phase, ToolPhase::Scan);
            assert!(source.is_launch_failure());
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn expander_failure_leaves_no_summary_or_launcher() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner {
        expand_result: Some(|| ToolError::NonZeroExit(1)),
        ..ScriptedRunner::with_matches(&[])
    });
    let pipeline = harness.pipeline(runner.clone());

    let result = pipeline.process(&DataSource::image(&harness.image_path));

    assert_eq!(result, ProcessResult::Error);
    assert_eq!(runner.calls().len(), 2);
    assert!(harness.messages().is_empty());
    assert_single_alert(&harness);
    let job_dir = &harness.job_dirs()[0];
    assert!(!job_dir.join("sectorscope_launcher.bat").exists());
}

#[test]
fn line_with_two_fields_is_a_parse_error() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner::with_matches(&[
        expanded_line(512, &[source_json(1, "a", None)]),
        "1024\t8ed9f0a1".to_string(),
    ]));
    let pipeline = harness.pipeline(runner);

    match pipeline.run(&DataSource::image(&harness.image_path)) {
        Err(PipelineError::Parse {
            line_number,
            line,
            source,
            ..
        }) => {
            assert_eq!(line_number, 2);
            assert_eq!(line, "1024\t8ed9f0a1");
            assert_eq!(source, ParseError::MalformedLine { fields: 2 });
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(harness.messages().is_empty());
}

#[test]
fn invalid_json_is_a_parse_error() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner::with_matches(&[
        "512\t8ed9f0a1\t[\"8ed9f0a1\",{\"sources\":[".to_string(),
    ]));
    let pipeline = harness.pipeline(runner);

    let err = pipeline
        .run(&DataSource::image(&harness.image_path))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Parse {
            line_number: 1,
            source: ParseError::MalformedJson(_),
            ..
        }
    ));
}

#[test]
fn missing_sources_key_is_a_parse_error() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner::with_matches(&[
        "512\t8ed9f0a1\t[\"8ed9f0a1\",{\"count\":1}]".to_string(),
    ]));
    let pipeline = harness.pipeline(runner);

    let result = pipeline.process(&DataSource::image(&harness.image_path));

    assert_eq!(result, ProcessResult::Error);
    assert_single_alert(&harness);
    assert!(harness.messages().is_empty());
}

#[test]
fn rejected_registration_fails_after_message_and_launcher() {
    let harness = Harness::new();
    let case_root = harness.temp_dir.path().join("readonly_case");
    let case = Arc::new(ReadOnlyCase {
        root: case_root.clone(),
    });
    let runner = Arc::new(ScriptedRunner::with_matches(&[expanded_line(
        512,
        &[source_json(1, "a", None)],
    )]));
    let pipeline = harness.pipeline_with(
        harness.loaded_config(),
        harness.host_with_case(case),
        runner,
    );

    let result = pipeline.process(&DataSource::image(&harness.image_path));

    assert_eq!(result, ProcessResult::Error);
    assert_eq!(harness.messages().len(), 1);
    assert_single_alert(&harness);

    let module_dir = case_root.join("ModuleOutput").join("Block Hash Blacklist");
    let job_dir = fs::read_dir(&module_dir)
        .expect("module dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .next()
        .expect("job dir");
    assert!(job_dir.join("sectorscope_launcher.bat").is_file());
}

#[test]
fn array_shaped_source_entry_fails_the_run() {
    let harness = Harness::new();
    let runner = Arc::new(ScriptedRunner::with_matches(&[
        expanded_line(512, &[source_json(1, "a", None)]),
        "1024\t8ed9f0a1\t[\"8ed9f0a1\",{\"sources\":[[1,\"r\",\"f\",800,\"ab\"]]}]".to_string(),
    ]));
    let pipeline = harness.pipeline(runner);

    let err = pipeline
        .run(&DataSource::image(&harness.image_path))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Parse {
            line_number: 2,
            source: ParseError::MalformedJson(_),
            ..
        }
    ));
    assert!(harness.messages().is_empty());
    assert_eq!(pipeline.last_state(), PipelineState::Errored);
}

#[test]
fn last_state_tracks_how_each_run_ended() {
    let harness = Harness::new();
    let failing = harness.pipeline(Arc::new(ScriptedRunner {
        scan_result: Some(|| ToolError::NonZeroExit(1)),
        ..ScriptedRunner::default()
    }));
    assert_eq!(failing.last_state(), PipelineState::Init);
    assert!(failing.run(&DataSource::image(&harness.image_path)).is_err());
    assert_eq!(failing.last_state(), PipelineState::Errored);

    let passing = harness.pipeline(Arc::new(ScriptedRunner::default()));
    passing
        .run(&DataSource::image(&harness.image_path))
        .expect("run");
    assert_eq!(passing.last_state(), PipelineState::Done);
}
