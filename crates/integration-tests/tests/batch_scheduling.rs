//! Bounded-concurrency batches against real child processes

mod common;

use calib_core::application::{shutdown_channel, BoundedScheduler, JobRunner};
use calib_core::domain::FailureKind;
use calib_core::port::SystemTimeProvider;
use calib_core::SchedulerConfig;
use calib_infra_system::SubprocessLauncher;
use common::{calibrator, service, tool_spec, write_tool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Tool that records how many siblings were alive when it started
fn counting_tool(dir: &Path) -> std::path::PathBuf {
    let live = dir.join("live");
    std::fs::create_dir_all(&live).unwrap();
    write_tool(
        dir,
        "count.sh",
        &format!(
            r#"live="{live}"
touch "$live/$input"
ls "$live" | wc -l >> "{log}"
sleep 0.3
rm -f "$live/$input"
echo "value $input" | sed 's/job//' > "$report""#,
            live = live.display(),
            log = dir.join("observed.log").display()
        ),
    )
}

/// Test 1: five jobs, cap two; never more than two alive
#[tokio::test]
async fn test_concurrency_cap_respected() {
    let dir = tempfile::tempdir().unwrap();
    let exe = counting_tool(dir.path());
    let spec = tool_spec("count", &exe, &[(1, 1, "n")]);
    let calibrators = (1..=5)
        .map(|i| calibrator(&spec, dir.path(), &format!("job{}", i)))
        .collect();

    let batch = service(2, 20).calibrate_batch(calibrators, None).await.unwrap();

    assert!(batch.report.all_succeeded());
    let observed: Vec<usize> = std::fs::read_to_string(dir.path().join("observed.log"))
        .unwrap()
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect();
    assert_eq!(observed.len(), 5);
    assert!(observed.iter().all(|&n| (1..=2).contains(&n)), "{:?}", observed);

    // outcomes follow submission order
    let values: Vec<f64> = batch.results.iter().map(|r| r.get("n").unwrap()).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

/// Test 2: one failing job never disturbs its siblings
#[tokio::test]
async fn test_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let exe = write_tool(
        dir.path(),
        "mixed.sh",
        r#"case "$input" in
  bad-exit) exit 2 ;;
  no-report) exit 0 ;;
  garbage) echo "gain not-a-number" > "$report" ;;
  *) echo "gain 1.5" > "$report" ;;
esac"#,
    );
    let spec = tool_spec("mixed", &exe, &[(1, 1, "gain")]);
    let labels = ["ok-1", "bad-exit", "no-report", "garbage", "ok-2"];
    let calibrators = labels
        .iter()
        .map(|l| calibrator(&spec, dir.path(), l))
        .collect();

    let batch = service(3, 10).calibrate_batch(calibrators, None).await.unwrap();
    let report = &batch.report;

    assert_eq!(report.len(), 5);
    assert!(!report.all_succeeded());
    let by_label = |label: &str| {
        report
            .outcomes()
            .iter()
            .find(|o| o.label == label)
            .unwrap()
            .clone()
    };
    assert!(by_label("ok-1").succeeded);
    assert!(by_label("ok-2").succeeded);
    assert_eq!(
        by_label("bad-exit").failure,
        Some(FailureKind::ExitFailure { code: Some(2) })
    );
    assert!(matches!(
        by_label("no-report").failure,
        Some(FailureKind::ArtifactMissing { .. })
    ));
    assert!(matches!(
        by_label("garbage").failure,
        Some(FailureKind::MalformedOutput { .. })
    ));
    assert_eq!(batch.results.len(), 2);
}

/// Test 3: an unlaunchable job is recorded and the rest still run
#[tokio::test]
async fn test_launch_failure_in_batch() {
    let dir = tempfile::tempdir().unwrap();
    let exe = write_tool(dir.path(), "good.sh", r#"echo "gain 2.0" > "$report""#);
    let good = tool_spec("good", &exe, &[(1, 1, "gain")]);
    let missing = tool_spec("missing", &dir.path().join("absent"), &[(1, 1, "gain")]);

    let batch = service(1, 10)
        .calibrate_batch(
            vec![
                calibrator(&missing, dir.path(), "first"),
                calibrator(&good, dir.path(), "second"),
            ],
            None,
        )
        .await
        .unwrap();

    let outcomes = batch.report.outcomes();
    assert!(matches!(
        outcomes[0].failure,
        Some(FailureKind::LaunchFailure { .. })
    ));
    assert_eq!(outcomes[0].exit_code, None);
    assert!(outcomes[1].succeeded);
}

/// Test 4: interrupt stops launching; the running job finishes normally
#[tokio::test]
async fn test_interrupt_mid_batch() {
    let dir = tempfile::tempdir().unwrap();
    let exe = write_tool(dir.path(), "slow.sh", r#"sleep 0.6; echo "gain 3.0" > "$report""#);
    let spec = tool_spec("slow", &exe, &[(1, 1, "gain")]);
    let calibrators = ["a", "b", "c"]
        .iter()
        .map(|l| calibrator(&spec, dir.path(), l))
        .collect();

    let (tx, token) = shutdown_channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.shutdown();
    });

    let batch = service(1, 20)
        .calibrate_batch(calibrators, Some(token))
        .await
        .unwrap();
    let report = &batch.report;

    assert!(report.was_interrupted());
    assert_eq!(report.len(), 1);
    assert!(report.outcomes()[0].succeeded);
    let unlaunched: Vec<&str> = report
        .not_launched()
        .iter()
        .map(|j| j.label.as_str())
        .collect();
    assert_eq!(unlaunched, vec!["b", "c"]);
}

/// Test 5: interrupt before start launches nothing
#[tokio::test]
async fn test_interrupt_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let exe = write_tool(dir.path(), "never.sh", r#"touch "$out.ran""#);
    let spec = tool_spec("never", &exe, &[(1, 1, "gain")]);
    let cal = calibrator(&spec, dir.path(), "x");

    let (tx, token) = shutdown_channel();
    tx.shutdown();
    let batch = service(2, 10)
        .calibrate_batch(vec![cal], Some(token))
        .await
        .unwrap();

    assert!(batch.report.is_empty());
    assert_eq!(batch.report.not_launched().len(), 1);
    assert!(!dir.path().join("x_.ran").exists());
}

/// Test 6: a missing executable is reported before a long sibling finishes
#[tokio::test]
async fn test_missing_executable_reported_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let exe = write_tool(dir.path(), "long.sh", r#"sleep 0.6; echo "gain 1.0" > "$report""#);
    let long = tool_spec("long", &exe, &[(1, 1, "gain")]);
    let missing = tool_spec("missing", &dir.path().join("absent"), &[(1, 1, "gain")]);

    // interrupt while the long job still holds the only slot
    let (tx, token) = shutdown_channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.shutdown();
    });

    let batch = service(1, 20)
        .calibrate_batch(
            vec![
                calibrator(&long, dir.path(), "long"),
                calibrator(&missing, dir.path(), "absent"),
                calibrator(&long, dir.path(), "queued"),
            ],
            Some(token),
        )
        .await
        .unwrap();
    let report = &batch.report;

    assert!(report.was_interrupted());
    assert_eq!(report.len(), 2);
    assert!(report.outcomes()[0].succeeded);
    assert!(matches!(
        report.outcomes()[1].failure,
        Some(FailureKind::LaunchFailure { .. })
    ));
    let unlaunched: Vec<&str> = report
        .not_launched()
        .iter()
        .map(|j| j.label.as_str())
        .collect();
    assert_eq!(unlaunched, vec!["queued"]);
}

/// Test 7: an empty batch completes immediately
#[tokio::test]
async fn test_empty_batch() {
    let runner = Arc::new(JobRunner::new(
        Arc::new(SubprocessLauncher::new()),
        Arc::new(SystemTimeProvider),
    ));
    let scheduler = BoundedScheduler::new(runner, SchedulerConfig::default());

    let report = tokio::time::timeout(Duration::from_secs(1), scheduler.run_all(vec![], None))
        .await
        .unwrap()
        .unwrap();

    assert!(report.is_empty());
    assert!(report.all_succeeded());
}
