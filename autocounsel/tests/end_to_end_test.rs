use autocounsel::config::{OutputOptions, PortalConfig, Timeouts};
use autocounsel::{load_records, BatchRunner, DriverCall, OutcomeStatus, ScriptedDriver};
use chrono::{Local, TimeZone};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

const CSV: &str = "\
학번,이름,상담일자,상담시간_시,상담시간_분,상담분야,상담구분,제목,상담내용,진로상태,전문상담의뢰,비공개설정
20230001,김하나,2024-03-02,14,30,진로,개인상담,첫 상담,진로 방향 논의,관심,N,
20230002,이둘,2024-03-03,9.0,0,학습,,,,,,
20230003,박셋,2024-03-04,,,,집단상담,,학습 계획 점검,중점,Y,Y
";

#[tokio::test]
async fn test_three_records_with_one_missing_content() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("records.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    file.write_all("\u{feff}".as_bytes()).unwrap();
    file.write_all(CSV.as_bytes()).unwrap();
    drop(file);

    let rows = load_records(&csv_path).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[1].record.is_err());

    let config = PortalConfig {
        timeouts: Timeouts::fast(),
        output: OutputOptions {
            report_dir: dir.path().to_path_buf(),
            snapshot_dir: dir.path().to_path_buf(),
        },
        ..PortalConfig::default()
    };
    let driver = Arc::new(ScriptedDriver::new(&config.selectors));
    let mut runner = BatchRunner::new(driver.clone(), config).with_progress(false);
    runner.run(&rows).await.unwrap();

    let outcomes = runner.outcomes();
    let summary = outcomes.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errored, 0);

    let rendered = outcomes.render_summary();
    info!("\n{rendered}");
    assert!(rendered.contains("Success: 2 (66.7%)"), "{rendered}");
    assert!(rendered.contains("Failed:  1 (33.3%)"), "{rendered}");
    assert!(rendered.contains("✗ [2] 이둘(20230002)"), "{rendered}");
    assert!(rendered.contains("상담내용"), "{rendered}");

    // the invalid row never reached the portal
    assert_eq!(
        driver.count(|c| matches!(c, DriverCall::Fill { text, .. } if text == "20230002")),
        0
    );
    // group counseling and referral went in as codes, privacy was ticked once
    assert!(driver
        .calls()
        .iter()
        .any(|c| matches!(c, DriverCall::Click { selector } if selector.to_string().contains("CnPer") && selector.to_string().contains("'2'"))));
    assert_eq!(
        driver.count(|c| matches!(c, DriverCall::Click { selector } if selector.to_string().contains("checkbox"))),
        1
    );

    let now = Local.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap();
    let report = outcomes.write_report(dir.path(), now).unwrap();
    assert!(report.ends_with("autocounsel_report_20240305_180000.csv"));

    let mut reader = csv::Reader::from_path(&report).unwrap();
    let statuses: Vec<String> = reader
        .records()
        .map(|r| r.unwrap().get(3).unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["SUCCESS", "FAILED", "SUCCESS"]);
    assert!(OutcomeStatus::Failed.to_string() == statuses[1]);
}
