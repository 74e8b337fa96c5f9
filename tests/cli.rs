use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const RATE_CARD: &str = "EOM Processing Rubric\n\
                         Rates effective this month\n\
                         Processor,Discount Fees,Attempt Fees,CB Fee,Visa Alert Due\n\
                         acme,0.02,0.10,35,5\n\
                         nmi,0.5,0,0,0\n";

const EXPORT: &str = "Processor,Card Type,Merchant Group,Attempted Captured Charges,Processed,Chargebacks,Alerts\n\
                      ACME,Visa Credit,G1,100,\"$1,000.00\",1,2\n\
                      NMI,Amex,Corp B,0,4000,0,0\n\
                      ACME,Mastercard,Sale Shield,5,500,0,0\n\
                      Stripe US,Visa,G1,5,500,0,0\n";

struct Fixture {
    _tmp: tempfile::TempDir,
    dir: PathBuf,
    config: PathBuf,
}

fn fixture(export: &str) -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("data");
    std::fs::create_dir_all(&dir).expect("data dir");
    std::fs::write(dir.join("EOM-Rubric.csv"), RATE_CARD).expect("rate card");
    std::fs::write(dir.join("EOM_View_2025-01-31.csv"), export).expect("export");
    let config = tmp.path().join("settings.json");
    Fixture { _tmp: tmp, dir, config }
}

fn eomfees(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("eomfees").expect("binary");
    cmd.arg("--config").arg(config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn run_prints_summary() {
    let fx = fixture(EXPORT);
    eomfees(&fx.config)
        .args(["run", "--no-write", "--dir"])
        .arg(&fx.dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Total EOM fees by Processor:\n\
             ACME: $75.00\n\
             NMI: $2,000.00\n\
             Total: $2,075.00\n\
             ----------------------------------\n\
             Total EOM fees by Corp:\n\
             Corp B: $2,000.00\n\
             G1: $75.00\n\
             Total: $2,075.00\n",
        ))
        .stdout(predicate::str::contains("Stripe").not())
        .stdout(predicate::str::contains("Sale Shield").not());
}

#[test]
fn run_writes_report_directory() {
    let fx = fixture(EXPORT);
    let out = fx.dir.join("reports").join("january");
    eomfees(&fx.config)
        .args(["run", "--dir"])
        .arg(&fx.dir)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Report written to"));

    for name in [
        "detail.csv",
        "processor_totals.csv",
        "merchant_group_totals.csv",
        "summary.txt",
        "manifest.json",
    ] {
        assert!(out.join(name).exists(), "{name} missing");
    }
    let totals = std::fs::read_to_string(out.join("processor_totals.csv")).expect("totals");
    assert!(totals.lines().any(|l| l == "Total,2075"));
}

#[test]
fn run_json_output() {
    let fx = fixture(EXPORT);
    let output = eomfees(&fx.config)
        .args(["run", "--no-write", "--json", "--dir"])
        .arg(&fx.dir)
        .output()
        .expect("run");
    assert!(output.status.success());
    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(payload["grand_total"], 2075.0);
    assert!(payload["report_dir"].is_null());
    assert_eq!(payload["reconciliation"]["stats"]["input_rows"], 4);
    assert_eq!(payload["reconciliation"]["stats"]["retained_rows"], 2);
    assert_eq!(payload["reconciliation"]["detail"][0]["total_due"], 75.0);
}

#[test]
fn run_explicit_paths_skip_discovery() {
    let fx = fixture(EXPORT);
    let export = fx.dir.join("custom.csv");
    std::fs::write(&export, "Processor,Card Type,Merchant Group,Attempted Captured Charges,Processed,Chargebacks,Alerts\nnmi,Amex,Solo,0,10,0,0\n")
        .expect("export");
    eomfees(&fx.config)
        .args(["run", "--no-write", "--dir"])
        .arg(&fx.dir)
        .arg("--export")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("Solo: $5.00"));
}

#[cfg(feature = "xlsx")]
#[test]
fn run_workbook_export_matches_csv_export() {
    let fx = fixture(EXPORT);
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
    let reconcile = |export: &str| -> serde_json::Value {
        let output = eomfees(&fx.config)
            .args(["run", "--no-write", "--json", "--dir"])
            .arg(&fx.dir)
            .arg("--export")
            .arg(fixtures.join(export))
            .output()
            .expect("run");
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice(&output.stdout).expect("json")
    };

    let workbook = reconcile("EOM_View.xlsx");
    let csv = reconcile("EOM_View.csv");
    assert_eq!(workbook["reconciliation"], csv["reconciliation"]);
    assert_eq!(workbook["summary"], csv["summary"]);
    // 75 + 2000 + 125.25, the Mastercard row has no processed volume
    assert_eq!(workbook["grand_total"], 2200.25);
}

#[test]
fn run_reports_unknown_processor() {
    let fx = fixture(
        "Processor,Card Type,Merchant Group,Attempted Captured Charges,Processed,Chargebacks,Alerts\n\
         ACME,Visa Credit,G1,100,1000,1,2\n\
         unknownproc,Visa,G1,1,1,1,1\n",
    );
    eomfees(&fx.config)
        .args(["run", "--no-write", "--dir"])
        .arg(&fx.dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Excluded (no rate card entry):\nunknownproc: 1 row"))
        .stdout(predicate::str::contains("G1: $75.00"));
}

#[test]
fn run_aborts_on_unknown_processor_when_configured() {
    let fx = fixture(
        "Processor,Card Type,Merchant Group,Attempted Captured Charges,Processed,Chargebacks,Alerts\n\
         unknownproc,Visa,G1,1,1,1,1\n",
    );
    std::fs::write(&fx.config, r#"{"unknown_processor": "abort"}"#).expect("settings");
    let out = fx.dir.join("out");
    eomfees(&fx.config)
        .args(["run", "--dir"])
        .arg(&fx.dir)
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Unknown processor"))
        .stderr(predicate::str::contains("unknownproc"));
    assert!(!out.exists());
}

#[test]
fn run_rejects_channel_outside_allow_list() {
    let fx = fixture(EXPORT);
    std::fs::write(&fx.config, r#"{"allowed_channels": ["EOM [KT]"]}"#).expect("settings");
    eomfees(&fx.config)
        .args(["run", "--no-write", "--channel", "general", "--dir"])
        .arg(&fx.dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Channel not allowed: general"));
    eomfees(&fx.config)
        .args(["run", "--no-write", "--channel", "EOM [KT]", "--dir"])
        .arg(&fx.dir)
        .assert()
        .success();
}

#[test]
fn run_fails_without_export() {
    let fx = fixture(EXPORT);
    std::fs::remove_file(fx.dir.join("EOM_View_2025-01-31.csv")).expect("remove");
    eomfees(&fx.config)
        .args(["run", "--no-write", "--dir"])
        .arg(&fx.dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input found: no export"));
}

#[test]
fn run_fails_on_malformed_rate_card() {
    let fx = fixture(EXPORT);
    std::fs::write(
        fx.dir.join("EOM-Rubric.csv"),
        "Processor,Discount Fees,Attempt Fees,CB Fee,Visa Alert Due\nacme,abc,0.10,35,5\n",
    )
    .expect("rate card");
    eomfees(&fx.config)
        .args(["run", "--no-write", "--dir"])
        .arg(&fx.dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed rate card (row 2, column 'Discount Fees')"));
}

#[test]
fn rates_lists_entries_with_fallback() {
    let fx = fixture(EXPORT);
    eomfees(&fx.config)
        .args(["rates", "--dir"])
        .arg(&fx.dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("acme"))
        .stdout(predicate::str::contains("merchant industries (fallback)"))
        .stdout(predicate::str::contains("3 processor(s)"));
}

#[test]
fn status_shows_discovered_inputs() {
    let fx = fixture(EXPORT);
    eomfees(&fx.config)
        .args(["status", "--dir"])
        .arg(&fx.dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("(defaults)"))
        .stdout(predicate::str::contains("EOM-Rubric.csv"))
        .stdout(predicate::str::contains("EOM_View_2025-01-31.csv"));
}

#[test]
fn init_writes_settings() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = tmp.path().join("conf").join("settings.json");
    let data = tmp.path().join("eom-data");
    eomfees(&config)
        .arg("init")
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("Settings written to"));

    assert!(data.join("reports").is_dir());
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config).expect("settings")).expect("json");
    assert_eq!(saved["fallback_processor"], "merchant industries");
    assert_eq!(saved["export_patterns"], serde_json::json!(["EOM", "View"]));
}
