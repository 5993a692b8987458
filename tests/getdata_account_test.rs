use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

const PROPOSAL: &str = "KEY2016AB-001";

fn header_unit(cards: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for card in cards.iter().map(String::as_str).chain(["END"]) {
        let mut bytes = card.as_bytes().to_vec();
        bytes.resize(80, b' ');
        out.extend_from_slice(&bytes);
    }
    let padded = out.len().div_ceil(2880) * 2880;
    out.resize(padded, b' ');
    out
}

fn write_frame(dir: &Path, name: &str, group: &str, exposure: &str, instrument: &str) {
    let bytes = header_unit(&[
        format!("{:<8}= T", "SIMPLE"),
        format!("{:<8}= 8", "BITPIX"),
        format!("{:<8}= 0", "NAXIS"),
        format!("{:<8}= '{group}'", "GROUPID"),
        format!("{:<8}= {exposure}", "EXPTIME"),
        format!("{:<8}= '{instrument}'", "INSTRUME"),
    ]);
    fs::create_dir_all(dir).expect("mkdir staging");
    fs::write(dir.join(name), bytes).expect("write frame");
}

struct Fixture {
    tmp: TempDir,
    home: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn new(config: &str) -> Self {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path().join("obscontrol");
        fs::create_dir_all(&home).expect("mkdir home");
        let config_path = tmp.path().join("getdata.toml");
        fs::write(&config_path, config).expect("write config");
        Self {
            tmp,
            home,
            config: config_path,
        }
    }

    fn staging(&self) -> PathBuf {
        self.home.join("frames").join(PROPOSAL)
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("getdata");
        cmd.current_dir(self.tmp.path())
            .env_clear()
            .env("HOME", self.tmp.path())
            .env("GETDATA_HOME", &self.home)
            .env("GETDATA_CONFIG_PATH", &self.config);
        cmd
    }
}

fn config_with_2m0() -> String {
    format!(
        r#"
[[proposals]]
id = "{PROPOSAL}"
allocation_1m0_hours = 3110
allocation_2m0_hours = 45.5
"#
    )
}

#[test]
fn account_bills_staged_frames_and_writes_summary() {
    let fx = Fixture::new(&config_with_2m0());
    let staging = fx.staging();
    write_frame(&staging, "a-e91.fits", "g1", "100", "fl03");
    write_frame(&staging, "b-e91.fits", "g2", "100", "fs02");
    write_frame(&staging, "c-e91.fits", "g1", "100", "fl03");
    write_frame(&staging, "x-e91.fits", "g3", "100", "zz09");

    fx.cmd()
        .arg("account")
        .assert()
        .success()
        .stdout(predicate::str::contains("accounted=3"))
        .stderr(predicate::str::contains("code=E003_UNKNOWN_INSTRUMENT"));

    let ledger =
        fs::read_to_string(fx.home.join(format!("timelogs/TimeLog_{PROPOSAL}.txt"))).expect("ledger");
    let entries: Vec<&str> = ledger
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    assert_eq!(
        entries,
        vec![
            "g1     a-e91.fits     1m0     230.0",
            "g1     c-e91.fits     1m0     140.0",
            "g2     b-e91.fits     2m0     364.5",
        ]
    );

    let html =
        fs::read_to_string(fx.home.join(format!("timelogs/Time_{PROPOSAL}.html"))).expect("html");
    assert_eq!(
        html,
        "<html><body><strong>1m0 Time Used/Allocated: 0.1 of 3110 hrs</strong><br>\
         <strong>2m0 Time Used/Allocated: 0.1 of 45.5 hrs</strong><br></body></html>"
    );

    assert!(fx.home.join("final/a-e91.fits").exists());
    assert!(fx.home.join("final/b-e91.fits").exists());
    assert!(staging.join("x-e91.fits").exists());
    assert!(!fx.home.join("logs/GetData.lock").exists());
}

#[test]
fn account_twice_adds_nothing_new() {
    let fx = Fixture::new(&config_with_2m0());
    write_frame(&fx.staging(), "a-e91.fits", "g1", "100", "fl03");
    fx.cmd().arg("account").assert().success();
    let ledger_path = fx.home.join(format!("timelogs/TimeLog_{PROPOSAL}.txt"));
    let first = fs::read_to_string(&ledger_path).expect("ledger");

    // Operator drops the same file back into staging.
    write_frame(&fx.staging(), "a-e91.fits", "g1", "100", "fl03");
    fx.cmd()
        .arg("account")
        .assert()
        .success()
        .stdout(predicate::str::contains("already_accounted=1"));
    assert_eq!(fs::read_to_string(&ledger_path).expect("ledger"), first);
}

#[test]
fn account_keeps_going_past_unreadable_frames() {
    let fx = Fixture::new(&config_with_2m0());
    let staging = fx.staging();
    fs::create_dir_all(&staging).expect("mkdir");
    fs::write(staging.join("broken-e91.fits"), b"not a header").expect("write");
    write_frame(&staging, "ok-e91.fits", "g1", "10", "kb71");

    fx.cmd()
        .arg("account")
        .assert()
        .success()
        .stdout(predicate::str::contains("metadata_unavailable=1"))
        .stderr(predicate::str::contains("code=E004_METADATA_UNAVAILABLE"));

    assert!(staging.join("broken-e91.fits").exists());
    assert!(fx.home.join("final/ok-e91.fits").exists());

    let logs: Vec<PathBuf> = fs::read_dir(fx.home.join("logs"))
        .expect("logs")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("DownloadLog_"))
        })
        .collect();
    assert_eq!(logs.len(), 1);
    let log = fs::read_to_string(&logs[0]).expect("log");
    assert!(log.contains("Unable to read header of frame broken-e91.fits"));
    assert!(log.contains("Time calculated for new frame ok-e91.fits."));
    assert!(log.contains(&format!("GetData completed for proposal {PROPOSAL}.")));
}

#[test]
fn frames_that_cannot_be_ledger_lines_are_never_billed() {
    let fx = Fixture::new(&config_with_2m0());
    let staging = fx.staging();
    write_frame(&staging, "my frame-e91.fits", "g1", "100", "fl03");
    write_frame(&staging, "hash-e91.fits", "#7", "100", "fl03");
    write_frame(&staging, "ok-e91.fits", "g1", "100", "fl03");

    for _ in 0..3 {
        fx.cmd()
            .arg("account")
            .assert()
            .failure()
            .stdout(predicate::str::contains("1 file names rejected"))
            .stdout(predicate::str::contains("metadata_unavailable=1"))
            .stderr(predicate::str::contains("corrupt").not());
    }

    let ledger =
        fs::read_to_string(fx.home.join(format!("timelogs/TimeLog_{PROPOSAL}.txt"))).expect("ledger");
    assert!(!ledger.contains("my frame"));
    assert!(!ledger.contains("hash-e91.fits"));
    assert_eq!(ledger.matches("ok-e91.fits").count(), 1);
    assert!(staging.join("my frame-e91.fits").exists());
    assert!(staging.join("hash-e91.fits").exists());
    assert!(!fx.home.join("logs/GetData.lock").exists());
}

#[test]
fn unknown_reduction_level_is_reported_and_skips_billing() {
    let fx = Fixture::new(&config_with_2m0());
    write_frame(&fx.staging(), "a-e91.fits", "g1", "100", "fl03");

    fx.cmd()
        .env("GETDATA_RLEVEL", "calibrated")
        .arg("account")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown reduction level"))
        .stderr(predicate::str::contains("code=E002_UNKNOWN_REDUCTION_LEVEL"));

    assert!(fx.staging().join("a-e91.fits").exists());
    assert!(
        fx.home
            .join(format!("timelogs/Time_{PROPOSAL}.html"))
            .exists()
    );
}

#[test]
fn summary_renders_existing_ledger_without_touching_it() {
    let fx = Fixture::new(&format!(
        "[[proposals]]\nid = \"{PROPOSAL}\"\nallocation_1m0_hours = 3110\n"
    ));
    let ledger_path = fx.home.join(format!("timelogs/TimeLog_{PROPOSAL}.txt"));
    fs::create_dir_all(ledger_path.parent().expect("parent")).expect("mkdir");
    let ledger = "# legacy\ng1     a.fits     3600.0\ng1     b.fits     1m0     3600.0\n";
    fs::write(&ledger_path, ledger).expect("write ledger");

    fx.cmd()
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("hours_1m0=2.0"));

    assert_eq!(fs::read_to_string(&ledger_path).expect("ledger"), ledger);
    assert_eq!(
        fs::read_to_string(fx.home.join(format!("timelogs/Time_{PROPOSAL}.html"))).expect("html"),
        "<html><body><strong>1m0 Time Used/Allocated: 2.0 of 3110 hrs</strong><br></body></html>"
    );
    assert!(!fx.home.join("logs/GetData.lock").exists());
}

#[test]
fn status_reports_usage_as_json() {
    let fx = Fixture::new(&config_with_2m0());
    write_frame(&fx.staging(), "a-e91.fits", "g1", "100", "fl03");
    fx.cmd().arg("account").assert().success();

    let out = fx
        .cmd()
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).expect("json");
    assert_eq!(report["command"], "status");
    assert_eq!(report["ok"], true);
    let details: Vec<String> = report["details"]
        .as_array()
        .expect("details")
        .iter()
        .filter_map(|d| d.as_str().map(str::to_string))
        .collect();
    assert!(details.iter().any(|d| d == "lock=free"));
    assert!(
        details
            .iter()
            .any(|d| d.starts_with(&format!("proposal.{PROPOSAL} entries=1 groups=1")))
    );
}

#[test]
fn corrupt_ledger_is_fatal() {
    let fx = Fixture::new(&config_with_2m0());
    let ledger_path = fx.home.join(format!("timelogs/TimeLog_{PROPOSAL}.txt"));
    fs::create_dir_all(ledger_path.parent().expect("parent")).expect("mkdir");
    fs::write(&ledger_path, "g1     a.fits     1m0     lots\n").expect("write");
    write_frame(&fx.staging(), "b-e91.fits", "g1", "100", "fl03");

    fx.cmd()
        .arg("account")
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt at line 1"))
        .stderr(predicate::str::contains("code=E006_LEDGER_CORRUPT"));
    assert!(fx.staging().join("b-e91.fits").exists());
}
