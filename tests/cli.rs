use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn help_shows_usage() {
    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Discrete-event P2P proof-of-work network simulator",
        ));
}

#[test]
fn rejects_invalid_population() {
    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.args(["--n", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid parameter"));
}

#[test]
fn rejects_adversary_flags_without_mode() {
    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.args(["--adv-power", "0.4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--adversary"));
}

#[test]
fn honest_run_writes_the_artifact_set() {
    let temp = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.args([
        "--n", "6", "--ttx", "2", "--block-interval", "2", "--time", "30", "--seed", "7",
    ])
    .arg("--out-dir")
    .arg(temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("simulated 6 participants"));

    let plots = temp.path().join("plots_6_0.5_0.5_2_2_30");
    let trees = temp.path().join("trees_6_0.5_0.5_2_2_30");
    assert!(plots.is_dir(), "missing {plots:?}");
    assert!(trees.is_dir(), "missing {trees:?}");
    assert_eq!(std::fs::read_dir(&plots).unwrap().count(), 6);
    assert_eq!(std::fs::read_dir(&trees).unwrap().count(), 6);
    assert!(temp.path().join("MPU.txt").exists());
    assert!(temp.path().join("summary.json").exists());
}

#[test]
fn selfish_run_names_its_directories_after_the_mode() {
    let temp = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.args([
        "--n",
        "6",
        "--ttx",
        "inf",
        "--block-interval",
        "1",
        "--time",
        "30",
        "--seed",
        "11",
        "--adversary",
        "selfish",
        "--adv-power",
        "0.3",
        "--adv-conn",
        "100",
    ])
    .arg("--out-dir")
    .arg(temp.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("adversary (selfish)"));

    let plots = temp.path().join("plots_6_0.5_inf_1_30_0.3_100_selfish");
    assert!(plots.is_dir(), "missing {plots:?}");
    // five honest trees plus the adversary's own
    assert_eq!(std::fs::read_dir(&plots).unwrap().count(), 6);
}

#[test]
fn same_seed_reproduces_the_summary() {
    let run = |dir: &std::path::Path| {
        let mut cmd = Command::cargo_bin("coinsim").unwrap();
        cmd.args([
            "--n", "5", "--ttx", "3", "--block-interval", "2", "--time", "20", "--seed", "99",
        ])
        .arg("--out-dir")
        .arg(dir)
        .assert()
        .success();
        let raw = std::fs::read_to_string(dir.join("summary.json")).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        json.as_object_mut().unwrap().remove("generated_at");
        json
    };
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    assert_eq!(run(a.path()), run(b.path()));
}

#[test]
fn config_file_feeds_the_run() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("run.toml");
    std::fs::write(
        &config_path,
        "population = 5\ntx_interarrival = 3.0\nblock_interval = 2.0\nduration = 20.0\nseed = 3\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("coinsim").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--out-dir")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("simulated 5 participants"));
}
