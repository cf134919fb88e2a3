use assert_cmd::Command;
use predicates::prelude::*;

fn neuroclean() -> Command {
    Command::cargo_bin("neuroclean").unwrap()
}

fn generate(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("sample.mat");
    Command::cargo_bin("generate_sample")
        .unwrap()
        .args(["--seconds", "8", "--rate", "128", "--compress", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("15 channels"));
    path
}

#[test]
fn no_args_shows_usage() {
    neuroclean()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_subcommands() {
    neuroclean()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn process_then_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate(dir.path());
    let out = dir.path().join("out");
    neuroclean()
        .arg("process")
        .arg(&input)
        .args(["--no-figures", "--cutoff", "1.0", "--channels", "Fp1", "O1", "--output-dir"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("14 channels at 128 Hz"))
        .stdout(predicate::str::contains("corrected_eeg.fif"));
    assert!(!out.join("noisy.png").exists());

    neuroclean()
        .arg("inspect")
        .arg(out.join("corrected_eeg.fif"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Fp1, Fp2"))
        .stdout(predicate::str::contains("sampling rate: 128 Hz"))
        .stdout(predicate::str::contains("samples: 1024"));
}

#[test]
fn unknown_channel_fails_with_name() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate(dir.path());
    neuroclean()
        .arg("process")
        .arg(&input)
        .args(["--no-figures", "--channels", "Fp3", "--output-dir"])
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown channel `Fp3`"));
    assert!(!dir.path().join("out").join("corrected_eeg.fif").exists());
}

#[test]
fn config_file_switches_precision() {
    let dir = tempfile::tempdir().unwrap();
    let input = generate(dir.path());
    let config = dir.path().join("pipeline.json");
    std::fs::write(
        &config,
        r#"{ "export": { "format": "double", "file_name": "clean.fif" }, "view": { "rasterize": false } }"#,
    )
    .unwrap();
    neuroclean()
        .arg("process")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("clean.fif"));
    assert!(dir.path().join("clean.fif").exists());
}

#[test]
fn inspect_rejects_non_fiff_input() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.fif");
    std::fs::write(&bogus, [0u8; 32]).unwrap();
    neuroclean()
        .arg("inspect")
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIFF"));
}
