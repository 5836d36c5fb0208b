//! Cassette replay integration tests: zero network I/O.
//!
//! All tests set `TATTTY_REPLAY` to a hand-written cassette so that the
//! binary never contacts a live API endpoint. Keys are set only to get past
//! the credential checks; replaying adapters ignore them.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd(dir: &Path, cassette: &Path) -> Command {
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[paths]\nsettings = \"{}\"\nlogs = \"{}\"\nanswers = \"{}\"\n",
            dir.join("settings.json").display(),
            dir.join("logs.json").display(),
            dir.join("answers.json").display(),
        ),
    )
    .unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tattty");
    cmd.env("TATTTY_CONFIG", &config)
        .env("TATTTY_REPLAY", cassette)
        .env_remove("TATTTY_REC")
        .env("OPENAI_API_KEY", "sk-replay")
        .env("REPLICATE_API_TOKEN", "r8-replay");
    cmd
}

fn write_cassette(dir: &Path, name: &str, interactions: &str) -> PathBuf {
    let path = dir.join(format!("{name}.cassette.yaml"));
    let body = format!(
        "name: {name}\nrecorded_at: \"2026-02-01T00:00:00Z\"\ncommit: test\n\
         interactions:\n{interactions}"
    );
    std::fs::write(&path, body).unwrap();
    path
}

const PROMPT_OK: &str = "  - seq: 0
    port: chat_completer
    method: complete
    input: {}
    output:
      Ok:
        content: A koi fish rising through storm waves, watercolor, teal and indigo
";

/// 1×1 transparent PNG.
const PNG_DATA_URL: &str = "data:image/png;base64,\
    iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJ\
    AAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[test]
fn generate_prints_prompt_and_urls() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(
        dir.path(),
        "generate",
        &format!(
            "{PROMPT_OK}  - seq: 1
    port: image_generator
    method: run
    input: {{}}
    output:
      Ok:
        Many:
          - Url: https://replicate.delivery/koi-1.webp
          - File:
              url: https://replicate.delivery/koi-2.webp
"
        ),
    );

    cmd(dir.path(), &cassette)
        .args(["generate", "--q1", "I crashed my car", "--q2", "I am fearless", "-s", "styles-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://replicate.delivery/koi-1.webp"))
        .stdout(predicate::str::contains("https://replicate.delivery/koi-2.webp"))
        .stderr(predicate::str::contains("Prompt: A koi fish rising"))
        .stderr(predicate::str::contains("Selections: Style 3"));

    cmd(dir.path(), &cassette)
        .arg("logs")
        .assert()
        .success()
        .stdout(predicate::str::contains("replicate").and(predicate::str::contains("baddie")));
}

#[test]
fn generate_saves_inline_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(
        dir.path(),
        "save",
        &format!(
            "{PROMPT_OK}  - seq: 1
    port: image_generator
    method: run
    input: {{}}
    output:
      Ok:
        Single:
          Url: \"{PNG_DATA_URL}\"
"
        ),
    );
    let out = dir.path().join("out");

    cmd(dir.path(), &cassette)
        .args(["generate", "--q1", "a storm", "--q2", "calm", "-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Saved:"));

    let files: Vec<_> = std::fs::read_dir(&out).unwrap().flatten().collect();
    assert_eq!(files.len(), 1, "Exactly one file should be created");
    let name = files[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("a-koi-fish-rising"), "unexpected filename: {name}");
    let data = std::fs::read(files[0].path()).unwrap();
    assert_eq!(&data[..4], &[0x89, 0x50, 0x4E, 0x47]);
}

#[test]
fn replayed_rate_limit_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(
        dir.path(),
        "ratelimit",
        &format!(
            "{PROMPT_OK}  - seq: 1
    port: image_generator
    method: run
    input: {{}}
    output:
      Err:
        status: 429
        message: Too Many Requests
"
        ),
    );

    cmd(dir.path(), &cassette)
        .args(["generate", "--q1", "a storm", "--q2", "calm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("🚨 RATE LIMIT EXCEEDED! Try again later."));
}

#[test]
fn prompt_only_uses_one_interaction() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(dir.path(), "prompt", PROMPT_OK);

    cmd(dir.path(), &cassette)
        .args(["prompt", "--q1", "a storm", "--q2", "calm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A koi fish rising through storm waves"));
}

#[test]
fn exhausted_cassette_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(dir.path(), "short", PROMPT_OK);

    cmd(dir.path(), &cassette)
        .args(["generate", "--q1", "a storm", "--q2", "calm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn replayed_search_lists_results() {
    let dir = tempfile::tempdir().unwrap();
    let cassette = write_cassette(
        dir.path(),
        "search",
        "  - seq: 0
    port: search_index
    method: search
    input: {}
    output:
      Ok:
        - id: koi.webp
          content:
            text: a koi
          metadata:
            url: https://blob.example/koi-sleeve.webp
",
    );

    cmd(dir.path(), &cassette)
        .args(["search", "koi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("koi sleeve\thttps://blob.example/koi-sleeve.webp"));
}
