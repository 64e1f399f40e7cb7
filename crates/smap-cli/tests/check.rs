#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

use predicates::prelude::*;
use serde_json::Value;

mod common;
use common::smap_cmd;

#[test]
fn check_prints_canonical_form() {
    smap_cmd()
        .args(["check", "--format", "text", "http://Example.com:80/a?b=1#frag"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "http://Example.com:80/a?b=1#frag -> http://example.com/a?b=1",
        ));
}

#[test]
fn check_out_of_range_priority_exits_3() {
    smap_cmd()
        .args([
            "check",
            "--format",
            "text",
            "https://example.com/",
            "--priority",
            "1.5",
        ])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("priority 1.5 is outside 0.0..=1.0"))
        .stderr(predicate::str::contains("1 of 1 URLs failed validation"));
}

#[test]
fn check_json_lists_each_input() -> anyhow::Result<()> {
    let output = smap_cmd()
        .args([
            "check",
            "--format",
            "json",
            "https://example.com/ok",
            "mailto:someone@example.com",
        ])
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();

    let reports: Value = serde_json::from_slice(&output)?;
    assert_eq!(reports[0]["valid"], true);
    assert_eq!(reports[0]["canonical"], "https://example.com/ok");
    assert_eq!(reports[1]["valid"], false);
    assert_eq!(reports[1]["errors"][0]["kind"], "unsupported_scheme");
    Ok(())
}

#[test]
fn check_requires_a_url() {
    smap_cmd().arg("check").assert().code(2);
}
