#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::io::Read;

use flate2::read::GzDecoder;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::smap_cmd;

fn manifest_json(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("stdout should be the manifest JSON")
}

#[test]
fn generate_writes_single_sitemap_from_url_list() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let list = dir.path().join("urls.txt");
    fs::write(
        &list,
        "https://example.com/\t2024-01-15\tdaily\t1.0\nhttps://example.com/about\n",
    )?;
    let out = dir.path().join("public");

    smap_cmd()
        .args(["generate", "--format", "text", "--out"])
        .arg(&out)
        .arg("--urls")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 file"))
        .stdout(predicate::str::contains("sitemap.xml"));

    let xml = fs::read_to_string(out.join("sitemap.xml"))?;
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<loc>https://example.com/about</loc>"));
    assert!(xml.contains("<changefreq>daily</changefreq>"));
    assert!(!out.join("sitemap-index.xml").exists());
    Ok(())
}

#[test]
fn generate_json_manifest_reports_discarded_entries() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let list = dir.path().join("urls.txt");
    fs::write(
        &list,
        "https://example.com/\nftp://example.com/file\nhttps://example.com/b\n",
    )?;

    let output = smap_cmd()
        .args(["generate", "--format", "json", "--out"])
        .arg(dir.path().join("out"))
        .arg("--urls")
        .arg(&list)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let manifest = manifest_json(&output);
    assert_eq!(manifest["schemaVersion"], "1.0.0");
    assert_eq!(manifest["entryCount"], 2);
    assert_eq!(manifest["discardedCount"], 1);
    assert_eq!(manifest["files"], serde_json::json!(["sitemap.xml"]));
    assert_eq!(manifest["warnings"][0]["url"], "ftp://example.com/file");
    assert_eq!(
        manifest["warnings"][0]["kinds"],
        serde_json::json!(["unsupported_scheme"])
    );
    Ok(())
}

#[test]
fn generate_gzip_writes_compressed_files() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let list = dir.path().join("urls.txt");
    fs::write(&list, "https://example.com/gz\n")?;
    let out = dir.path().join("out");

    smap_cmd()
        .args(["generate", "--gzip", "--format", "json", "--out"])
        .arg(&out)
        .arg("--urls")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("sitemap.xml.gz"));

    let mut xml = String::new();
    GzDecoder::new(fs::File::open(out.join("sitemap.xml.gz"))?).read_to_string(&mut xml)?;
    assert!(xml.contains("<loc>https://example.com/gz</loc>"));
    Ok(())
}

#[test]
fn generate_splits_into_shards_with_index() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let list = dir.path().join("urls.txt");
    let urls: String = (0..5).map(|i| format!("https://example.com/{i}\n")).collect();
    fs::write(&list, urls)?;
    let config = dir.path().join("custom.toml");
    fs::write(
        &config,
        "[site]\nbase_url = \"https://example.com/\"\n\n[output]\nmax_entries = 2\n",
    )?;
    let out = dir.path().join("out");

    let output = smap_cmd()
        .args(["generate", "--format", "json", "--out"])
        .arg(&out)
        .arg("--urls")
        .arg(&list)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let manifest = manifest_json(&output);
    assert_eq!(manifest["shardCount"], 3);
    assert_eq!(manifest["indexFile"], "sitemap-index.xml");
    let index = fs::read_to_string(out.join("sitemap-index.xml"))?;
    assert!(index.contains("<loc>https://example.com/sitemap-3.xml</loc>"));
    Ok(())
}

#[test]
fn generate_picks_up_local_config_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("urls.txt"), "https://example.com/\n")?;
    fs::write(
        dir.path().join("smap.toml"),
        "[output]\nfile_stem = \"pages\"\n",
    )?;

    smap_cmd()
        .current_dir(dir.path())
        .args([
            "generate", "--format", "json", "--out", "out", "--urls", "urls.txt",
        ])
        .assert()
        .success();

    assert!(dir.path().join("out/pages.xml").exists());
    Ok(())
}

#[test]
fn generate_without_sources_is_a_usage_error() {
    let dir = tempdir().unwrap();
    smap_cmd()
        .args(["generate", "--out"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no sources"));
}

#[test]
fn generate_with_invalid_config_is_a_usage_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("urls.txt"), "https://example.com/\n")?;
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[output]\nmax_entries = 50001\n")?;

    smap_cmd()
        .current_dir(dir.path())
        .args(["generate", "--out", "out", "--urls", "urls.txt", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("max_entries"));
    Ok(())
}

#[test]
fn generate_with_invalid_defaults_is_a_usage_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("urls.txt"), "https://example.com/\n")?;
    fs::write(
        dir.path().join("smap.toml"),
        "[defaults]\nlast_modified = \"2099-01-01\"\n",
    )?;

    smap_cmd()
        .current_dir(dir.path())
        .args(["generate", "--out", "out", "--urls", "urls.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid default metadata"));

    assert!(!dir.path().join("out/sitemap.xml").exists());
    Ok(())
}

#[test]
fn generate_with_only_invalid_entries_exits_3() -> anyhow::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("urls.txt"), "ftp://example.com/\nnot a url\n")?;

    smap_cmd()
        .current_dir(dir.path())
        .args([
            "generate", "--format", "json", "--out", "out", "--urls", "urls.txt",
        ])
        .assert()
        .code(3);

    assert!(!dir.path().join("out/sitemap.xml").exists());
    Ok(())
}

#[test]
fn generate_with_missing_url_list_exits_4() {
    let dir = tempdir().unwrap();
    smap_cmd()
        .current_dir(dir.path())
        .args(["generate", "--out", "out", "--urls", "missing.txt"])
        .assert()
        .code(4);
}

#[tokio::test]
async fn generate_crawls_a_site() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<a href="/docs">Docs</a> <a href="/private/x">Hidden</a> <a href="https://elsewhere.test/">Out</a>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>docs</p>", "text/html"))
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let out = dir.path().join("out");
    let seed = format!("{}/", server.uri());

    let output = smap_cmd()
        .args(["generate", "--format", "json", "--out"])
        .arg(&out)
        .args(["--crawl", &seed, "--concurrency", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let manifest = manifest_json(&output);
    assert_eq!(manifest["entryCount"], 2);
    let xml = fs::read_to_string(out.join("sitemap.xml"))?;
    assert!(xml.contains(&format!("<loc>{}/docs</loc>", server.uri())));
    assert!(!xml.contains("/private"));
    assert!(!xml.contains("elsewhere.test"));
    Ok(())
}
