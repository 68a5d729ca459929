use std::io::Write;
use std::str::FromStr;

use anyhow::Result;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hub_client::{RegistryClient, RegistryClientBuilder};
use hub_distribution_filename::DistFilename;
use hub_normalize::PackageName;
use hub_pypi_types::{IndexUrl, IndexUrls};

const JSON: &str = "application/vnd.pypi.simple.v1+json";

fn client(server: &MockServer, extra: &[&MockServer]) -> Result<RegistryClient> {
    let index = IndexUrl::from_str(&format!("{}/simple", server.uri()))?;
    let extra = extra
        .iter()
        .map(|server| IndexUrl::from_str(&format!("{}/simple", server.uri())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RegistryClientBuilder::new()
        .index_urls(IndexUrls::new(index, extra))
        .retries(0)
        .user_agent("hub-tests")
        .build()?)
}

fn simple_json(server: &MockServer, files: &[(&str, bool)]) -> String {
    let files: Vec<serde_json::Value> = files
        .iter()
        .map(|(filename, core_metadata)| {
            serde_json::json!({
                "filename": filename,
                "url": format!("{}/files/{filename}", server.uri()),
                "hashes": {},
                "core-metadata": core_metadata,
            })
        })
        .collect();
    serde_json::json!({ "meta": {"api-version": "1.1"}, "files": files }).to_string()
}

/// Build a minimal wheel containing only its `METADATA`.
fn wheel_bytes(dist_info: &str, metadata: &str) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    writer.start_file("tqdm/__init__.py", options)?;
    writer.write_all(b"")?;
    writer.start_file(format!("{dist_info}/METADATA"), options)?;
    writer.write_all(metadata.as_bytes())?;
    Ok(writer.finish()?.into_inner())
}

#[tokio::test]
async fn simple_json_with_fallthrough() -> Result<()> {
    // The primary index doesn't know the package; the extra index does.
    let primary = MockServer::start().await;
    let extra = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .and(header("user-agent", "hub-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            simple_json(
                &extra,
                &[
                    ("tqdm-4.66.1-py3-none-any.whl", true),
                    ("tqdm-4.66.1.tar.gz", false),
                    ("tqdm-4.65.0.tar.gz", false),
                ],
            ),
            JSON,
        ))
        .mount(&extra)
        .await;

    let client = client(&primary, &[&extra])?;
    let (index, metadata) = client.simple(&PackageName::from_str("tqdm")?).await?;
    assert_eq!(index.to_string(), format!("{}/simple", extra.uri()));

    let versions: Vec<String> = metadata
        .iter()
        .map(|(version, files)| {
            format!(
                "{version}: {} wheel(s), {} sdist(s)",
                files.wheels.len(),
                files.source_dists.len()
            )
        })
        .collect();
    insta::assert_debug_snapshot!(versions, @r#"
    [
        "4.65.0: 0 wheel(s), 1 sdist(s)",
        "4.66.1: 1 wheel(s), 1 sdist(s)",
    ]
    "#);
    Ok(())
}

#[tokio::test]
async fn simple_html() -> Result<()> {
    let server = MockServer::start().await;
    let body = format!(
        r#"<html><body>
        <a href="{uri}/files/tqdm-4.66.1-py3-none-any.whl#sha256=d302b3c5b53d47bce91fea46679d9c3c6508cf6332229aa1e7d8653723793386" data-requires-python="&gt;=3.7">tqdm-4.66.1-py3-none-any.whl</a>
        <a href="../../files/tqdm-4.66.0.tar.gz" data-yanked="broken">tqdm-4.66.0.tar.gz</a>
        </body></html>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let (_, metadata) = client.simple(&PackageName::from_str("tqdm")?).await?;
    let files: Vec<(String, String, bool)> = metadata
        .into_iter()
        .flat_map(|(_, files)| files.all())
        .map(|(filename, file)| {
            (
                filename.to_string(),
                file.url.replace(&server.uri(), "[SERVER]"),
                file.is_yanked(),
            )
        })
        .collect();
    insta::assert_debug_snapshot!(files, @r#"
    [
        (
            "tqdm-4.66.0.tar.gz",
            "[SERVER]/files/tqdm-4.66.0.tar.gz",
            true,
        ),
        (
            "tqdm-4.66.1-py3-none-any.whl",
            "[SERVER]/files/tqdm-4.66.1-py3-none-any.whl",
            false,
        ),
    ]
    "#);
    Ok(())
}

#[tokio::test]
async fn package_not_found() -> Result<()> {
    let primary = MockServer::start().await;
    let extra = MockServer::start().await;

    let client = client(&primary, &[&extra])?;
    let err = client
        .simple(&PackageName::from_str("does-not-exist")?)
        .await
        .unwrap_err();
    assert!(err.is_package_not_found());
    insta::assert_snapshot!(err, @"Package `does-not-exist` was not found in the registry");
    Ok(())
}

#[tokio::test]
async fn server_error_is_not_a_miss() -> Result<()> {
    let primary = MockServer::start().await;
    let extra = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;

    let client = client(&primary, &[&extra])?;
    let err = client
        .simple(&PackageName::from_str("tqdm")?)
        .await
        .unwrap_err();
    assert!(!err.is_package_not_found());
    // The extra index is never consulted after a hard failure.
    assert!(extra.received_requests().await.unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn unsupported_media_type() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("tqdm", "text/plain"))
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let err = client
        .simple(&PackageName::from_str("tqdm")?)
        .await
        .unwrap_err();
    let message = err.to_string().replace(&server.uri(), "[SERVER]");
    insta::assert_snapshot!(message, @r#"Unsupported `Content-Type` "text/plain" for [SERVER]/simple/tqdm/. Expected JSON or HTML."#);
    Ok(())
}

#[tokio::test]
async fn metadata_from_pep658() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            simple_json(&server, &[("tqdm-4.66.1-py3-none-any.whl", true)]),
            JSON,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/tqdm-4.66.1-py3-none-any.whl.metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Metadata-Version: 2.1\nName: tqdm\nVersion: 4.66.1\nRequires-Dist: colorama; platform_system == \"Windows\"\n",
        ))
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let name = PackageName::from_str("tqdm")?;
    let (index, metadata) = client.simple(&name).await?;
    let (filename, file) = metadata
        .into_iter()
        .flat_map(|(_, files)| files.all())
        .next()
        .unwrap();
    let scratch = tempfile::tempdir()?;
    let metadata = client
        .metadata(&index, &filename, &file, scratch.path())
        .await?;
    assert_eq!(metadata.version.to_string(), "4.66.1");
    assert_eq!(
        metadata.requires_dist[0].to_string(),
        "colorama; platform_system == \"Windows\""
    );
    Ok(())
}

#[tokio::test]
async fn metadata_url_drops_hash_fragment() -> Result<()> {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "meta": {"api-version": "1.1"},
        "files": [{
            "filename": "tqdm-4.66.1-py3-none-any.whl",
            "url": format!("{}/files/tqdm-4.66.1-py3-none-any.whl#sha256=00ff", server.uri()),
            "hashes": {"sha256": "00ff"},
            "core-metadata": true,
        }],
    });
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), JSON))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/tqdm-4.66.1-py3-none-any.whl.metadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("Metadata-Version: 2.1\nName: tqdm\nVersion: 4.66.1\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let name = PackageName::from_str("tqdm")?;
    let (index, metadata) = client.simple(&name).await?;
    let (filename, file) = metadata
        .into_iter()
        .flat_map(|(_, files)| files.all())
        .next()
        .unwrap();
    let scratch = tempfile::tempdir()?;
    let metadata = client
        .metadata(&index, &filename, &file, scratch.path())
        .await?;
    assert_eq!(metadata.version.to_string(), "4.66.1");
    Ok(())
}

#[tokio::test]
async fn metadata_from_wheel_download() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            simple_json(&server, &[("tqdm-4.66.1-py3-none-any.whl", false)]),
            JSON,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/tqdm-4.66.1-py3-none-any.whl"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wheel_bytes(
            "tqdm-4.66.1.dist-info",
            "Metadata-Version: 2.1\nName: tqdm\nVersion: 4.66.1\nRequires-Python: >=3.7\n",
        )?))
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let name = PackageName::from_str("tqdm")?;
    let (index, metadata) = client.simple(&name).await?;
    let (filename, file) = metadata
        .into_iter()
        .flat_map(|(_, files)| files.all())
        .next()
        .unwrap();
    let scratch = tempfile::tempdir()?;
    let metadata = client
        .metadata(&index, &filename, &file, scratch.path())
        .await?;
    assert_eq!(metadata.name, name);
    assert_eq!(metadata.requires_python.unwrap().to_string(), ">=3.7");
    Ok(())
}

#[tokio::test]
async fn metadata_name_mismatch() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/tqdm/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            simple_json(&server, &[("tqdm-4.66.1-py3-none-any.whl", true)]),
            JSON,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/tqdm-4.66.1-py3-none-any.whl.metadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("Metadata-Version: 2.1\nName: not-tqdm\nVersion: 4.66.1\n"),
        )
        .mount(&server)
        .await;

    let client = client(&server, &[])?;
    let (index, metadata) = client.simple(&PackageName::from_str("tqdm")?).await?;
    let (filename, file) = metadata
        .into_iter()
        .flat_map(|(_, files)| files.all())
        .next()
        .unwrap();
    let scratch = tempfile::tempdir()?;
    let err = client
        .metadata(&index, &filename, &file, scratch.path())
        .await
        .unwrap_err();
    insta::assert_snapshot!(err, @"Package metadata name `not-tqdm` does not match given name `tqdm`");
    Ok(())
}

#[tokio::test]
async fn sdist_metadata_unavailable() -> Result<()> {
    let server = MockServer::start().await;
    let client = client(&server, &[])?;
    let index = IndexUrl::from_str(&format!("{}/simple", server.uri()))?;
    let name = PackageName::from_str("tqdm")?;
    let filename = DistFilename::try_from_filename("tqdm-4.66.1.tar.gz", &name).unwrap();
    let file: hub_pypi_types::File = serde_json::from_value(serde_json::json!({
        "filename": "tqdm-4.66.1.tar.gz",
        "url": format!("{}/files/tqdm-4.66.1.tar.gz", server.uri()),
    }))?;

    let scratch = tempfile::tempdir()?;
    let err = client
        .metadata(&index, &filename, &file, scratch.path())
        .await
        .unwrap_err();
    assert!(err.is_metadata_unavailable());
    // Nothing was downloaded.
    assert!(server.received_requests().await.unwrap().is_empty());
    Ok(())
}
