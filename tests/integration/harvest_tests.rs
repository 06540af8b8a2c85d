//! End-to-end pipeline tests over a mock catalog site

use modharvest::config::{
    Config, FetchConfig, HarvestConfig, OutputConfig, SessionConfig, ShardFormat,
};
use modharvest::crawler::{run_harvest, FetchRequest, FetchService, HttpFetchService};
use modharvest::import::{Importer, ImportOptions};
use modharvest::model::{AggregatedRecord, DownloadEntry};
use modharvest::output::merge_partitions;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str, output_dir: &str, page_range: Option<&str>) -> Config {
    Config {
        harvest: HarvestConfig {
            base_url: base_url.to_string(),
            catalog_ids: vec![182],
            catalog_range: None,
            page_range: page_range.map(|s| s.to_string()),
            max_concurrent_fetches: 4,
        },
        fetch: FetchConfig {
            timeout_secs: 5,
            retry_max: 2,
            retry_delay_ms: 0,
            delay_ms: 0,
        },
        session: SessionConfig::default(),
        output: OutputConfig {
            directory: output_dir.to_string(),
            format: ShardFormat::Jsonl,
            prefix: "catalog".to_string(),
        },
    }
}

async fn mount_html(server: &MockServer, url_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts a two-page catalog with two resources:
/// - resource 101 (page 1): two branches, structured downloads
/// - resource 202 (page 2): no identifiers, degraded path
async fn mount_catalog(server: &MockServer) {
    let page1 = r#"<html><body>
        <h1>NBA 2K25 资源</h1>
        <div class="modlist"><ul>
            <li><div class="modpic"><img data-original="/pic/101.jpg/fw_285"></div>
                <a href="/down/view/101">Mod 101</a></li>
        </ul></div>
        <a href="/down/list/182/2">2</a>
        </body></html>"#;
    mount_html(server, "/down/list/182", page1).await;

    let page2 = r#"<html><body>
        <div class="modlist"><ul>
            <li><a href="/down/view/202">Mod 202</a></li>
        </ul></div>
        </body></html>"#;
    mount_html(server, "/down/list/182/2", page2).await;

    let detail_101 = r#"<html><body>
        <h1 id="title">Author / Great Court Pack</h1>
        <div class="uploadinfo"><ul>
            <li><p class="custom-tt">资源创建时间</p><span title="2024-03-01 10:00">3 天前</span></li>
            <li><p class="custom-tt">资源作者</p><a href="/space/12">ShaoMods</a></li>
        </ul></div>
        <div id="imglist"><img data-original="/pic/shot.jpg/fh_140"></div>
        <div class="view-message"><p>The best courts.</p></div>
        <script>var _data = {"mid": "101", "vid": "7", "formhash": "98e0550f"};</script>
        </body></html>"#;
    mount_html(server, "/down/view/101", detail_101).await;

    let detail_202 = r#"<html><body>
        <h1 id="title">Orphan Roster</h1>
        <div class="view-message"><a href="https://pan.baidu.com/s/abc">百度网盘</a></div>
        </body></html>"#;
    mount_html(server, "/down/view/202", detail_202).await;

    let branches = r#"<root><![CDATA[
        <div class="verlist">
            <h4><a href="/down/view/101/7">现役 <em>默认分支</em></a></h4>
        </div>
        <div class="verlist">
            <h4><a href="/down/view/101/8">复古</a></h4>
        </div>
    ]]></root>"#;
    Mock::given(method("GET"))
        .and(path("/down.php"))
        .and(query_param("mid", "101"))
        .and(query_param("show", "toversion"))
        .respond_with(ResponseTemplate::new(200).set_body_string(branches))
        .mount(server)
        .await;

    let downloads_7 = r#"<root><![CDATA[
        <div class="veritem-name"><span>V1.1</span></div>
        <div class="veritem-download-item">
            <em class="bupload">&nbsp;court_pack.iff</em>
            <span>13.5 MB</span>
            <a onclick="showprotocol('/down.php?mod=buy&fileid=8841')">下载</a>
        </div>
    ]]></root>"#;
    Mock::given(method("GET"))
        .and(path("/down.php"))
        .and(query_param("vid", "7"))
        .and(query_param("show", "todownload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(downloads_7))
        .mount(server)
        .await;

    let downloads_8 = r#"<root><![CDATA[<div>当前分支版本暂无文件</div>]]></root>"#;
    Mock::given(method("GET"))
        .and(path("/down.php"))
        .and(query_param("vid", "8"))
        .and(query_param("show", "todownload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(downloads_8))
        .mount(server)
        .await;
}

fn read_partition(dir: &std::path::Path) -> (std::path::PathBuf, Vec<AggregatedRecord>) {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(paths.len(), 1, "expected one partition file");
    let path = paths.remove(0);

    let records = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (path, records)
}

#[tokio::test]
async fn test_full_pipeline_crawl_merge_import() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let workdir = TempDir::new().unwrap();
    let shard_dir = workdir.path().join("shards");

    let config = test_config(
        &server.uri(),
        &shard_dir.to_string_lossy(),
        Some("1-2"),
    );

    // --- Crawl ---
    let (report, summaries) = run_harvest(config).await.unwrap();
    assert_eq!(report.emitted, 2);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.abandoned, 0);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].records, 2);

    let (partition, records) = read_partition(&shard_dir);
    assert!(
        partition.to_string_lossy().contains("_p1-2_"),
        "page-ranged runs carry the partition segment"
    );

    let full = records
        .iter()
        .find(|r| r.resource_id == Some(101))
        .expect("structured resource present");
    assert_eq!(full.catalog_name, "NBA 2K25");
    assert_eq!(full.title, "Author / Great Court Pack");
    assert_eq!(full.branches.len(), 2);
    assert_eq!(
        full.metadata.get("created_at").map(String::as_str),
        Some("2024-03-01 10:00")
    );

    let default_branch = full.branches.iter().find(|b| b.is_default).unwrap();
    assert_eq!(
        default_branch.downloads,
        vec![DownloadEntry::Internal {
            file_id: 8841,
            filename: "court_pack.iff".to_string(),
            size: Some("13.5 MB".to_string()),
        }]
    );

    let other_branch = full.branches.iter().find(|b| !b.is_default).unwrap();
    assert!(matches!(
        other_branch.downloads[0],
        DownloadEntry::Empty { .. }
    ));

    let degraded = records
        .iter()
        .find(|r| r.resource_id.is_none())
        .expect("degraded resource present");
    assert_eq!(degraded.title, "Orphan Roster");
    assert_eq!(degraded.branches.len(), 1);

    // --- Merge (self-merge is identity for the keyed record) ---
    let merged = workdir.path().join("merged.jsonl");
    let merge_report =
        merge_partitions(&[partition.clone(), partition.clone()], &merged).unwrap();
    assert_eq!(merge_report.duplicates, 1, "resource 101 deduplicated");
    // The degraded record has no key and passes through both times
    assert_eq!(merge_report.written, 3);

    // --- Import (twice; second run must be a pure refresh) ---
    let db_path = workdir.path().join("harvest.db");
    let options = ImportOptions {
        cleanup: false,
        ..Default::default()
    };

    for _ in 0..2 {
        let import_report = modharvest::import::run_import(
            &db_path,
            &merged.to_string_lossy(),
            &options,
        )
        .unwrap();
        assert_eq!(import_report.imported, 1);
        assert_eq!(import_report.skipped, 2);
    }

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let counts: Vec<(&str, i64)> = ["catalogs", "resources", "branches", "downloads", "images"]
        .iter()
        .map(|table| {
            let count = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap();
            (*table, count)
        })
        .collect();

    assert_eq!(
        counts,
        vec![
            ("catalogs", 1),
            ("resources", 1),
            ("branches", 2),
            ("downloads", 2), // one internal + one empty marker
            ("images", 1),
        ]
    );
}

#[tokio::test]
async fn test_fetch_service_retries_transient_status() {
    let server = MockServer::start().await;

    // First hit fails with a retryable status, second succeeds
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let service = HttpFetchService::new(
        FetchConfig {
            timeout_secs: 5,
            retry_max: 2,
            retry_delay_ms: 0,
            delay_ms: 0,
        },
        base,
        &SessionConfig::default(),
    );

    let response = service
        .fetch(FetchRequest::page(format!("{}/flaky", server.uri()), 182))
        .await
        .unwrap();
    assert_eq!(response.body, "recovered");
}

#[tokio::test]
async fn test_fetch_service_gives_up_on_permanent_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let service = HttpFetchService::new(
        FetchConfig {
            timeout_secs: 5,
            retry_max: 3,
            retry_delay_ms: 0,
            delay_ms: 0,
        },
        base,
        &SessionConfig::default(),
    );

    let error = service
        .fetch(FetchRequest::page(format!("{}/gone", server.uri()), 182))
        .await
        .unwrap_err();

    // 404 is not transient: exactly one attempt
    match error {
        modharvest::crawler::FetchError::Status { status, attempts, .. } => {
            assert_eq!(status, 404);
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_sessions_are_isolated_per_catalog() {
    let server = MockServer::start().await;
    mount_html(&server, "/ok", "fine").await;

    let base = Url::parse(&server.uri()).unwrap();
    let service = HttpFetchService::new(
        FetchConfig {
            timeout_secs: 5,
            retry_max: 0,
            retry_delay_ms: 0,
            delay_ms: 0,
        },
        base,
        &SessionConfig::default(),
    );

    // Two session keys both work; each gets its own cookie-jar client
    for key in [182, 172] {
        let response = service
            .fetch(FetchRequest::page(format!("{}/ok", server.uri()), key))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
}

fn plain_record(resource_id: u64, title: &str) -> AggregatedRecord {
    AggregatedRecord {
        resource_id: Some(resource_id),
        catalog_id: 182,
        catalog_name: "NBA 2K25".to_string(),
        title: title.to_string(),
        cover_image: None,
        images: vec![],
        intro_html: String::new(),
        metadata: Default::default(),
        branches: vec![modharvest::model::VersionBranch::synthetic_default(Some(1))],
        detail_url: format!("https://x/d/{}", resource_id),
        list_url: "https://x/l/182".to_string(),
    }
}

#[tokio::test]
async fn test_import_full_replace_drops_stale_rows() {
    let workdir = TempDir::new().unwrap();

    let db_path = workdir.path().join("harvest.db");
    {
        let mut importer = Importer::open(&db_path).unwrap();
        importer
            .import_records(&[plain_record(900, "Stale")], 200)
            .unwrap();
    }

    // Second run in full-replace mode with a different record set
    let replacement = workdir.path().join("replacement.jsonl");
    let fresh = plain_record(901, "Fresh");
    std::fs::write(&replacement, serde_json::to_string(&fresh).unwrap() + "\n").unwrap();

    let options = ImportOptions {
        full_replace: true,
        cleanup: false,
        ..Default::default()
    };
    modharvest::import::run_import(&db_path, &replacement.to_string_lossy(), &options).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let titles: Vec<String> = conn
        .prepare("SELECT title FROM resources")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(titles, vec!["Fresh"], "stale rows removed by full replace");
}
