//! Download cache behaviour across fetches, reopenings and real HTTP.

mod common;

use common::{MemoryDownloader, Project};
use osm_server_setup::fetch::{Downloader, HttpDownloader};
use osm_server_setup::{Config, Error, Fetcher, Resource};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const URL: &str = "http://mirror.example/extracts/liechtenstein.osm.bz2";
/// md5("hello")
const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
/// md5("world")
const WORLD_MD5: &str = "7d793037a0760186574b0282f2f435e7";

#[test]
fn test_second_fetch_does_no_network_work() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");
    let resource = Resource::new(URL).checksum(HELLO_MD5);

    let mut fetcher = project.fetcher(&downloader);
    fetcher.fetch(&resource).unwrap();
    fetcher.fetch(&resource).unwrap();
    assert_eq!(downloader.requests(URL), 1);

    let entry = fetcher.entry(URL).unwrap();
    assert!(entry.downloaded);
    assert_eq!(entry.checksum.as_deref(), Some(HELLO_MD5));
}

#[test]
fn test_cache_survives_a_new_run() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");
    let resource = Resource::new(URL);

    {
        let mut fetcher = project.fetcher(&downloader);
        fetcher.fetch(&resource).unwrap();
    }
    let mut fetcher = project.fetcher(&downloader);
    fetcher.fetch(&resource).unwrap();
    assert_eq!(downloader.requests(URL), 1);
}

#[test]
fn test_checksum_mismatch_leaves_nothing_behind() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"tampered");
    let resource = Resource::new(URL).checksum(HELLO_MD5);

    let mut fetcher = project.fetcher(&downloader);
    let err = fetcher.fetch(&resource).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::ChecksumMismatch { .. })
    ));
    assert!(!fetcher.locate(&resource).exists());
    assert!(fetcher.entry(URL).is_none());
}

#[test]
fn test_changed_checksum_downloads_again() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");

    let mut fetcher = project.fetcher(&downloader);
    fetcher.fetch(&Resource::new(URL).checksum(HELLO_MD5)).unwrap();

    downloader.serve(URL, b"world");
    let updated = Resource::new(URL).checksum(WORLD_MD5);
    fetcher.fetch(&updated).unwrap();

    assert_eq!(downloader.requests(URL), 2);
    assert_eq!(std::fs::read(fetcher.locate(&updated)).unwrap(), b"world");
    assert_eq!(fetcher.entry(URL).unwrap().checksum.as_deref(), Some(WORLD_MD5));
}

#[test]
fn test_stale_scratch_from_interrupted_run_is_cleared() {
    let project = Project::new(Config::default());
    let scratch = project.env.cache_dir().join("temp");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("liechtenstein.osm.bz2"), b"half a down").unwrap();
    std::fs::write(scratch.join("unrelated.part"), b"junk").unwrap();

    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");
    let resource = Resource::new(URL).checksum(HELLO_MD5);
    let mut fetcher = project.fetcher(&downloader);
    fetcher.fetch(&resource).unwrap();

    assert_eq!(downloader.requests(URL), 1);
    assert_eq!(std::fs::read(fetcher.locate(&resource)).unwrap(), b"hello");
    assert!(!scratch.exists());
}

#[test]
fn test_cached_file_without_record_is_not_downloaded() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");
    let resource = Resource::new(URL);

    let mut fetcher = project.fetcher(&downloader);
    std::fs::write(fetcher.locate(&resource), b"copied by hand").unwrap();
    fetcher.fetch(&resource).unwrap();

    assert_eq!(downloader.requests(URL), 0);
    assert_eq!(std::fs::read(fetcher.locate(&resource)).unwrap(), b"copied by hand");
}

#[test]
fn test_deleted_metadata_does_not_trigger_download() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    downloader.serve(URL, b"hello");
    let resource = Resource::new(URL);

    {
        let mut fetcher = project.fetcher(&downloader);
        fetcher.fetch(&resource).unwrap();
    }
    std::fs::remove_file(project.env.cache_dir().join("meta.json")).unwrap();

    let mut fetcher = project.fetcher(&downloader);
    assert!(fetcher.entry(URL).is_none());
    fetcher.fetch(&resource).unwrap();
    assert_eq!(downloader.requests(URL), 1);
}

#[test]
fn test_url_without_file_name_is_rejected() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    let mut fetcher = project.fetcher(&downloader);

    for url in ["http://mirror.example/extracts/", "http://mirror.example/..", "http://mirror.example/."] {
        let err = fetcher.fetch(&Resource::new(url)).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<Error>(), Some(Error::NoFileName { .. })),
            "{}: {:#}",
            url,
            err
        );
        assert_eq!(downloader.requests(url), 0);
    }
}

#[test]
fn test_extracts_once_relative_to_project() {
    let project = Project::new(Config::default());
    let archive = {
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        ));
        let body = b"var OpenLayers = {};";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "OpenLayers-2.10/OpenLayers.js", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    };
    let url = "http://openlayers.example/OpenLayers-2.10.tar.gz";
    let downloader = MemoryDownloader::default();
    downloader.serve(url, &archive);
    let resource = Resource::new(url).extract_to("htdocs");

    let mut fetcher = project.fetcher(&downloader);
    fetcher.fetch(&resource).unwrap();
    let js = project.env.project_path("htdocs/OpenLayers-2.10/OpenLayers.js");
    assert!(js.is_file());
    assert!(fetcher.entry(url).unwrap().extracted);

    std::fs::remove_file(&js).unwrap();
    fetcher.fetch(&resource).unwrap();
    assert!(!js.exists(), "extraction must not repeat");
}

#[test]
fn test_only_one_fetcher_per_cache() {
    let project = Project::new(Config::default());
    let downloader = MemoryDownloader::default();
    let _first = project.fetcher(&downloader);
    let second = Fetcher::with_downloader(
        &project.env.project_dir,
        &project.env.cache_dir(),
        Box::new(downloader.clone()),
    );
    assert!(second.unwrap_err().to_string().contains("locked"));
}

#[tokio::test]
async fn test_http_download_streams_to_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/osm/europe/liechtenstein.osm.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("liechtenstein.osm.bz2");
    let url = format!("{}/osm/europe/liechtenstein.osm.bz2", server.uri());
    let written = HttpDownloader::new(Duration::from_secs(5))
        .download(&url, &dest)
        .unwrap();

    assert_eq!(written, 5);
    assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
}

#[tokio::test]
async fn test_http_error_status_fails_the_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("data").join("download_cache");
    let mut fetcher = Fetcher::with_downloader(
        dir.path(),
        &cache,
        Box::new(HttpDownloader::new(Duration::from_secs(5))),
    )
    .unwrap();
    let resource = Resource::new(format!("{}/missing.zip", server.uri()));

    assert!(fetcher.fetch(&resource).is_err());
    assert!(!fetcher.locate(&resource).exists());
    assert!(fetcher.entry(&resource.url).is_none());

    // scratch files never leak into the cache
    let leftovers: Vec<String> = std::fs::read_dir(&cache)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n != "meta.lock" && n != "meta.json")
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}
