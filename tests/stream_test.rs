//! Integration tests for HLS manifests, segments and direct streaming.

mod common;

use common::TestHarness;
use vf_core::QueueName;

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nsegment_000.ts\n#EXTINF:4.2,\nsegment_001.ts\n#EXT-X-ENDLIST\n";

#[tokio::test]
async fn packaged_manifest_points_at_segment_route() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Packaged", Some("videos/packaged.mp4"));
    h.write_media(&format!("hls/{}/720p/playlist.m3u8", video.id), PLAYLIST.as_bytes());

    let resp = reqwest::get(format!("http://{addr}/api/video/{}/720p/index.m3u8", video.id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/vnd.apple.mpegurl"
    );
    let body = resp.text().await.unwrap();
    assert!(body.contains(&format!(
        "http://{addr}/api/video/{}/720p/segment_000.ts",
        video.id
    )));
    assert!(body.contains(&format!(
        "http://{addr}/api/video/{}/720p/segment_001.ts",
        video.id
    )));
    assert!(body.contains("#EXTINF:4.2,"));

    // Nothing to package, so nothing was queued.
    assert!(vf_db::queries::jobs::list_queued(&h.conn(), QueueName::Default)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_rendition_queues_one_packaging_job() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Raw", Some("videos/raw.mp4"));
    let url = format!("http://{addr}/api/video/{}/480p/index.m3u8", video.id);

    for _ in 0..2 {
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.text().await.unwrap();
        assert!(body.contains(&format!("http://{addr}/media/videos/raw.mp4")));
        assert!(body.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
    }

    let queued = vf_db::queries::jobs::list_queued(&h.conn(), QueueName::Default).unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].func_name, "process_video");
    assert!(queued[0].payload.contains("480p"));
}

#[tokio::test]
async fn packaging_claimed_by_dead_worker_is_requeued() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Orphaned", Some("videos/orphaned.mp4"));
    let url = format!("http://{addr}/api/video/{}/720p/index.m3u8", video.id);

    reqwest::get(&url).await.unwrap();
    let claimed = vf_db::queries::jobs::dequeue_next(&h.conn(), &QueueName::ALL, "dead-worker")
        .unwrap()
        .unwrap();

    // While the claim is fresh the rendition counts as in progress.
    reqwest::get(&url).await.unwrap();
    assert!(vf_db::queries::jobs::list_queued(&h.conn(), QueueName::Default)
        .unwrap()
        .is_empty());
    assert_eq!(vf_server::worker::recover_abandoned(&h.ctx).unwrap(), 0);

    h.conn()
        .execute(
            "UPDATE jobs SET started_at='2000-01-01T00:00:00.000000Z' WHERE id=?1",
            [claimed.id.to_string()],
        )
        .unwrap();
    assert_eq!(vf_server::worker::recover_abandoned(&h.ctx).unwrap(), 1);

    reqwest::get(&url).await.unwrap();
    let queued = vf_db::queries::jobs::list_queued(&h.conn(), QueueName::Default).unwrap();
    assert_eq!(queued.len(), 1);
    assert_ne!(queued[0].id, claimed.id);
}

#[tokio::test]
async fn manifest_without_any_source() {
    let (h, addr) = TestHarness::with_server().await;
    let empty = h.create_video("Empty", None);

    let resp = reqwest::get(format!("http://{addr}/api/video/{}/720p/index.m3u8", empty.id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), vf_server::hls::EMPTY_MANIFEST);

    let resp = reqwest::get(format!("http://{addr}/api/video/{}/360p/index.m3u8", empty.id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = reqwest::get(format!("http://{addr}/api/video/999/720p/index.m3u8"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn segment_is_served_with_caching_headers() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Segments", Some("videos/segments.mp4"));
    let data: Vec<u8> = (0..=255u8).cycle().take(1880).collect();
    h.write_media(&format!("hls/{}/1080p/segment_000.ts", video.id), &data);

    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/1080p/segment_000.ts",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"].to_str().unwrap(), "video/MP2T");
    assert_eq!(
        resp.headers()["cache-control"].to_str().unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), data.as_slice());

    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/1080p/segment_009.ts",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);

    // No output directory for this rendition at all.
    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/480p/segment_000.ts",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn segment_name_cannot_escape_rendition_dir() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Escape", None);
    h.write_media(&format!("hls/{}/720p/segment_000.ts", video.id), b"x");

    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/720p/..%2F..%2Fsecret.ts",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn direct_stream_full_and_ranged() {
    let (h, addr) = TestHarness::with_server().await;
    let data: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
    h.write_media("videos/direct.mp4", &data);
    let video = h.create_video("Direct", Some("videos/direct.mp4"));
    let url = format!("http://{addr}/api/video/{}/direct/", video.id);

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"].to_str().unwrap(), "video/mp4");
    assert_eq!(resp.headers()["accept-ranges"].to_str().unwrap(), "bytes");
    assert_eq!(resp.bytes().await.unwrap().len(), 2048);

    let resp = reqwest::Client::new()
        .get(&url)
        .header("range", "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 100-199/2048"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &data[100..200]);

    let resp = reqwest::Client::new()
        .get(&url)
        .header("range", "bytes=5000-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 416);
}

#[tokio::test]
async fn direct_stream_redirects_external_and_404s_without_source() {
    let (h, addr) = TestHarness::with_server().await;
    let external = vf_db::queries::videos::create_video(
        &h.conn(),
        &vf_db::models::NewVideo {
            title: "Hosted".into(),
            video_url: Some("https://cdn.example.com/hosted.mp4".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let nothing = h.create_video("Nothing", None);

    let resp = common::client()
        .get(format!("http://{addr}/api/video/{}/direct/", external.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers()["location"].to_str().unwrap(),
        "https://cdn.example.com/hosted.mp4"
    );

    let resp = reqwest::get(format!("http://{addr}/api/video/{}/direct/", nothing.id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No video available.");
}

#[tokio::test]
async fn direct_stream_never_reads_outside_media_root() {
    let (h, addr) = TestHarness::with_server().await;
    let outside = tempfile::tempdir().unwrap();
    let secret = outside.path().join("secret.mp4");
    std::fs::write(&secret, b"outside the media root").unwrap();
    h.write_media("videos/inner.mp4", b"inside");

    let absolute = h.create_video("Absolute", Some(secret.to_str().unwrap()));
    let dotted = h.create_video("Dotted", Some("videos/../../secret.mp4"));

    for video in [&absolute, &dotted] {
        let resp = reqwest::get(format!("http://{addr}/api/video/{}/direct/", video.id))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body = resp.text().await.unwrap();
        assert!(!body.contains("outside the media root"));
    }

    // Packaging is not queued for a path that would escape either.
    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/720p/index.m3u8",
        absolute.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), vf_server::hls::EMPTY_MANIFEST);
    assert!(vf_db::queries::jobs::list_queued(&h.conn(), QueueName::Default)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_segment_error_does_not_leak_paths() {
    let (h, addr) = TestHarness::with_server().await;
    let video = h.create_video("Unpackaged", None);

    let resp = reqwest::get(format!(
        "http://{addr}/api/video/{}/720p/segment_000.ts",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert_eq!(message, format!("HLS stream not found: {}/720p", video.id));
    assert!(!message.contains(h.media.path().to_str().unwrap()));
}

#[tokio::test]
async fn media_files_are_served() {
    let (h, addr) = TestHarness::with_server().await;
    h.write_media("thumbnails/poster.jpg", b"\xff\xd8\xffjpeg");

    let resp = reqwest::get(format!("http://{addr}/media/thumbnails/poster.jpg"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"\xff\xd8\xffjpeg");
}
