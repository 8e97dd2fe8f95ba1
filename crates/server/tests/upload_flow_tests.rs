//! End-to-end upload flow tests.

mod common;

use axum::http::StatusCode;
use common::{sample_payload, split_chunks, upload_all, TestServer};

#[tokio::test]
async fn three_chunk_upload_reports_progress_and_completes() {
    let server = TestServer::new().await;
    let payload = sample_payload(25);
    let chunks = split_chunks(&payload, 10); // 10, 10, 5 bytes

    let (status, ack) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", "3"),
                ("file_name", "training-session.mp4"),
                ("file_size", "25"),
                ("coach_id", "coach-17"),
            ],
            Some(&chunks[0]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = ack["session_id"].as_str().unwrap().to_string();
    assert_eq!(ack["received_count"], 1);
    assert_eq!(ack["progress"], 33);
    assert!(ack.get("completion").is_none());

    let (status, ack) = server
        .post_chunk(
            &[
                ("session_id", &session_id),
                ("chunk_index", "1"),
                ("total_chunks", "3"),
            ],
            Some(&chunks[1]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["progress"], 67);
    assert!(ack.get("completion").is_none());

    let (status, ack) = server
        .post_chunk(
            &[
                ("session_id", &session_id),
                ("chunk_index", "2"),
                ("total_chunks", "3"),
            ],
            Some(&chunks[2]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["progress"], 100);

    let completion = &ack["completion"];
    assert_eq!(completion["session_id"], session_id);
    assert_eq!(completion["file_name"], "training-session.mp4");
    assert_eq!(completion["file_size"], 25);

    // Byte-for-byte identity of the published artifact.
    let artifact_key = completion["artifact_key"].as_str().unwrap();
    assert_eq!(server.read_object(artifact_key).await, payload);

    // Chunks are purged after finalization.
    let leftover = server
        .list_objects(&format!("sessions/{session_id}"))
        .await;
    assert!(leftover.is_empty(), "chunks not purged: {leftover:?}");

    // The session is closed but still queryable as complete.
    let (status, body) = server.get_status(&session_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "complete");
    assert_eq!(body["progress"], 100);
}

#[tokio::test]
async fn round_trip_identity_for_uneven_sizes() {
    let server = TestServer::new().await;
    // Sizes chosen to hit exact-multiple, one-byte-tail, and single-chunk.
    for (size, chunk_size) in [(64usize, 16usize), (65, 16), (7, 16), (48, 7)] {
        let payload = sample_payload(size);
        let last = upload_all(&server, "clip.bin", &payload, chunk_size).await;
        let artifact_key = last["completion"]["artifact_key"].as_str().unwrap();
        assert_eq!(
            server.read_object(artifact_key).await,
            payload,
            "mismatch for size {size} chunk {chunk_size}"
        );
    }
}

#[tokio::test]
async fn single_chunk_upload_completes_immediately() {
    let server = TestServer::new().await;
    let payload = sample_payload(9);

    let (status, ack) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", "1"),
                ("file_name", "short.mp4"),
                ("file_size", "9"),
            ],
            Some(&payload),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ack["progress"], 100);
    let artifact_key = ack["completion"]["artifact_key"].as_str().unwrap();
    assert_eq!(server.read_object(artifact_key).await, payload);
}

#[tokio::test]
async fn duplicate_chunk_delivery_is_idempotent() {
    let server = TestServer::new().await;
    let payload = sample_payload(20);
    let chunks = split_chunks(&payload, 10);

    let (_, ack) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", "2"),
                ("file_name", "dup.mp4"),
                ("file_size", "20"),
            ],
            Some(&chunks[0]),
        )
        .await;
    let session_id = ack["session_id"].as_str().unwrap().to_string();

    // Re-deliver chunk 0 twice; the count never moves past 1.
    for _ in 0..2 {
        let (status, ack) = server
            .post_chunk(
                &[
                    ("session_id", &session_id),
                    ("chunk_index", "0"),
                    ("total_chunks", "2"),
                ],
                Some(&chunks[0]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received_count"], 1);
        assert_eq!(ack["progress"], 50);
    }

    let (_, ack) = server
        .post_chunk(
            &[
                ("session_id", &session_id),
                ("chunk_index", "1"),
                ("total_chunks", "2"),
            ],
            Some(&chunks[1]),
        )
        .await;
    let artifact_key = ack["completion"]["artifact_key"].as_str().unwrap();
    assert_eq!(server.read_object(artifact_key).await, payload);
}

#[tokio::test]
async fn metadata_fields_are_captured_once_and_passed_through() {
    let server = TestServer::new().await;
    let payload = sample_payload(12);
    let chunks = split_chunks(&payload, 6);

    let (_, ack) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", "2"),
                ("file_name", "meta.mp4"),
                ("file_size", "12"),
                ("team_id", "team-9"),
                ("drill", "counterpress"),
            ],
            Some(&chunks[0]),
        )
        .await;
    let session_id = ack["session_id"].as_str().unwrap().to_string();

    // Late metadata on a continuation chunk is ignored, not applied.
    let (status, _) = server
        .post_chunk(
            &[
                ("session_id", &session_id),
                ("chunk_index", "1"),
                ("total_chunks", "2"),
                ("team_id", "evil-team"),
            ],
            Some(&chunks[1]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let session = server
        .state
        .registry
        .get_session(session_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap()
        .to_session()
        .unwrap();
    assert_eq!(session.form_fields["team_id"], "team-9");
    assert_eq!(session.form_fields["drill"], "counterpress");
}

#[tokio::test]
async fn checksum_is_verified_when_present() {
    let server = TestServer::new().await;
    let payload = sample_payload(10);

    use sha2::{Digest, Sha256};
    let good = format!("{:x}", Sha256::digest(&payload));

    let (status, ack) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", "1"),
                ("file_name", "sum.mp4"),
                ("file_size", "10"),
                ("chunk_checksum", &good),
            ],
            Some(&payload),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ack}");
    assert_eq!(ack["progress"], 100);
}
