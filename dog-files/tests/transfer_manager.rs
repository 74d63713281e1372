use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use dog_files::{
    FileError, FileId, MemoryBucketStore, OperationKind, SessionHandle, TransferConfig,
    TransferEvent, TransferManager, TransferOptions, TransferOutcome, TypedFileRecord,
    DEFAULT_COLLECTION,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tagged {
    tag: String,
}

fn tagged(tag: &str) -> Tagged {
    Tagged { tag: tag.to_string() }
}

fn manager_over(store: &MemoryBucketStore) -> TransferManager {
    TransferManager::new(store.clone(), TransferConfig::default())
}

fn record_events(manager: &TransferManager) -> Arc<Mutex<Vec<TransferEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.add_listener(move |event: &TransferEvent| sink.lock().push(event.clone()));
    seen
}

fn last_terminal(events: &Arc<Mutex<Vec<TransferEvent>>>) -> TransferEvent {
    events
        .lock()
        .iter()
        .rev()
        .find(|event| event.is_terminal())
        .cloned()
        .expect("a terminal event")
}

fn crash_error(event: &TransferEvent) -> &FileError {
    match event {
        TransferEvent::Crashed { error, .. } => error,
        other => panic!("expected crashed event, got {}", other.event_name()),
    }
}

async fn upload_bytes(manager: &TransferManager, name: &str, data: &[u8]) -> String {
    manager
        .upload(name, data, data.len() as u64, TransferOptions::new())
        .await
        .expect("upload completes")
}

/// Uploaded content and metadata come back unchanged
#[tokio::test]
async fn test_round_trip_with_metadata() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let data: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();

    let id = manager
        .upload_with_metadata("data.bin", data.as_slice(), data.len() as u64, &tagged("x"), TransferOptions::new())
        .await
        .expect("upload completes");

    let downloaded = manager.download_bytes(&id, TransferOptions::new()).await;
    assert_eq!(downloaded.as_ref(), data.as_slice());

    let record: TypedFileRecord<Tagged> = manager
        .get_by_id_typed(&id, TransferOptions::new())
        .await
        .expect("record exists");
    assert_eq!(record.id, id);
    assert_eq!(record.length, data.len() as u64);
    assert_eq!(record.file_name, "data.bin");
    assert_eq!(record.metadata, tagged("x"));
    assert_eq!(store.file_count(DEFAULT_COLLECTION), 1);
}

/// The 10 MiB upload reports monotonic progress ending at 100 and is listable by tag
#[tokio::test]
async fn test_large_upload_reports_progress() {
    let store = MemoryBucketStore::new()
        .with_chunk_size(256 * 1024)
        .with_chunk_delay(Duration::from_millis(2));
    let config = TransferConfig::default().with_progress_interval(Duration::from_millis(5));
    let manager = TransferManager::new(store.clone(), config);
    let events = record_events(&manager);
    let data = vec![0xA5u8; 10 * 1024 * 1024];

    let id = manager
        .upload_with_metadata("a.bin", data.as_slice(), data.len() as u64, &tagged("x"), TransferOptions::new())
        .await
        .expect("upload completes");

    let samples: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            TransferEvent::Progress { sample, .. } => Some(*sample),
            _ => None,
        })
        .collect();
    assert!(!samples.is_empty());
    assert!(samples.windows(2).all(|pair| pair[0].percent <= pair[1].percent));
    assert!(samples.iter().all(|sample| (0.0..=100.0).contains(&sample.percent)));
    let last = samples.last().copied().unwrap();
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.bytes_transferred, data.len() as u64);

    let names: Vec<_> = events.lock().iter().map(|event| event.event_name()).collect();
    assert_eq!(names.first(), Some(&"started"));
    assert_eq!(names.last(), Some(&"completed"));

    let matches: Vec<TypedFileRecord<Tagged>> = manager
        .list_by_metadata_field("tag", &"x", TransferOptions::new())
        .await
        .expect("query completes");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, id);
    assert_eq!(matches[0].file_name, "a.bin");
    assert_eq!(matches[0].length, 10 * 1024 * 1024);
}

/// Every event of one operation carries the same id, started first and terminal last
#[tokio::test]
async fn test_operation_event_sequence() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "seq.txt", b"hello").await;

    let events = record_events(&manager);
    let outcome = manager.rename(&id, "renamed.txt", TransferOptions::new()).await;
    assert!(outcome.is_completed());

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_name(), "started");
    assert_eq!(events[1].event_name(), "completed");
    assert_eq!(events[0].operation(), events[1].operation());
    assert_eq!(events[1].kind(), OperationKind::Rename);
}

/// Malformed ids crash every id-taking call before the store is reached
#[tokio::test]
async fn test_malformed_ids_never_reach_the_store() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let events = record_events(&manager);
    // An offline store would turn any store call into StoreUnavailable
    store.set_offline(true);

    let bad = "not-a-valid-id";
    let outcomes = vec![
        manager.rename(bad, "x", TransferOptions::new()).await,
        manager.delete(bad, TransferOptions::new()).await,
        manager
            .update_metadata(bad, &tagged("x"), TransferOptions::new(), None)
            .await,
        manager.download(bad, &mut Vec::new(), TransferOptions::new()).await,
    ];
    for outcome in &outcomes {
        assert!(matches!(outcome.error(), Some(FileError::InvalidIdFormat { .. })));
    }

    assert!(manager.download_bytes(bad, TransferOptions::new()).await.is_empty());
    assert!(manager.open_download_stream(bad, TransferOptions::new()).await.is_none());
    assert!(manager.get_by_id(bad, TransferOptions::new()).await.is_none());

    let crashes: Vec<_> = events
        .lock()
        .iter()
        .filter(|event| event.is_terminal())
        .cloned()
        .collect();
    assert_eq!(crashes.len(), 7);
    for event in &crashes {
        assert!(matches!(crash_error(event), FileError::InvalidIdFormat { .. }));
    }
}

/// Downloading an id with no file record crashes with an undefined length
#[tokio::test]
async fn test_missing_record_has_undefined_length() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let events = record_events(&manager);

    let content = manager
        .download_bytes(&FileId::generate().to_string(), TransferOptions::new())
        .await;

    assert!(content.is_empty());
    assert!(matches!(
        crash_error(&last_terminal(&events)),
        FileError::UndefinedLength { .. }
    ));
}

/// Deleting twice crashes with NotFound by default
#[tokio::test]
async fn test_second_delete_is_not_found_by_default() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "gone.txt", b"bye").await;

    assert!(manager.delete(&id, TransferOptions::new()).await.is_completed());
    assert_eq!(store.file_count(DEFAULT_COLLECTION), 0);

    let second = manager.delete(&id, TransferOptions::new()).await;
    assert!(matches!(second.error(), Some(FileError::NotFound { .. })));
}

/// Deleting twice completes when missing files are tolerated
#[tokio::test]
async fn test_second_delete_completes_when_tolerated() {
    let store = MemoryBucketStore::new();
    let config = TransferConfig::default().tolerate_missing_on_delete();
    let manager = TransferManager::new(store.clone(), config);
    let id = upload_bytes(&manager, "gone.txt", b"bye").await;

    assert!(manager.delete(&id, TransferOptions::new()).await.is_completed());
    assert!(manager.delete(&id, TransferOptions::new()).await.is_completed());
}

/// cancel_all stops a slow download and leaves the manager usable
#[tokio::test]
async fn test_cancel_all_interrupts_running_download() {
    let store = MemoryBucketStore::new().with_chunk_size(1024);
    let fast = manager_over(&store);
    let data = vec![1u8; 16 * 1024];
    let id = upload_bytes(&fast, "slow.bin", &data).await;

    let slow = manager_over(&store.clone().with_chunk_delay(Duration::from_millis(20)));
    let events = record_events(&slow);

    let (content, ()) = tokio::join!(slow.download_bytes(&id, TransferOptions::new()), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        slow.cancel_all();
    });

    assert!(content.is_empty());
    assert_eq!(last_terminal(&events).event_name(), "cancelled");
    assert_eq!(slow.active_operations(), 0);

    let again = slow.download_bytes(&id, TransferOptions::new()).await;
    assert_eq!(again.len(), data.len());
    assert_eq!(last_terminal(&events).event_name(), "completed");
}

/// cancel_operation cancels one call and leaves its sibling running
#[tokio::test]
async fn test_cancel_operation_targets_one_call() {
    let store = MemoryBucketStore::new()
        .with_chunk_size(512)
        .with_chunk_delay(Duration::from_millis(5));
    let manager = manager_over(&store);
    let mut events = manager.subscribe();
    let data = vec![9u8; 8 * 1024];

    let (first, second, ()) = tokio::join!(
        manager.upload("first.bin", data.as_slice(), data.len() as u64, TransferOptions::new()),
        manager.upload("second.bin", data.as_slice(), data.len() as u64, TransferOptions::new()),
        async {
            let target = loop {
                match events.recv().await {
                    Ok(TransferEvent::Started { operation, .. }) => break operation,
                    Ok(_) => continue,
                    Err(err) => panic!("event stream failed: {err}"),
                }
            };
            assert!(manager.cancel_operation(target));
        }
    );

    // Either call may have been polled first
    assert_eq!(first.is_some() as u8 + second.is_some() as u8, 1);
    assert_eq!(store.file_count(DEFAULT_COLLECTION), 1);
}

/// A pre-cancelled external token cancels the call before any data moves
#[tokio::test]
async fn test_external_token_cancels_upload() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let events = record_events(&manager);
    let token = CancellationToken::new();
    token.cancel();

    let id = manager
        .upload(
            "never.bin",
            &b"data"[..],
            4,
            TransferOptions::new().with_cancellation(token),
        )
        .await;

    assert!(id.is_none());
    assert_eq!(last_terminal(&events).event_name(), "cancelled");
    assert_eq!(store.file_count(DEFAULT_COLLECTION), 0);
}

/// Metadata filters return exactly the matching files
#[tokio::test]
async fn test_list_by_metadata_field_filters() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    for (name, tag) in [("one", "x"), ("two", "y"), ("three", "x")] {
        manager
            .upload_with_metadata(name, &b"abc"[..], 3, &tagged(tag), TransferOptions::new())
            .await
            .expect("upload completes");
    }

    let matches: Vec<TypedFileRecord<Tagged>> = manager
        .list_by_metadata_field("tag", &"x", TransferOptions::new())
        .await
        .expect("query completes");
    let mut names: Vec<_> = matches.iter().map(|record| record.file_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["one", "three"]);
    assert!(matches.iter().all(|record| record.metadata == tagged("x")));
}

/// Name lookups match equal and containing names, scoped by collection
#[tokio::test]
async fn test_list_by_name_and_collections() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    upload_bytes(&manager, "report.pdf", b"1").await;
    upload_bytes(&manager, "2024-report.pdf", b"2").await;
    upload_bytes(&manager, "notes.txt", b"3").await;
    manager
        .upload("report.pdf", &b"4"[..], 1, TransferOptions::new().with_collection("Archive"))
        .await
        .expect("upload completes");

    let found = manager
        .list_by_name("report", TransferOptions::new())
        .await
        .expect("query completes");
    assert_eq!(found.len(), 2);

    let all = manager.list_all(TransferOptions::new()).await.expect("query completes");
    assert_eq!(all.len(), 3);
    assert_eq!(store.file_count("Archive"), 1);
}

/// Renamed files are found under their new name
#[tokio::test]
async fn test_rename_changes_file_name() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "draft.txt", b"text").await;

    assert!(manager.rename(&id, "final.txt", TransferOptions::new()).await.is_completed());
    let record = manager.get_by_id(&id, TransferOptions::new()).await.expect("record exists");
    assert_eq!(record.file_name, "final.txt");

    let missing = manager
        .rename(&FileId::generate().to_string(), "x", TransferOptions::new())
        .await;
    assert!(matches!(missing.error(), Some(FileError::NotFound { .. })));
}

/// In-memory downloads above the configured ceiling are refused
#[tokio::test]
async fn test_download_bytes_respects_length_ceiling() {
    let store = MemoryBucketStore::new();
    let manager = TransferManager::new(store.clone(), TransferConfig::default().with_max_in_memory_bytes(4));
    let events = record_events(&manager);
    let id = upload_bytes(&manager, "big.bin", b"0123456789").await;

    assert!(manager.download_bytes(&id, TransferOptions::new()).await.is_empty());
    assert!(matches!(
        crash_error(&last_terminal(&events)),
        FileError::LengthExceeded { length: 10, max: 4 }
    ));

    // Streaming downloads have no ceiling
    let mut sink = Vec::new();
    assert!(manager.download(&id, &mut sink, TransferOptions::new()).await.is_completed());
    assert_eq!(sink, b"0123456789");
}

/// An unreachable store surfaces as StoreUnavailable
#[tokio::test]
async fn test_offline_store_is_unavailable() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let events = record_events(&manager);
    store.set_offline(true);

    assert!(manager.list_all(TransferOptions::new()).await.is_none());
    let event = last_terminal(&events);
    let error = crash_error(&event);
    assert!(matches!(error, FileError::StoreUnavailable { .. }));
    assert!(error.to_string().contains("offline"));
}

/// Metadata updates replace the document and forward the session handle
#[tokio::test]
async fn test_update_metadata_with_session() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = manager
        .upload_with_metadata("doc.txt", &b"v1"[..], 2, &tagged("old"), TransferOptions::new())
        .await
        .expect("upload completes");

    let session = SessionHandle::new("txn-1");
    let outcome = manager
        .update_metadata(&id, &tagged("new"), TransferOptions::new(), Some(&session))
        .await;
    assert!(outcome.is_completed());
    assert_eq!(store.sessions_seen(), vec![session]);

    let record = manager.get_by_id(&id, TransferOptions::new()).await.expect("record exists");
    assert_eq!(record.raw_metadata, serde_json::json!({ "tag": "new" }));

    let missing = manager
        .update_metadata(&FileId::generate().to_string(), &tagged("x"), TransferOptions::new(), None)
        .await;
    assert!(matches!(missing.error(), Some(FileError::NotFound { .. })));
}

/// Upload handles store on commit and discard on abort
#[tokio::test]
async fn test_upload_stream_commit_and_abort() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);

    let mut handle = manager
        .open_upload_stream("streamed.txt", TransferOptions::new())
        .await
        .expect("stream opens");
    let id = handle.id().expect("handle has an id");
    let writer = handle.write_stream().expect("handle has a stream");
    tokio_test::assert_ok!(writer.write_all(b"streamed content").await);
    tokio_test::assert_ok!(handle.commit_and_close().await);

    let record = manager.get_by_id(&id, TransferOptions::new()).await.expect("record exists");
    assert_eq!(record.length, 16);

    let mut discarded = manager
        .open_upload_stream("discarded.txt", TransferOptions::new())
        .await
        .expect("stream opens");
    tokio_test::assert_ok!(discarded.write_stream().unwrap().write_all(b"nope").await);
    tokio_test::assert_ok!(discarded.abort_and_close().await);
    assert_eq!(store.file_count(DEFAULT_COLLECTION), 1);
}

/// Download streams read the stored content
#[tokio::test]
async fn test_open_download_stream_reads_content() {
    let store = MemoryBucketStore::new().with_chunk_size(3);
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "stream.txt", b"streaming content").await;

    let mut stream = manager
        .open_download_stream(&id, TransferOptions::new())
        .await
        .expect("stream opens");
    let mut content = String::new();
    tokio_test::assert_ok!(stream.read_to_string(&mut content).await);
    assert_eq!(content, "streaming content");
}

/// Preset ids are honoured when they parse
#[tokio::test]
async fn test_preset_id_is_used() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let preset = FileId::generate().to_string();

    let id = manager
        .upload("preset.bin", &b"p"[..], 1, TransferOptions::new().with_preset_id(preset.clone()))
        .await
        .expect("upload completes");
    assert_eq!(id, preset);

    let generated = manager
        .upload("other.bin", &b"q"[..], 1, TransferOptions::new().with_preset_id("not-an-id"))
        .await
        .expect("upload completes");
    assert!(FileId::is_valid(&generated));
    assert_ne!(generated, preset);
}

/// Local files upload under their own name and download back to disk
#[tokio::test]
async fn test_path_transfers() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("local.txt");
    tokio::fs::write(&source, b"from disk").await.unwrap();

    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = manager
        .upload_file_with_metadata(&source, &tagged("disk"), TransferOptions::new())
        .await
        .expect("upload completes");

    let record = manager.get_by_id(&id, TransferOptions::new()).await.expect("record exists");
    assert_eq!(record.file_name, "local.txt");
    assert_eq!(record.length, 9);

    let target = dir.path().join("copy.txt");
    assert!(manager.download_to_path(&id, &target, TransferOptions::new()).await.is_completed());
    assert_eq!(tokio::fs::read(&target).await.unwrap(), b"from disk");

    let missing = manager
        .upload_file(dir.path().join("absent.txt"), TransferOptions::new())
        .await;
    assert!(missing.is_none());
}

/// A record whose metadata does not decode fails the whole typed listing
#[tokio::test]
async fn test_typed_listing_fails_on_bad_metadata() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let events = record_events(&manager);
    manager
        .upload_with_metadata("good", &b"g"[..], 1, &tagged("x"), TransferOptions::new())
        .await
        .expect("upload completes");
    upload_bytes(&manager, "plain", b"p").await;

    let typed: Option<Vec<TypedFileRecord<Tagged>>> = manager.list_all_typed(TransferOptions::new()).await;
    assert!(typed.is_none());
    assert!(matches!(
        crash_error(&last_terminal(&events)),
        FileError::Deserialization { .. }
    ));

    let plain = manager.list_all(TransferOptions::new()).await.expect("query completes");
    assert_eq!(plain.len(), 2);
}

/// Empty files download empty and report a single complete sample
#[tokio::test]
async fn test_empty_file_transfer() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "empty", b"").await;
    let events = record_events(&manager);

    let outcome = manager.download(&id, &mut Vec::new(), TransferOptions::new()).await;
    assert!(matches!(outcome, TransferOutcome::Completed));

    let samples: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            TransferEvent::Progress { sample, .. } => Some(*sample),
            _ => None,
        })
        .collect();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].percent, 100.0);
    assert_eq!(samples[0].bytes_transferred, 0);
}

/// Stream-returning calls yield nothing once their scope is cancelled
#[tokio::test]
async fn test_cancelled_stream_variants_return_none() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "s.bin", b"content").await;
    let events = record_events(&manager);
    let token = CancellationToken::new();
    token.cancel();

    let stream = manager
        .open_download_stream(&id, TransferOptions::new().with_cancellation(token.clone()))
        .await;
    assert!(stream.is_none());
    assert_eq!(last_terminal(&events).event_name(), "cancelled");

    let handle = manager
        .open_upload_stream("u.bin", TransferOptions::new().with_cancellation(token))
        .await;
    assert!(handle.is_none());
    assert_eq!(last_terminal(&events).event_name(), "cancelled");
}

/// Metadata types only need to serialize to be written
#[derive(Serialize)]
struct Stamp<'a> {
    tag: &'a str,
}

/// Write-only metadata types are accepted on upload and update
#[tokio::test]
async fn test_write_only_metadata_types() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);

    let id = manager
        .upload_with_metadata("w.bin", &b"w"[..], 1, &Stamp { tag: "a" }, TransferOptions::new())
        .await
        .expect("upload completes");
    let outcome = manager
        .update_metadata(&id, &Stamp { tag: "b" }, TransferOptions::new(), None)
        .await;
    assert!(outcome.is_completed());

    let record: TypedFileRecord<Tagged> = manager
        .get_by_id_typed(&id, TransferOptions::new())
        .await
        .expect("record exists");
    assert_eq!(record.metadata, tagged("b"));
}

/// A failed lookup leaves an existing destination file untouched
#[tokio::test]
async fn test_download_to_path_keeps_destination_on_lookup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("keep.txt");
    tokio::fs::write(&target, b"precious data").await.unwrap();

    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);

    let malformed = manager
        .download_to_path("not-an-id", &target, TransferOptions::new())
        .await;
    assert!(matches!(malformed.error(), Some(FileError::InvalidIdFormat { .. })));
    assert_eq!(tokio::fs::read(&target).await.unwrap(), b"precious data");

    let missing = manager
        .download_to_path(&FileId::generate().to_string(), &target, TransferOptions::new())
        .await;
    assert!(matches!(missing.error(), Some(FileError::UndefinedLength { .. })));
    assert_eq!(tokio::fs::read(&target).await.unwrap(), b"precious data");
}

/// Writer that rejects every write
struct FullDisk;

impl AsyncWrite for FullDisk {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Local writer failures are reported as I/O errors, not as store outages
#[tokio::test]
async fn test_destination_failure_is_io_error() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let id = upload_bytes(&manager, "d.bin", b"payload").await;

    let outcome = manager.download(&id, &mut FullDisk, TransferOptions::new()).await;
    match outcome.error() {
        Some(FileError::Io { source }) => assert_eq!(source.to_string(), "disk full"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// In-memory downloads grow past the initially reserved buffer
#[tokio::test]
async fn test_download_bytes_beyond_initial_buffer() {
    let store = MemoryBucketStore::new();
    let manager = manager_over(&store);
    let data: Vec<u8> = (0..=250u8).cycle().take(3 * 1024 * 1024 + 17).collect();
    let id = upload_bytes(&manager, "big.bin", &data).await;

    let content = manager.download_bytes(&id, TransferOptions::new()).await;
    assert_eq!(content.len(), data.len());
    assert_eq!(content.as_ref(), data.as_slice());
}
