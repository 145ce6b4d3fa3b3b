use ragdb_core::chunker::ChunkText;
use ragdb_core::error::Error;
use ragdb_core::types::Meta;
use ragdb_corpus::CorpusStore;

fn meta(pairs: &[(&str, &str)]) -> Meta {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn save_and_load_round_trips_byte_exact() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("corpus.json");

    let store = CorpusStore::new();
    let doc = store.put_document("naïve \u{1F600} text\twith tabs", meta(&[("title", "Emoji"), ("url", "https://x")]));
    store
        .put_chunks(&doc, &[
            ChunkText { text: "naïve \u{1F600}".into(), token_count: 2 },
            ChunkText { text: "text\twith tabs".into(), token_count: 3 },
        ])
        .unwrap();
    let dropped = store.put_document("dropped", Meta::new());
    store.delete_document(&dropped).unwrap();
    store.save(&path).unwrap();

    let loaded = CorpusStore::load(&path).unwrap();
    assert_eq!(loaded.to_snapshot(), store.to_snapshot());
    let original = store.get_document(&doc).unwrap();
    let restored = loaded.get_document(&doc).unwrap();
    assert_eq!(*restored, *original);
    assert_eq!(loaded.get_chunk(&format!("{doc}:1")).unwrap().text, "text\twith tabs");

    // The id counter survives, so deleted ids stay retired.
    let next = loaded.put_document("after restore", Meta::new());
    assert_ne!(next, doc);
    assert_ne!(next, dropped);
}

#[test]
fn future_schema_versions_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("corpus.json");
    std::fs::write(&path, br#"{"schema_version": 9, "next_seq": 0, "documents": []}"#).unwrap();
    match CorpusStore::load(&path) {
        Err(Error::IncompatibleStoreVersion { found, supported }) => {
            assert_eq!(found, 9);
            assert_eq!(supported, 1);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("load should fail"),
    }
}
