//! Memory durability test: records written through the store survive a reopen of the
//! same sled directory, with versions and record ids intact.
//!
//! Run with: `cargo test -p evo-core --test memory_durability_test`

use evo_core::{
    DecisionEngine, DecisionOutcome, EvoConfig, MemoryReader, MemoryStore, MemoryWrite, Skill, SkillError,
    SkillInput, SkillRegistry, SkillResult, TriggerPattern,
};
use std::sync::Arc;

#[test]
fn put_survives_reopen() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let db_path = temp_dir.path().join("evo_memory");

    {
        let store = MemoryStore::open(&db_path).expect("open store");
        store.put("note1", "hello").expect("put note1");
    }

    let store = MemoryStore::open(&db_path).expect("reopen store");
    assert_eq!(store.get("note1").expect("get note1"), serde_json::json!("hello"));
}

#[test]
fn versions_and_ids_continue_after_reopen() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let db_path = temp_dir.path().join("evo_memory");

    let first_id = {
        let store = MemoryStore::open(&db_path).expect("open store");
        store.append("notes", "one").expect("append one");
        store.append("notes", "two").expect("append two")
    };

    let store = MemoryStore::open(&db_path).expect("reopen store");
    let next_id = store.append("notes", "three").expect("append three");
    assert!(next_id > first_id);

    let history = store.history("notes").expect("history");
    let versions: Vec<u64> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, [1, 2, 3]);
    assert_eq!(store.get("notes").expect("latest"), serde_json::json!("three"));

    store.put("notes", "reset").expect("replace");
    let history = store.history("notes").expect("history after replace");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 4);
}

#[test]
fn query_rescans_current_state() {
    let store = MemoryStore::open_temporary().expect("open store");
    store.put("fact/car", "red").expect("put");
    store.put("fact/dog", "rex").expect("put");
    store.put("other", 1).expect("put");

    let facts = || {
        store
            .query(|r| r.key.starts_with("fact/"))
            .collect::<Result<Vec<_>, _>>()
            .expect("query")
    };
    assert_eq!(facts().len(), 2);
    store.remove("fact/dog").expect("remove");
    assert_eq!(facts().len(), 1);
    assert_eq!(store.keys().expect("keys"), ["fact/car", "other"]);
}

struct Remember;

#[async_trait::async_trait]
impl Skill for Remember {
    fn name(&self) -> &str {
        "remember"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::prefix("remember")]
    }

    async fn execute(&self, input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        Ok(SkillResult::say("ok").with_write(MemoryWrite::Put {
            key: "fact/last".into(),
            content: serde_json::json!(input.argument()),
        }))
    }
}

#[tokio::test]
async fn engine_writes_survive_restart() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let config = EvoConfig {
        storage_path: temp_dir.path().join("evo_memory").to_string_lossy().into_owned(),
        ..EvoConfig::default()
    };

    {
        let mut registry = SkillRegistry::new();
        registry.register_skill(Arc::new(Remember)).expect("register");
        let memory = Arc::new(MemoryStore::open(&config.storage_path).expect("open store"));
        let mut engine = DecisionEngine::new(registry, memory, &config);
        let outcome = engine.process("Remember the milk").await;
        assert!(matches!(outcome, DecisionOutcome::Executed { .. }));
    }

    let store = MemoryStore::open(&config.storage_path).expect("reopen store");
    assert_eq!(store.get("fact/last").expect("fact"), serde_json::json!("the milk"));
}

#[test]
fn concurrent_appends_to_one_key_are_serialized() {
    let store = Arc::new(MemoryStore::open_temporary().expect("open store"));
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..25 {
                    store
                        .append("shared", serde_json::json!({ "writer": w, "i": i }))
                        .expect("append");
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let versions: Vec<u64> = store.history("shared").expect("history").iter().map(|r| r.version).collect();
    assert_eq!(versions, (1..=100).collect::<Vec<u64>>());
}
