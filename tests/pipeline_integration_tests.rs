//! Integration Tests for the Enrichment Pipeline Surface
//!
//! Exercises the full path a host agent uses: parse configuration, build
//! processors against a shared registry, run events through them, and
//! persist state across restarts.

use std::time::Duration;

use serde_json::json;

use enrich_cache::{CacheProcessor, Event, StoreRegistry};

// == Helper Functions ==

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn processor(registry: &StoreRegistry, yaml: &str) -> CacheProcessor {
    let config = serde_yaml::from_str(yaml).unwrap();
    CacheProcessor::new(registry, config).unwrap()
}

fn event(value: serde_json::Value) -> Event {
    Event::try_from(value).unwrap()
}

// == Memory Pipeline Tests ==

#[test]
fn test_put_and_get_stages_share_a_memory_store() {
    init_logging();
    let registry = StoreRegistry::new("unused");

    let put = processor(
        &registry,
        r#"
backend:
  memory:
    id: aidmaster
  capacity: 1000
put:
  key_field: crowdstrike.aid
  value_field: crowdstrike.metadata
  ttl: 168h
"#,
    );
    let get = processor(
        &registry,
        r#"
backend:
  memory:
    id: aidmaster
get:
  key_field: crowdstrike.aid
  target_field: crowdstrike.metadata_new
"#,
    );

    let mut source = event(json!({
        "crowdstrike": {"aid": "one", "metadata": "metadata_value"}
    }));
    put.process(&mut source).unwrap();

    let mut lookup = event(json!({"crowdstrike": {"aid": "one"}}));
    get.process(&mut lookup).unwrap();
    assert_eq!(
        lookup.get("crowdstrike.metadata_new"),
        Some(&json!("metadata_value"))
    );
}

#[test]
fn test_delete_stage_then_lookup_misses() {
    init_logging();
    let registry = StoreRegistry::new("unused");

    let put = processor(
        &registry,
        r#"
backend:
  memory:
    id: sessions
  capacity: 1000
put:
  key_field: session.id
  value_field: session.user
  ttl: 1h
"#,
    );
    let delete = processor(
        &registry,
        r#"
backend:
  memory:
    id: sessions
delete:
  key_field: session.id
"#,
    );
    let get = processor(
        &registry,
        r#"
backend:
  memory:
    id: sessions
get:
  key_field: session.id
  target_field: session.cached_user
"#,
    );

    for id in ["one", "two", "three"] {
        let mut ev = event(json!({"session": {"id": id, "user": format!("user-{id}")}}));
        put.process(&mut ev).unwrap();
    }

    let mut removal = event(json!({"session": {"id": "two"}}));
    delete.process(&mut removal).unwrap();

    let mut missing = event(json!({"session": {"id": "two"}}));
    assert!(get.process(&mut missing).unwrap_err().is_no_data());

    let mut found = event(json!({"session": {"id": "one"}}));
    get.process(&mut found).unwrap();
    assert_eq!(found.get("session.cached_user"), Some(&json!("user-one")));
}

#[test]
fn test_values_survive_json_round_trip_types() {
    init_logging();
    let registry = StoreRegistry::new("unused");

    let put = processor(
        &registry,
        r#"
backend:
  memory:
    id: typed
put:
  key_field: k
  value_field: v
  ttl: 1h
"#,
    );
    let get = processor(
        &registry,
        r#"
backend:
  memory:
    id: typed
get:
  key_field: k
  target_field: cached
"#,
    );

    let value = json!({"pid": 1093, "ppid": 1, "args": ["/usr/bin/foo", "-c"]});
    let mut source = event(json!({"k": "proc", "v": value}));
    put.process(&mut source).unwrap();

    let mut lookup = event(json!({"k": "proc"}));
    get.process(&mut lookup).unwrap();
    assert_eq!(lookup.get("cached"), Some(&value));
}

#[test]
fn test_concurrent_stages_on_one_store() {
    init_logging();
    let registry = StoreRegistry::new("unused");

    let put = processor(
        &registry,
        r#"
backend:
  memory:
    id: busy
  capacity: 500
put:
  key_field: k
  value_field: v
  ttl: 1h
"#,
    );
    let get = processor(
        &registry,
        r#"
backend:
  memory:
    id: busy
get:
  key_field: k
  target_field: cached
ignore_missing: true
"#,
    );

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let put = &put;
            let get = &get;
            scope.spawn(move || {
                for i in 0..100 {
                    let key = format!("w{worker}-{i}");
                    let mut ev = event(json!({"k": key, "v": i}));
                    put.process(&mut ev).unwrap();

                    let mut lookup = event(json!({"k": key}));
                    get.process(&mut lookup).unwrap();
                }
            });
        }
    });
}

// == File Pipeline Tests ==

#[test]
fn test_state_survives_process_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = StoreRegistry::new(dir.path());
        let put = processor(
            &registry,
            r#"
backend:
  file:
    id: aidmaster
put:
  key_field: crowdstrike.aid
  value_field: crowdstrike.metadata
  ttl: 168h
"#,
        );
        let mut source = event(json!({
            "crowdstrike": {"aid": "one", "metadata": "metadata_value"}
        }));
        put.process(&mut source).unwrap();
        // Dropping the last referent flushes the store
    }

    let registry = StoreRegistry::new(dir.path());
    let get = processor(
        &registry,
        r#"
backend:
  file:
    id: aidmaster
get:
  key_field: crowdstrike.aid
  target_field: crowdstrike.metadata_new
"#,
    );
    let mut lookup = event(json!({"crowdstrike": {"aid": "one"}}));
    get.process(&mut lookup).unwrap();
    assert_eq!(
        lookup.get("crowdstrike.metadata_new"),
        Some(&json!("metadata_value"))
    );
}

#[test]
fn test_shared_file_store_flushes_once_on_last_drop() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(dir.path());

    let put = processor(
        &registry,
        r#"
backend:
  file:
    id: shared
put:
  key_field: k
  value_field: v
  ttl: 1h
"#,
    );
    let get = processor(
        &registry,
        r#"
backend:
  file:
    id: shared
get:
  key_field: k
  target_field: cached
"#,
    );

    let mut ev = event(json!({"k": "key", "v": "value"}));
    put.process(&mut ev).unwrap();

    drop(put);
    assert!(
        !dir.path().join("shared").exists(),
        "store flushed while still referenced"
    );

    drop(get);
    assert!(dir.path().join("shared").exists());
}

#[tokio::test]
async fn test_periodic_snapshot_persists_between_events() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(dir.path());

    let put = processor(
        &registry,
        r#"
backend:
  file:
    id: periodic
    write_period: 50ms
put:
  key_field: k
  value_field: v
  ttl: 1h
"#,
    );

    let mut ev = event(json!({"k": "key", "v": "value"}));
    put.process(&mut ev).unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        dir.path().join("periodic").exists(),
        "snapshot task never wrote"
    );
}

#[test]
fn test_target_collision_respects_overwrite_keys() {
    init_logging();
    let registry = StoreRegistry::new("unused");

    let put = processor(
        &registry,
        r#"
backend:
  memory:
    id: collisions
put:
  key_field: crowdstrike.aid
  value_field: crowdstrike.metadata
  ttl: 168h
"#,
    );
    let mut source = event(json!({
        "crowdstrike": {"aid": "one", "metadata": "fresh"}
    }));
    put.process(&mut source).unwrap();

    let strict = processor(
        &registry,
        r#"
backend:
  memory:
    id: collisions
get:
  key_field: crowdstrike.aid
  target_field: crowdstrike.metadata_new
"#,
    );
    let mut occupied = event(json!({
        "crowdstrike": {"aid": "one", "metadata_new": "already-here"}
    }));
    let before = occupied.clone();
    assert!(strict.process(&mut occupied).is_err());
    assert_eq!(occupied, before);

    let overwriting = processor(
        &registry,
        r#"
backend:
  memory:
    id: collisions
get:
  key_field: crowdstrike.aid
  target_field: crowdstrike.metadata_new
overwrite_keys: true
"#,
    );
    overwriting.process(&mut occupied).unwrap();
    assert_eq!(
        occupied.get("crowdstrike.metadata_new"),
        Some(&json!("fresh"))
    );
}
