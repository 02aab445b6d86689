/// Migration runner tests
///
/// One scope per run: commit on success, rollback on any failure, state
/// store advanced exactly once per target version.
/// Run with: cargo test --test runner_tests
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde_json::json;

use rustmigrate::db::InMemoryDatabase;
use rustmigrate::store::{InMemoryStateStore, StateStore};
use rustmigrate::{
    Migration, MigrationContext, MigrationError, MigrationPlan, MigrationRegistry, MigrationRunner,
    Result, ScopeProvider, locks,
};

struct PutRow {
    key: String,
}

impl Migration for PutRow {
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.with_database(|tx| tx.put(&self.key, json!("applied")))
    }
}

struct Failing;

impl Migration for Failing {
    fn migrate(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
        Err(anyhow!("simulated step failure").into())
    }
}

struct LeavesExpressionOpen;

impl Migration for LeavesExpressionOpen {
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let _expression = ctx.begin_expression()?;
        // never completed before returning
        Ok(())
    }
}

fn put_registry(steps: &[&str]) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for &step in steps {
        let key = format!("row:{step}");
        registry.register(step, move || Box::new(PutRow { key: key.clone() }));
    }
    registry
}

#[test]
fn test_concrete_two_step_scenario() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let registry = put_registry(&["step-a", "step-b"]);
    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-b");

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    let final_state = runner.execute(&plan, &provider, &registry, &store).unwrap();

    assert_eq!(final_state, "bbb");
    assert_eq!(store.get_value("default").unwrap(), Some("bbb".to_string()));
    assert_eq!(db.committed("row:step-a").unwrap(), Some(json!("applied")));
    assert_eq!(db.committed("row:step-b").unwrap(), Some(json!("applied")));
}

#[test]
fn test_failed_step_rolls_back_everything() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let mut registry = put_registry(&["step-a"]);
    registry.register("step-bad", || Box::new(Failing));
    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-bad");

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    let err = runner.execute(&plan, &provider, &registry, &store).unwrap_err();
    assert!(matches!(err, MigrationError::Step(_)));

    // work of the successful first step is gone too
    assert_eq!(db.committed("row:step-a").unwrap(), None);
    assert_eq!(store.get_value("default").unwrap(), None);
    // the write lock's sign flip rolled back with the rest
    assert_eq!(db.lock_value(locks::MIGRATIONS).unwrap(), Some(1));
    assert!(!provider.has_ambient_scope());
}

#[test]
fn test_invalid_plan_never_starts() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let registry = put_registry(&["s1"]);
    let plan = MigrationPlan::new("broken").from("a").to("a", "s1");

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    let err = runner.execute(&plan, &provider, &registry, &store).unwrap_err();
    assert!(matches!(err, MigrationError::SelfTransition(_)));
    assert_eq!(db.row_count().unwrap(), 0);
}

#[test]
fn test_idempotent_resume() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let registry = put_registry(&["step-a"]);
    let plan = MigrationPlan::new("default").from("").to("aaa", "step-a");
    let runner = MigrationRunner::new();

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    assert_eq!(runner.execute(&plan, &provider, &registry, &store).unwrap(), "aaa");

    // second run: source already equals terminal, zero steps
    let calls = Arc::new(AtomicUsize::new(0));
    let mut counting = MigrationRegistry::new();
    {
        let calls = Arc::clone(&calls);
        counting.register("step-a", move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::new(PutRow { key: "row:again".to_string() })
        });
    }
    let provider = ScopeProvider::new(Arc::new(db.clone()));
    assert_eq!(runner.execute(&plan, &provider, &counting, &store).unwrap(), "aaa");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_resume_from_partial_state() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    // a previous deployment already reached "aaa"
    assert!(store.set_value("default", "", "aaa").unwrap());

    let registry = put_registry(&["step-a", "step-b"]);
    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-b");

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    assert_eq!(runner.execute(&plan, &provider, &registry, &store).unwrap(), "bbb");

    // only the remaining step ran
    assert_eq!(db.committed("row:step-a").unwrap(), None);
    assert_eq!(db.committed("row:step-b").unwrap(), Some(json!("applied")));
}

#[test]
fn test_concurrent_state_change_aborts() {
    let db = InMemoryDatabase::new();
    let registry = put_registry(&["step-a"]);
    let plan = MigrationPlan::new("default").from("").to("aaa", "step-a");

    // a store whose state moves under the runner's feet
    struct RuggedStore {
        inner: InMemoryStateStore,
    }
    impl StateStore for RuggedStore {
        fn get_value(&self, _key: &str) -> Result<Option<String>> {
            // always report the initial state, as a stale read would
            Ok(None)
        }
        fn set_value(&self, key: &str, expected_old: &str, new_value: &str) -> Result<bool> {
            self.inner.set_value(key, expected_old, new_value)
        }
    }
    let store = RuggedStore {
        inner: InMemoryStateStore::new(),
    };
    // another runner already advanced the plan
    assert!(store.inner.set_value("default", "", "zzz").unwrap());

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    let err = runner.execute(&plan, &provider, &registry, &store).unwrap_err();
    assert!(matches!(err, MigrationError::ConcurrentStateChange(_)));

    // rollback: the step's work is absent
    assert_eq!(db.committed("row:step-a").unwrap(), None);
    assert_eq!(store.inner.get_value("default").unwrap(), Some("zzz".to_string()));
}

#[test]
fn test_post_migration_handlers() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let registry = put_registry(&["step-a"]);
    let plan = MigrationPlan::new("default")
        .with_product("cms")
        .from("")
        .to("aaa", "step-a");

    let events = Arc::new(Mutex::new(Vec::new()));
    let mut runner = MigrationRunner::new();
    {
        let events = Arc::clone(&events);
        runner.add_post_migration(move |event| {
            events
                .lock()
                .unwrap()
                .push((event.plan_name.clone(), event.final_state.clone(), event.steps_ran));
            Ok(())
        });
    }
    // a failing handler must not undo the committed upgrade
    runner.add_post_migration(|_event| Err(anyhow!("handler exploded").into()));

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    assert_eq!(runner.execute(&plan, &provider, &registry, &store).unwrap(), "aaa");

    let events = events.lock().unwrap();
    assert_eq!(events.as_slice(), [("default".to_string(), "aaa".to_string(), true)]);
    assert_eq!(store.get_value("default").unwrap(), Some("aaa".to_string()));
}

#[test]
fn test_no_op_run_still_notifies_with_steps_ran_false() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    assert!(store.set_value("default", "", "aaa").unwrap());

    let registry = put_registry(&["step-a"]);
    let plan = MigrationPlan::new("default").from("").to("aaa", "step-a");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut runner = MigrationRunner::new();
    {
        let seen = Arc::clone(&seen);
        runner.add_post_migration(move |event| {
            seen.lock().unwrap().push(event.steps_ran);
            Ok(())
        });
    }

    let provider = ScopeProvider::new(Arc::new(db));
    runner.execute(&plan, &provider, &registry, &store).unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), [false]);
}

#[test]
fn test_unfinished_expression_fails_the_run() {
    let db = InMemoryDatabase::new();
    let store = InMemoryStateStore::new();
    let mut registry = put_registry(&["step-a"]);
    registry.register("step-open", || Box::new(LeavesExpressionOpen));
    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-open");

    let provider = ScopeProvider::new(Arc::new(db.clone()));
    let runner = MigrationRunner::new();
    let err = runner.execute(&plan, &provider, &registry, &store).unwrap_err();
    assert!(matches!(err, MigrationError::IncompleteExpression(step) if step == "step-open"));

    assert_eq!(db.committed("row:step-a").unwrap(), None);
    assert_eq!(store.get_value("default").unwrap(), None);
}
