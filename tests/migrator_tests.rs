/// Migrator facade tests
///
/// End-to-end runs over a file-backed state store, including resuming a
/// plan from a previous process.
/// Run with: cargo test --test migrator_tests
use std::sync::{Arc, Mutex};

use serde_json::json;

use rustmigrate::db::InMemoryDatabase;
use rustmigrate::store::FileStateStore;
use rustmigrate::{Migration, MigrationContext, MigrationPlan, Migrator, Result};

struct PutRow {
    key: &'static str,
}

impl Migration for PutRow {
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        ctx.with_database(|tx| tx.put(self.key, json!("applied")))
    }
}

fn migrator_with_steps(db: &InMemoryDatabase, store: FileStateStore) -> Migrator {
    let mut migrator = Migrator::new(Arc::new(db.clone()), Arc::new(store));
    migrator.register_step("step-a", || Box::new(PutRow { key: "row:a" }));
    migrator.register_step("step-b", || Box::new(PutRow { key: "row:b" }));
    migrator
}

#[test]
fn test_end_to_end_run() {
    let dir = tempfile::tempdir().unwrap();
    let db = InMemoryDatabase::new();
    let migrator = migrator_with_steps(&db, FileStateStore::new(dir.path().join("state.json")));

    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-b");
    let report = migrator.run(&plan).unwrap();

    assert_eq!(report.plan_name, "default");
    assert_eq!(report.initial_state, "");
    assert_eq!(report.final_state, "bbb");
    assert!(report.steps_ran);
    assert_eq!(db.committed("row:a").unwrap(), Some(json!("applied")));
    assert_eq!(db.committed("row:b").unwrap(), Some(json!("applied")));
}

#[test]
fn test_rerun_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let db = InMemoryDatabase::new();
    let migrator = migrator_with_steps(&db, FileStateStore::new(dir.path().join("state.json")));

    let plan = MigrationPlan::new("default").from("").to("aaa", "step-a");
    assert!(migrator.run(&plan).unwrap().steps_ran);

    let report = migrator.run(&plan).unwrap();
    assert!(!report.steps_ran);
    assert_eq!(report.initial_state, "aaa");
    assert_eq!(report.final_state, "aaa");
}

#[test]
fn test_resume_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let db = InMemoryDatabase::new();
    let runs_a = Arc::new(Mutex::new(0));
    let runs_b = Arc::new(Mutex::new(0));

    let counting_migrator = |path: &std::path::Path| {
        let mut migrator =
            Migrator::new(Arc::new(db.clone()), Arc::new(FileStateStore::new(path)));
        let runs_a = Arc::clone(&runs_a);
        migrator.register_step("step-a", move || {
            *runs_a.lock().unwrap() += 1;
            Box::new(PutRow { key: "row:a" })
        });
        let runs_b = Arc::clone(&runs_b);
        migrator.register_step("step-b", move || {
            *runs_b.lock().unwrap() += 1;
            Box::new(PutRow { key: "row:b" })
        });
        migrator
    };

    // first deployment ships the plan up to "aaa"
    {
        let migrator = counting_migrator(&path);
        let plan = MigrationPlan::new("default").from("").to("aaa", "step-a");
        assert_eq!(migrator.run(&plan).unwrap().final_state, "aaa");
    }

    // next deployment extends the plan; only the new step runs
    let migrator = counting_migrator(&path);
    let plan = MigrationPlan::new("default")
        .from("")
        .to("aaa", "step-a")
        .to("bbb", "step-b");
    let report = migrator.run(&plan).unwrap();

    assert_eq!(report.initial_state, "aaa");
    assert_eq!(report.final_state, "bbb");
    assert!(report.steps_ran);
    assert_eq!(*runs_a.lock().unwrap(), 1);
    assert_eq!(*runs_b.lock().unwrap(), 1);
    assert_eq!(db.committed("row:b").unwrap(), Some(json!("applied")));
}

#[test]
fn test_post_migration_handler_through_facade() {
    let dir = tempfile::tempdir().unwrap();
    let db = InMemoryDatabase::new();
    let mut migrator = migrator_with_steps(&db, FileStateStore::new(dir.path().join("state.json")));

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        migrator.on_post_migration(move |event| {
            seen.lock()
                .unwrap()
                .push((event.plan_name.clone(), event.product.clone()));
            Ok(())
        });
    }

    let plan = MigrationPlan::new("default")
        .with_product("cms")
        .from("")
        .to("aaa", "step-a");
    migrator.run(&plan).unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [("default".to_string(), Some("cms".to_string()))]
    );
}
