use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use smartscreen::settings::load_schedules;
use smartscreen::*;
use tempfile::tempdir;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

fn add(controller: &mut ScheduleSyncController, from: DateTime<Utc>, to: DateTime<Utc>, pct: u8) {
    let index = controller.add_schedule().unwrap();
    controller.set_schedule_brightness(index, pct).unwrap();
    controller
        .edit_schedule(index, Some(from), Some(to))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn committed_settings_survive_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let executor = Arc::new(LocalExecutor::new());

    let mut controller =
        ScheduleSyncController::new(SettingsStore::new(FileStore::open(&path)), executor.clone());
    controller.set_schedule_enabled(true);
    controller.set_refresh_interval(30);
    add(&mut controller, at(8, 0, 45), at(9, 0, 0), 40);
    add(&mut controller, at(20, 0, 0), at(22, 30, 10), 10);
    controller.save_all_settings().await.unwrap();
    assert!(executor.is_scheduling());
    drop(controller);

    let reopened = SettingsStore::new(FileStore::open(&path));
    let restored = ScheduleSyncController::new(reopened, Arc::new(LocalExecutor::new()));
    assert!(restored.config().schedule_enabled);
    assert_eq!(restored.config().refresh_interval, 30);
    assert_eq!(restored.schedules().len(), 2);
    for schedule in restored.schedules() {
        let (from, to) = schedule.bounds().unwrap();
        assert_eq!((from.second(), to.second()), (0, 0));
    }
    assert_eq!(restored.schedules().get(1).unwrap().brightness, 10);
}

#[tokio::test(start_paused = true)]
async fn rejected_commit_keeps_previous_schedules() {
    let store = SettingsStore::in_memory();
    let executor = Arc::new(LocalExecutor::new());
    let mut controller = ScheduleSyncController::new(store.clone(), executor.clone());
    controller.set_schedule_enabled(true);
    add(&mut controller, at(8, 0, 0), at(9, 0, 0), 40);
    controller.save_all_settings().await.unwrap();

    let index = controller.add_schedule().unwrap();
    let edit = controller.edit_schedule(index, Some(at(8, 30, 0)), Some(at(10, 0, 0)));
    assert!(matches!(edit, Err(Error::OverlapConflict(1, 0))));
    controller.set_refresh_interval(60);

    let err = controller.save_all_settings().await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(load_schedules(&store).len(), 1);
    assert_eq!(SyncConfig::load(&store).refresh_interval, 60);
}

#[tokio::test(start_paused = true)]
async fn disabling_stops_executor_scheduling() {
    let executor = Arc::new(LocalExecutor::new());
    let mut controller = ScheduleSyncController::new(SettingsStore::in_memory(), executor.clone());
    controller.set_schedule_enabled(true);
    add(&mut controller, at(6, 0, 0), at(7, 0, 0), 70);
    controller.start_session().await;
    assert!(executor.is_scheduling());
    assert!(controller.is_refreshing());
    assert!(controller.slider_locked());

    controller.set_schedule_enabled(false);
    controller.save_all_settings().await.unwrap();
    assert!(!executor.is_scheduling());
    assert!(!controller.is_refreshing());

    // Nothing left to cancel; the commit still succeeds
    controller.save_all_settings().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slider_burst_sets_only_the_last_value() {
    let executor = Arc::new(LocalExecutor::with_level(50));
    let mut controller = ScheduleSyncController::new(SettingsStore::in_memory(), executor.clone());
    let mut live = controller.live_brightness();
    controller.start_session().await;

    for value in [10, 20, 30] {
        controller.update_brightness(value);
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(executor.level(), 50);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(executor.level(), 30);
    assert_eq!(controller.debounce_state(), DebounceState::Idle);
    assert_eq!(*live.borrow_and_update(), 30);

    controller.shutdown();
}

#[test]
fn router_history_is_shared_through_session_storage() {
    let session = SettingsStore::in_memory();
    let registry = AppRegistry::new(vec![AppEntry::new("uuid", "UUID", "Identifiers")]);

    let mut router = Router::new(registry.clone(), session.clone());
    router.navigate("/").unwrap();
    router.navigate("/app/uuid").unwrap();
    router.navigate("/preferences").unwrap();
    assert_eq!(router.history().entries(), ["/app/uuid"]);

    let mut reloaded = Router::new(registry, session);
    assert!(reloaded.can_go_back());
    assert_eq!(reloaded.back(), Some(&Route::Home));
    assert!(!reloaded.can_go_back());
}
