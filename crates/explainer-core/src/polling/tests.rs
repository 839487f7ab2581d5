use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::retry::IdleBackoff;

fn manager() -> (PollingManager, PageLifecycle) {
    let lifecycle = PageLifecycle::new();
    (
        PollingManager::new(ManagerConfig::default(), lifecycle.clone()),
        lifecycle,
    )
}

fn counting(count: &Arc<AtomicUsize>) -> PanelOptions {
    let count = Arc::clone(count);
    PanelOptions::new(move || {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    })
}

fn flag(initial: bool) -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(initial))
}

fn probe(flag: &Arc<AtomicBool>) -> impl Fn() -> bool + Send + Sync + 'static {
    let flag = Arc::clone(flag);
    move || flag.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn test_stats_reflect_registration() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling("x", counting(&calls).interval(Duration::from_millis(3_000)))
        .unwrap();

    let stats = manager.get_stats();
    assert_eq!(stats.total_panels, 1);
    assert!(!stats.global_paused);
    let panel = &stats.panels["x"];
    assert_eq!(panel.current_interval_ms, 3_000);
    assert_eq!(panel.idle_cycles, 0);
    assert!(panel.tab_active);
    assert!(!panel.has_work);
    assert_eq!(panel.poll_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_panel_stops_itself() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .max_idle_cycles(3)
                .has_work(|| false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    // Idle ticks 1 and 2 still poll; tick 3 hits the limit.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.get_stats().total_panels, 0);
    assert!(!manager.stop_polling("queue"));
}

#[tokio::test(start_paused = true)]
async fn test_work_resets_idle_cycles() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let work = flag(true);

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .max_idle_cycles(2)
                .has_work(probe(&work)),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = manager.get_stats();
    assert_eq!(stats.panels["queue"].idle_cycles, 0);
    assert!(stats.panels["queue"].has_work);
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    work.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!manager.stop_polling("queue"));
}

#[tokio::test(start_paused = true)]
async fn test_panel_without_work_requirement_keeps_polling() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "settings",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .max_idle_cycles(1)
                .requires_processing_jobs(false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(manager.get_stats().panels["settings"].idle_cycles, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pause_suppresses_ticks_and_resume_polls_at_once() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(5))
                .has_work(|| true)
                .dynamic_interval(false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    manager.pause_all_polling();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(manager.get_stats().global_paused);

    manager.resume_all_polling();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A second resume while not paused does nothing.
    manager.resume_all_polling();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resume_skips_panels_on_inactive_tabs() {
    let (manager, lifecycle) = manager();
    lifecycle.set_active_tab("queue");
    let on_tab = Arc::new(AtomicUsize::new(0));
    let off_tab = Arc::new(AtomicUsize::new(0));

    for (id, calls) in [("queue", &on_tab), ("history", &off_tab)] {
        manager
            .start_conditional_polling(
                id,
                counting(calls)
                    .interval(Duration::from_secs(5))
                    .has_work(|| true)
                    .dynamic_interval(false),
            )
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    manager.pause_all_polling();
    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.resume_all_polling();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(on_tab.load(Ordering::SeqCst), 2);
    assert_eq!(off_tab.load(Ordering::SeqCst), 0);

    let stats = manager.get_stats();
    assert!(stats.panels["queue"].tab_active);
    assert!(!stats.panels["history"].tab_active);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_tab_does_not_count_as_idle() {
    let (manager, lifecycle) = manager();
    lifecycle.set_active_tab("settings");
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .max_idle_cycles(2)
                .has_work(|| false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.get_stats().panels["queue"].idle_cycles, 0);

    // Switching to the panel's tab polls it without waiting for a tick.
    lifecycle.set_active_tab("queue");
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_stats().panels["queue"].idle_cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_tab_ignored_when_not_required() {
    let (manager, lifecycle) = manager();
    lifecycle.set_active_tab("settings");
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "badge",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .requires_active_tab(false)
                .has_work(|| true)
                .dynamic_interval(false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2_600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_idle_interval_grows_each_window() {
    let lifecycle = PageLifecycle::new();
    let config = ManagerConfig {
        backoff: IdleBackoff {
            window: Duration::from_secs(10),
            step: 1.0,
            max_multiplier: 4.0,
        },
        ..ManagerConfig::default()
    };
    let manager = PollingManager::new(config, lifecycle);
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .requires_processing_jobs(false)
                .has_work(|| false),
        )
        .unwrap();

    // Ticks at 0.5s..9.5s poll; the 10.5s tick only changes the interval.
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(manager.get_stats().panels["queue"].current_interval_ms, 2_000);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(manager.get_stats().panels["queue"].current_interval_ms, 4_000);
}

#[tokio::test(start_paused = true)]
async fn test_work_snaps_to_min_interval() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(5))
                .min_interval(Duration::from_secs(1))
                .has_work(|| true),
        )
        .unwrap();

    // The first tick only switches to the 1s interval.
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_stats().panels["queue"].current_interval_ms, 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_start_replaces_existing_registration() {
    let (manager, _lifecycle) = manager();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let options = |calls: &Arc<AtomicUsize>| {
        counting(calls)
            .interval(Duration::from_secs(1))
            .has_work(|| true)
            .dynamic_interval(false)
    };
    manager.start_conditional_polling("queue", options(&first)).unwrap();
    manager.start_conditional_polling("queue", options(&second)).unwrap();

    tokio::time::sleep(Duration::from_millis(2_600)).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 3);
    assert_eq!(manager.get_stats().total_panels, 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_cycles_leave_one_loop() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = || {
        counting(&calls)
            .interval(Duration::from_secs(1))
            .has_work(|| true)
            .dynamic_interval(false)
    };

    for _ in 0..5 {
        manager.start_conditional_polling("queue", options()).unwrap();
        assert!(manager.stop_polling("queue"));
    }
    manager.start_conditional_polling("queue", options()).unwrap();

    tokio::time::sleep(Duration::from_millis(2_600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_restart_keeps_state_and_changes_interval() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .has_work(|| true)
                .dynamic_interval(false),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(manager.restart_polling("queue", Duration::from_secs(5)));
    let stats = manager.get_stats();
    assert_eq!(stats.panels["queue"].current_interval_ms, 5_000);
    assert_eq!(stats.panels["queue"].poll_count, 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(!manager.restart_polling("missing", Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn test_next_tick_waits_for_slow_callback() {
    let (manager, _lifecycle) = manager();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let options = {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let calls = Arc::clone(&calls);
        PanelOptions::new(move || {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let calls = Arc::clone(&calls);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            }
        })
        .interval(Duration::from_secs(1))
        .has_work(|| true)
        .dynamic_interval(false)
    };
    manager.start_conditional_polling("slow", options).unwrap();

    // Each cycle is 3s of callback plus a 1s wait: starts at 0.5s, 4.5s, 8.5s.
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_drives_pause_and_teardown() {
    let (manager, lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .start_conditional_polling(
            "queue",
            counting(&calls)
                .interval(Duration::from_secs(1))
                .has_work(|| true)
                .dynamic_interval(false),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    lifecycle.set_hidden();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(manager.is_paused());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    lifecycle.set_visible();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!manager.is_paused());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    lifecycle.unload();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(manager.get_stats().total_panels, 0);
}

#[tokio::test]
async fn test_rejects_invalid_registration() {
    let (manager, _lifecycle) = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    assert!(matches!(
        manager.start_conditional_polling("", counting(&calls)),
        Err(PollingError::InvalidPanelId)
    ));
    assert!(matches!(
        manager.start_conditional_polling("queue", counting(&calls).max_idle_cycles(0)),
        Err(PollingError::InvalidOptions { .. })
    ));
    assert_eq!(manager.get_stats().total_panels, 0);
}
