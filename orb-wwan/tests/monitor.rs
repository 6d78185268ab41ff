use color_eyre::eyre::eyre;
use fixture::*;
use orb_wwan::{
    at::SmsOutcome,
    connection::{ConnectionState, FailureReason},
    flag::{FlagStore, MemoryFlagStore},
    monitor::{ConnectivityMonitor, Cycle},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;


const UP: bool = true;
const DOWN: bool = false;

type Events = Arc<Mutex<Vec<&'static str>>>;

#[tokio::test]
async fn one_alert_per_contiguous_outage() {
    // Arrange
    let samples = [DOWN, DOWN, DOWN, UP, DOWN];

    let mut sms = MockSms::new();
    sms.expect_notify()
        .times(2)
        .returning(|_| SmsOutcome::Sent);

    let flag = Arc::new(MemoryFlagStore::default());

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&samples))
        .connector(always_up())
        .notifier(sms)
        .flag(flag.clone())
        .poll_interval(Duration::ZERO)
        .build();

    // Act
    let mut cycles = Vec::new();
    for _ in samples {
        cycles.push(monitor.tick().await);
    }

    // Assert
    assert_eq!(
        cycles,
        vec![
            Cycle::Alerted(ConnectionState::Up),
            Cycle::Suppressed,
            Cycle::Suppressed,
            Cycle::Recovered,
            Cycle::Alerted(ConnectionState::Up),
        ]
    );
    assert!(flag.is_set().await.unwrap());
}

#[tokio::test]
async fn outage_then_recovery_runs_connect_alert_persist_clear() {
    // Arrange
    let events: Events = Arc::default();
    let notified = Arc::new(AtomicBool::new(false));

    let mut link = MockLink::new();
    let ev = events.clone();
    link.expect_connect().times(1).returning(move || {
        ev.lock().unwrap().push("connect");
        ConnectionState::Up
    });

    let mut sms = MockSms::new();
    let ev = events.clone();
    sms.expect_notify().times(1).returning(move |_| {
        ev.lock().unwrap().push("sms");
        SmsOutcome::Sent
    });

    let mut flag = MockFlag::new();
    let state = notified.clone();
    flag.expect_is_set()
        .returning(move || Ok(state.load(Ordering::SeqCst)));
    let (ev, state) = (events.clone(), notified.clone());
    flag.expect_set().times(1).returning(move || {
        ev.lock().unwrap().push("flag set");
        state.store(true, Ordering::SeqCst);
        Ok(())
    });
    let (ev, state) = (events.clone(), notified.clone());
    flag.expect_clear().times(1).returning(move || {
        ev.lock().unwrap().push("flag clear");
        state.store(false, Ordering::SeqCst);
        Ok(())
    });

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN, DOWN, UP]))
        .connector(link)
        .notifier(sms)
        .flag(flag)
        .build();

    // Act
    for _ in 0..3 {
        monitor.tick().await;
    }

    // Assert
    assert_eq!(
        *events.lock().unwrap(),
        vec!["connect", "sms", "flag set", "flag clear"]
    );
    assert!(!notified.load(Ordering::SeqCst));
}

#[tokio::test]
async fn undelivered_alert_is_not_persisted_and_retried() {
    // Arrange
    let mut sends = 0;
    let mut sms = MockSms::new();
    sms.expect_notify().times(2).returning(move |_| {
        sends += 1;
        if sends == 1 {
            SmsOutcome::Failed("+CMS ERROR: 500".into())
        } else {
            SmsOutcome::Sent
        }
    });

    let flag = Arc::new(MemoryFlagStore::default());

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN, DOWN, DOWN]))
        .connector(always_up())
        .notifier(sms)
        .flag(flag.clone())
        .build();

    // Act
    let first = monitor.tick().await;
    let flagged_after_first = flag.is_set().await.unwrap();
    let second = monitor.tick().await;
    let third = monitor.tick().await;

    // Assert
    assert_eq!(first, Cycle::AlertFailed(ConnectionState::Up));
    assert!(!flagged_after_first);
    assert_eq!(second, Cycle::Alerted(ConnectionState::Up));
    assert_eq!(third, Cycle::Suppressed);
    assert!(flag.is_set().await.unwrap());
}

#[tokio::test]
async fn failed_reconnect_is_retried_without_realerting() {
    // Arrange
    let mut attempts = 0;
    let mut link = MockLink::new();
    link.expect_connect().times(2).returning(move || {
        attempts += 1;
        if attempts == 1 {
            ConnectionState::Failed(FailureReason::NotRegistered)
        } else {
            ConnectionState::Up
        }
    });

    let mut sms = MockSms::new();
    sms.expect_notify()
        .withf(|text| text.contains("not registered"))
        .times(1)
        .returning(|_| SmsOutcome::Sent);

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN, DOWN, DOWN]))
        .connector(link)
        .notifier(sms)
        .flag(MemoryFlagStore::default())
        .build();

    // Act
    let first = monitor.tick().await;
    let second = monitor.tick().await;
    let third = monitor.tick().await;

    // Assert
    assert_eq!(
        first,
        Cycle::Alerted(ConnectionState::Failed(FailureReason::NotRegistered))
    );
    assert_eq!(second, Cycle::Reconnected(ConnectionState::Up));
    assert_eq!(third, Cycle::Suppressed);
}

#[tokio::test]
async fn flag_persisted_before_restart_suppresses_the_alert() {
    // Arrange
    let flag = Arc::new(MemoryFlagStore::default());
    flag.set().await.unwrap();

    let mut sms = MockSms::new();
    sms.expect_notify().never();

    let mut link = MockLink::new();
    link.expect_connect()
        .times(1)
        .returning(|| ConnectionState::Up);

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN, DOWN]))
        .connector(link)
        .notifier(sms)
        .flag(flag.clone())
        .build();

    // Act
    let first = monitor.tick().await;
    let second = monitor.tick().await;

    // Assert
    assert_eq!(first, Cycle::Reconnected(ConnectionState::Up));
    assert_eq!(second, Cycle::Suppressed);
    assert!(flag.is_set().await.unwrap());
}

#[tokio::test]
async fn unreadable_flag_counts_as_not_notified() {
    // Arrange
    let mut flag = MockFlag::new();
    flag.expect_is_set()
        .returning(|| Err(eyre!("permission denied")));
    flag.expect_set().times(1).returning(|| Ok(()));

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN]))
        .connector(always_up())
        .notifier(delivering_sms())
        .flag(flag)
        .build();

    // Act
    let cycle = monitor.tick().await;

    // Assert
    assert_eq!(cycle, Cycle::Alerted(ConnectionState::Up));
}

#[tokio::test]
async fn healthy_link_does_nothing() {
    // Arrange
    let mut link = MockLink::new();
    link.expect_connect().never();

    let mut sms = MockSms::new();
    sms.expect_notify().never();

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[UP, UP]))
        .connector(link)
        .notifier(sms)
        .flag(MemoryFlagStore::default())
        .build();

    // Act
    let first = monitor.tick().await;
    let second = monitor.tick().await;

    // Assert
    assert_eq!(first, Cycle::Up);
    assert_eq!(second, Cycle::Up);
}

#[tokio::test]
async fn run_returns_once_cancelled() {
    // Arrange
    let cancel = CancellationToken::new();

    let mut probe = MockProbe::new();
    let stop = cancel.clone();
    probe.expect_probe().times(1).returning(move || {
        stop.cancel();
        UP
    });

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe)
        .connector(always_up())
        .notifier(delivering_sms())
        .flag(MemoryFlagStore::default())
        .poll_interval(Duration::from_secs(3600))
        .cancel(cancel)
        .build();

    // Act
    tokio::time::timeout(Duration::from_secs(5), monitor.run())
        .await
        .expect("monitor did not stop after cancellation");
}

#[tokio::test]
async fn cancelled_reconnect_sends_no_alert() {
    // Arrange
    let cancel = CancellationToken::new();

    let mut link = MockLink::new();
    let stop = cancel.clone();
    link.expect_connect().times(1).returning(move || {
        stop.cancel();
        ConnectionState::Failed(FailureReason::Cancelled)
    });

    let mut sms = MockSms::new();
    sms.expect_notify().never();

    let flag = Arc::new(MemoryFlagStore::default());

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&[DOWN, DOWN]))
        .connector(link)
        .notifier(sms)
        .flag(flag.clone())
        .poll_interval(Duration::from_secs(3600))
        .cancel(cancel)
        .build();

    // Act
    tokio::time::timeout(Duration::from_secs(5), monitor.run())
        .await
        .expect("monitor did not stop after cancellation");
    let after = monitor.tick().await;

    // Assert
    assert_eq!(after, Cycle::Cancelled);
    assert!(!flag.is_set().await.unwrap());
}

#[tokio::test]
async fn unpersistable_flag_still_alerts_once_per_outage() {
    // Arrange
    let mut flag = MockFlag::new();
    flag.expect_is_set().returning(|| Ok(false));
    flag.expect_set()
        .returning(|| Err(eyre!("read-only file system")));
    flag.expect_clear().times(1).returning(|| Ok(()));

    let mut sms = MockSms::new();
    sms.expect_notify()
        .times(2)
        .returning(|_| SmsOutcome::Sent);

    let samples = [DOWN, DOWN, DOWN, DOWN, DOWN, UP, DOWN];

    let mut monitor = ConnectivityMonitor::builder()
        .probe(probe_script(&samples))
        .connector(always_up())
        .notifier(sms)
        .flag(flag)
        .build();

    // Act
    let mut cycles = Vec::new();
    for _ in samples {
        cycles.push(monitor.tick().await);
    }

    // Assert
    assert_eq!(
        cycles,
        vec![
            Cycle::Alerted(ConnectionState::Up),
            Cycle::Suppressed,
            Cycle::Suppressed,
            Cycle::Suppressed,
            Cycle::Suppressed,
            Cycle::Recovered,
            Cycle::Alerted(ConnectionState::Up),
        ]
    );
}
