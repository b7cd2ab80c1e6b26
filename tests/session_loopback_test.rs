//! End-to-end session tests against a loopback controller simulator.

mod common;

use anyhow::Result;
use common::DeviceSimulator;
use robot_link::config::LinkConfig;
use robot_link::{
    CommandKind, LinkError, LinkState, MeasurementField, PidGains, RetryPolicy, SessionDriver,
    SetpointSchedule, TransportError,
};
use std::time::Duration;
use tracing_test::traced_test;

fn config_for(port: u16) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.device.host = "127.0.0.1".to_string();
    config.device.port = port;
    config.device.connect_timeout = Duration::from_millis(500);
    config.device.io_timeout = Duration::from_millis(500);
    config.session.pacing = Duration::from_millis(1);
    config
}

/// A port nothing listens on.
async fn closed_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

// =============================================================================
// Full sessions
// =============================================================================

#[tokio::test]
async fn test_motor_control_session_round_trip() -> Result<()> {
    let sim = DeviceSimulator::start().await?;
    let schedule = SetpointSchedule::motor_control(&[200.0, 0.0], &[-200.0, 0.0])?;

    let mut driver = SessionDriver::from_config(&config_for(sim.port()), schedule);
    let reader = driver.reader();
    assert_eq!(driver.run().await?, 2);

    assert!(reader.is_complete());
    assert_eq!(
        reader.series(MeasurementField::ControlLeft, 0..2),
        vec![200.0, 0.0]
    );
    assert_eq!(
        reader.series(MeasurementField::ControlRight, 0..2),
        vec![-200.0, 0.0]
    );
    assert_eq!(reader.series(MeasurementField::Duration, 0..2), vec![1.0, 2.0]);
    assert_eq!(driver.connection().state(), LinkState::Closed);

    sim.wait_for_frames(3).await?;
    let frames = sim.frames();
    assert_eq!(frames[0].kind, CommandKind::MotorControl);
    assert_eq!(frames[0].payload, vec![200.0, -200.0]);
    assert_eq!(frames[1].payload, vec![0.0, 0.0]);
    assert_eq!(frames[2].kind, CommandKind::ConnectionEnd);
    assert!(frames[2].payload.is_empty());
    assert_eq!(sim.connections(), 1);
    Ok(())
}

#[tokio::test]
async fn test_measurement_only_session() -> Result<()> {
    let sim = DeviceSimulator::start().await?;
    let schedule = SetpointSchedule::measurement_only(5)?;

    let mut driver = SessionDriver::from_config(&config_for(sim.port()), schedule);
    assert_eq!(driver.run().await?, 5);

    sim.wait_for_frames(6).await?;
    let kinds: Vec<CommandKind> = sim.frames().iter().map(|f| f.kind).collect();
    assert_eq!(kinds[..5], [CommandKind::None; 5]);
    assert_eq!(kinds[5], CommandKind::ConnectionEnd);
    Ok(())
}

#[tokio::test]
async fn test_pid_then_speed_profile_on_one_connection() -> Result<()> {
    let sim = DeviceSimulator::start().await?;
    let gains = PidGains::new(0.0, 1.0, 0.0, 0.0);

    let mut driver =
        SessionDriver::from_config(&config_for(sim.port()), SetpointSchedule::pid_left(gains));
    driver.connect().await?;
    driver.drive().await?;

    driver.load_schedule(SetpointSchedule::pid_right(gains));
    driver.drive().await?;

    let profile = SetpointSchedule::speed_control(&[0.0, 200.0, 0.0], &[0.0, -200.0, 0.0])?;
    let speeds = driver.load_schedule(profile);
    assert_eq!(driver.drive().await?, 3);
    driver.close().await?;

    assert_eq!(
        speeds.series(MeasurementField::ControlLeft, 0..3),
        vec![0.0, 200.0, 0.0]
    );

    sim.wait_for_frames(6).await?;
    let frames = sim.frames();
    let kinds: Vec<CommandKind> = frames.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::PidLeft,
            CommandKind::PidRight,
            CommandKind::SpeedControl,
            CommandKind::SpeedControl,
            CommandKind::SpeedControl,
            CommandKind::ConnectionEnd,
        ]
    );
    assert_eq!(frames[0].payload, vec![0.0, 1.0, 0.0, 0.0]);
    assert!(frames.iter().all(|f| f.connection == 0));
    Ok(())
}

// =============================================================================
// Observers
// =============================================================================

#[tokio::test]
async fn test_observer_sees_growing_prefix() -> Result<()> {
    let sim = DeviceSimulator::start().await?;
    let mut config = config_for(sim.port());
    config.session.pacing = Duration::from_millis(5);
    let schedule = SetpointSchedule::measurement_only(20)?;

    let handle = SessionDriver::from_config(&config, schedule).spawn();
    let reader = handle.reader();
    let mut progress = reader.subscribe();

    let mut seen = Vec::new();
    while !reader.is_complete() {
        if progress.changed().await.is_err() {
            break;
        }
        let written = *progress.borrow_and_update();
        seen.push(written);
        // Everything below the published count is already filled in.
        let rows = reader.rows(0..written);
        assert_eq!(rows.len(), written);
        assert!(rows.iter().all(|r| r.duration > 0.0));
    }

    let outcome = handle.join().await?;
    assert_eq!(outcome.result?, 20);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reader.written(), 20);
    Ok(())
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
#[traced_test]
async fn test_dropped_connection_resends_same_timestep() -> Result<()> {
    let sim = DeviceSimulator::start_flaky(1).await?;
    let schedule = SetpointSchedule::motor_control(&[10.0, 20.0], &[-10.0, -20.0])?;

    let mut driver = SessionDriver::from_config(&config_for(sim.port()), schedule);
    let reader = driver.reader();
    assert_eq!(driver.run().await?, 2);
    assert_eq!(driver.connection().reconnects(), 1);

    sim.wait_for_frames(4).await?;
    let frames = sim.frames();
    // First attempt at timestep 0 was swallowed, then resent on a new
    // connection before timestep 1.
    assert_eq!(frames[0].connection, 0);
    assert_eq!(frames[0].payload, vec![10.0, -10.0]);
    assert_eq!(frames[1].connection, 1);
    assert_eq!(frames[1].payload, vec![10.0, -10.0]);
    assert_eq!(frames[2].payload, vec![20.0, -20.0]);
    assert_eq!(frames[3].kind, CommandKind::ConnectionEnd);

    assert_eq!(reader.series(MeasurementField::ControlLeft, 0..2), vec![10.0, 20.0]);
    assert!(logs_contain("Exchange failed, reconnecting"));
    Ok(())
}

#[tokio::test]
async fn test_refused_initial_connect_is_reported() -> Result<()> {
    let port = closed_port().await?;
    let schedule = SetpointSchedule::measurement_only(1)?;

    let mut driver = SessionDriver::from_config(&config_for(port), schedule);
    let err = driver.run().await.unwrap_err();
    assert!(matches!(
        err,
        LinkError::Transport(TransportError::Connect { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_bounded_retry_against_unreachable_controller() -> Result<()> {
    let port = closed_port().await?;
    let mut config = config_for(port);
    config.retry = RetryPolicy::bounded(3, Duration::from_millis(5));
    let schedule = SetpointSchedule::measurement_only(1)?;

    let mut driver = SessionDriver::from_config(&config, schedule);
    let err = driver.drive().await.unwrap_err();
    assert!(matches!(
        err,
        LinkError::RetriesExhausted {
            operation: "exchange",
            attempts: 3
        }
    ));
    assert_eq!(driver.reader().written(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_returns_when_controller_vanishes_mid_session() -> Result<()> {
    let sim = DeviceSimulator::start_flaky(1).await?;
    let mut config = config_for(sim.port());
    // Long enough to take the listener down before the reconnect.
    config.retry = RetryPolicy::bounded(2, Duration::from_millis(200));
    assert_eq!(config.close_retry, RetryPolicy::unbounded());
    let schedule = SetpointSchedule::measurement_only(3)?;

    let handle = SessionDriver::from_config(&config, schedule).spawn();
    sim.wait_for_frames(1).await?;
    drop(sim);

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.join()).await??;
    assert!(matches!(
        outcome.result,
        Err(LinkError::RetriesExhausted {
            operation: "exchange",
            attempts: 2
        })
    ));
    assert_eq!(outcome.driver.connection().state(), LinkState::Closed);
    assert_eq!(outcome.driver.reader().written(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_endless_recovery() -> Result<()> {
    let port = closed_port().await?;
    let mut config = config_for(port);
    config.retry = RetryPolicy {
        max_attempts: None,
        backoff: Duration::from_millis(5),
    };
    let schedule = SetpointSchedule::measurement_only(3)?;

    let handle = SessionDriver::from_config(&config, schedule).spawn_drive();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    handle.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.join()).await??;
    assert!(matches!(outcome.result, Err(LinkError::Cancelled)));
    assert!(outcome.driver.connection().reconnects() > 0);
    Ok(())
}
