use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mission_supervisor::robot::SimulatorDriver;
use mission_supervisor::{Config, Events, RobotDriver, RobotService, StateMachine, SupervisorHandle};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(?config, "Starting mission supervisor");

    let events = Arc::new(Events::new());
    let cancel = CancellationToken::new();

    let (telemetry, mut receiver) = mission_supervisor::telemetry::channel();
    tokio::spawn(async move {
        while let Some(record) = receiver.records.recv().await {
            info!(record = %serde_json::to_string(&record).unwrap_or_default(), "telemetry");
        }
    });

    // Stands in for the robot vendor driver until one is wired up.
    let driver = Arc::new(SimulatorDriver::new());
    driver.enable_battery_jitter();

    let service = RobotService::spawn(
        Arc::clone(&driver) as Arc<dyn RobotDriver>,
        Arc::clone(&events),
        &config,
        cancel.clone(),
    );
    let machine = StateMachine::new(
        config.clone(),
        Arc::clone(&events),
        telemetry,
        cancel.clone(),
    );
    let machine_task = machine.start();

    let handle = SupervisorHandle::new(Arc::clone(&events), config.ack_timeout);
    info!(state = ?handle.get_state(), "Supervisor running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();
    machine_task.await?;
    service.join().await;
    Ok(())
}
