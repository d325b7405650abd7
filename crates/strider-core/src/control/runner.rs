//! Wiring the engine to its cycle loop
//!
//! The engine itself is single-threaded; the runner owns it on a dedicated
//! thread, delivers the freshest pending operator command ahead of each
//! cycle, and hands back a handle for command ingress, telemetry
//! subscription, and shutdown.

use crate::comm::{bounded_channel, Sender};
use crate::Result;

use super::command::QuadrupedCommand;
use super::control_loop::{ControlLoop, ControlLoopConfig, ControlLoopHandle, ControlLoopStats};
use super::engine::QuadrupedEngine;
use super::telemetry::Telemetry;

/// Pending commands tolerated between cycles; the loop drains to the
/// newest one each tick
const COMMAND_BUFFER: usize = 64;

/// Handle to a running engine
pub struct EngineHandle {
    commands: Sender<QuadrupedCommand>,
    telemetry: Telemetry,
    loop_handle: ControlLoopHandle,
}

impl EngineHandle {
    /// Post an operator command
    ///
    /// A command posted between cycles is consumed by the next controller
    /// run; one posted during a cycle is seen the cycle after. A later
    /// command overwrites an earlier unobserved one.
    pub fn command(&self, command: QuadrupedCommand) -> Result<()> {
        self.commands.send(command)
    }

    /// The engine's telemetry topics
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Cycle timing statistics
    pub fn stats(&self) -> ControlLoopStats {
        self.loop_handle.stats()
    }

    /// Whether the cycle loop is still running
    pub fn is_running(&self) -> bool {
        self.loop_handle.is_running()
    }

    /// Stop the loop and wait for the cycle in progress to finish
    ///
    /// Any in-flight bus transaction completes before the thread exits. A
    /// fatal engine error that stopped the loop earlier surfaces here.
    pub fn join(self) -> Result<()> {
        drop(self.commands);
        self.loop_handle.join()
    }
}

/// Spawn an engine on its own cycle thread
///
/// The loop period comes from the engine's [`Parameters`] (`period_s`).
///
/// [`Parameters`]: super::Parameters
pub fn spawn_engine(mut engine: QuadrupedEngine) -> EngineHandle {
    let telemetry = engine.telemetry().clone();
    let (command_tx, command_rx) = bounded_channel::<QuadrupedCommand>(COMMAND_BUFFER);

    let config = ControlLoopConfig::new(engine.parameters().period_s).with_name("qc_cycle");

    let loop_handle = ControlLoop::spawn(config, move |_iteration| {
        if let Some(command) = command_rx.latest() {
            engine.command(command);
        }
        engine.run_cycle()?;
        Ok(true)
    });

    EngineHandle {
        commands: command_tx,
        telemetry,
        loop_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockClient;
    use crate::config::test_fixtures::test_config;
    use crate::control::{Mode, Parameters};
    use std::time::Duration;

    fn test_engine(client: &MockClient) -> QuadrupedEngine {
        let mut engine = QuadrupedEngine::new(
            test_config(),
            Parameters {
                period_s: 0.002,
                ..Default::default()
            },
        )
        .unwrap();
        engine.set_client(Box::new(client.clone()));
        engine
    }

    #[test]
    fn test_runner_cycles_and_shuts_down() {
        let client = MockClient::new();
        let handle = spawn_engine(test_engine(&client));
        let status_rx = handle.telemetry().status.subscribe();

        let status = status_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("no status published");
        assert_eq!(status.mode, Mode::Stopped);
        assert_eq!(status.state.joints.len(), 12);

        handle.join().unwrap();
        assert!(client.transaction_count() > 0);
    }

    #[test]
    fn test_runner_applies_latest_command() {
        let client = MockClient::new();
        let handle = spawn_engine(test_engine(&client));
        let status_rx = handle.telemetry().status.subscribe();

        // Two commands before the next cycle: only the newer mode wins.
        handle
            .command(QuadrupedCommand {
                mode: Mode::Joint,
                ..Default::default()
            })
            .unwrap();
        handle
            .command(QuadrupedCommand {
                mode: Mode::ZeroVelocity,
                ..Default::default()
            })
            .unwrap();

        let mut saw_zero_velocity = false;
        for _ in 0..50 {
            match status_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                Some(status) if status.mode == Mode::ZeroVelocity => {
                    saw_zero_velocity = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_zero_velocity);

        handle.join().unwrap();
    }

    #[test]
    fn test_runner_surfaces_fatal_bus_error() {
        let client = MockClient::new();
        let handle = spawn_engine(test_engine(&client));

        // Let it cycle, then kill the link.
        std::thread::sleep(Duration::from_millis(20));
        client.fail_next("link down");
        std::thread::sleep(Duration::from_millis(20));

        let err = handle.join().unwrap_err();
        assert!(err.to_string().contains("link down"));
    }
}
