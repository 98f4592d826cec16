//! Version check, upgrade hand-off and activation announcement.
//!
//! Runs on its own thread so the main loop stays responsive while it sleeps
//! between retries and polls.  It never touches device state directly:
//! every state change is a [`Command`] scheduled on the main loop, and the
//! current state is read through the [`StateCell`] snapshot.
//!
//! ```text
//! ┌─▶ check_version ──err──▶ retry (≤ max_retries, fixed delay) ──▶ give up
//! │        │ ok
//! │        ├── new version ──▶ alert, wait for Idle, ApplyUpgrade ──▶ (reboot)
//! │        │
//! │        ├── activation code ──▶ Activate, pause, read code,            │
//! │        │                       poll until Idle or timeout ────────────┤
//! │        │                                                              │
//! │        └── otherwise ──▶ Idle + success sound ──▶ done                │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use crate::audio::Sound;
use crate::config::UpgradeConfig;
use crate::device::{Alert, Command, DeviceState, StateCell};
use crate::scheduler::Scheduler;

use super::UpgradeService;

/// How a run of the flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Every version check in this cycle failed; normal operation continues.
    RetriesExhausted,
    /// A new image was handed to the main loop for commit.
    UpgradeDispatched,
    /// No upgrade, no activation pending; the device is ready.
    Ready,
    /// The main loop went away while the flow was waiting on it.
    Interrupted,
}

pub struct UpgradeFlow {
    service: Box<dyn UpgradeService>,
    config: UpgradeConfig,
    scheduler: Scheduler<Command>,
    state: StateCell,
}

impl UpgradeFlow {
    pub fn new(
        service: Box<dyn UpgradeService>,
        config: UpgradeConfig,
        scheduler: Scheduler<Command>,
        state: StateCell,
    ) -> Self {
        Self {
            service,
            config,
            scheduler,
            state,
        }
    }

    /// Run the flow on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<FlowOutcome>> {
        thread::Builder::new()
            .name("upgrade-check".into())
            .spawn(move || {
                let outcome = self.run();
                log::info!("upgrade: check finished: {outcome:?}");
                outcome
            })
    }

    /// Run the flow to completion on the calling thread.
    pub fn run(mut self) -> FlowOutcome {
        let mut failures = 0u32;

        loop {
            if let Err(e) = self.service.check_version() {
                failures += 1;
                if failures >= self.config.max_retries {
                    log::error!("upgrade: {e}; too many retries, giving up version check");
                    return FlowOutcome::RetriesExhausted;
                }
                log::warn!(
                    "upgrade: {e}; retry in {}s ({failures}/{})",
                    self.config.retry_delay().as_secs(),
                    self.config.max_retries
                );
                thread::sleep(self.config.retry_delay());
                continue;
            }
            failures = 0;

            if self.service.has_new_version() {
                return self.dispatch_upgrade();
            }

            self.service.mark_current_version_valid();

            if self.service.has_activation_code() {
                if !self.announce_activation() {
                    return FlowOutcome::Interrupted;
                }
                self.wait_for_activation();
                continue;
            }

            self.scheduler
                .schedule(Command::EnterState(DeviceState::Idle));
            self.scheduler.schedule(Command::PlaySound(Sound::Success));
            return FlowOutcome::Ready;
        }
    }

    fn dispatch_upgrade(self) -> FlowOutcome {
        let version = self.service.firmware_version().unwrap_or_default();
        log::info!("upgrade: new firmware {version} available");
        self.scheduler.schedule(Command::Alert(
            Alert::new("Upgrade", format!("Upgrading to {version}"), "happy")
                .with_sound(Sound::Upgrade),
        ));

        // Never start mid-conversation.
        loop {
            thread::sleep(self.config.idle_poll());
            if self.scheduler.is_closed() {
                return FlowOutcome::Interrupted;
            }
            if self.state.get() == DeviceState::Idle {
                break;
            }
        }

        self.scheduler.schedule(Command::ApplyUpgrade(self.service));
        FlowOutcome::UpgradeDispatched
    }

    /// Returns `false` if the main loop is gone.
    fn announce_activation(&self) -> bool {
        let code = self.service.activation_code();
        log::info!("upgrade: activation required");

        let (ack, done) = oneshot::channel();
        self.scheduler.schedule(Command::Activate {
            code: code.clone(),
            ack,
        });
        if done.blocking_recv().is_err() {
            return false;
        }

        // Let the prompt play before the digits; the main loop stays free.
        thread::sleep(self.config.announce_delay());
        self.scheduler.schedule(Command::ReadActivationCode(code));
        true
    }

    fn wait_for_activation(&self) {
        for _ in 0..self.config.activation_polls {
            if self.state.get() == DeviceState::Idle {
                return;
            }
            thread::sleep(self.config.activation_poll());
        }
        log::info!("upgrade: activation still pending, checking again");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
