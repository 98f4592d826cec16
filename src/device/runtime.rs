//! Device bring-up and the thread-safe control handle.
//!
//! ```text
//! Device::start
//!   ├─ AudioPipeline::new        (falls back to no codec on bad hardware)
//!   ├─ Starting
//!   ├─ audio loop thread         ("audio-loop")
//!   ├─ NetworkChannel::start     (callbacks → Command)
//!   ├─ Idle
//!   ├─ main loop thread          ("main-loop", owns Application)
//!   ├─ clock thread              ("clock", ClockTick)
//!   └─ upgrade/activation flow   ("upgrade-check")
//! ```

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::audio::{
    AudioCodec, AudioPipeline, AudioProcessor, OpusFactory, PipelineError, SoundBank,
    WakeWordDetector,
};
use crate::config::DeviceConfig;
use crate::scheduler::{MainLoopHandle, Scheduler};
use crate::upgrade::{FlowOutcome, UpgradeFlow, UpgradeService};

use super::{
    Application, Board, ChannelEvents, Command, DeviceState, NetworkChannel, StateCell,
};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("audio pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

fn spawn_err(name: &'static str) -> impl FnOnce(io::Error) -> DeviceError {
    move |source| DeviceError::Spawn { name, source }
}

/// Everything the platform supplies.
pub struct Collaborators {
    /// `None` runs the device without audio.
    pub codec: Option<Arc<dyn AudioCodec>>,
    pub opus: Arc<dyn OpusFactory>,
    pub network: Box<dyn NetworkChannel>,
    pub board: Arc<dyn Board>,
    pub sounds: Arc<dyn SoundBank>,
    pub upgrade: Box<dyn UpgradeService>,
    pub processor: Option<Box<dyn AudioProcessor>>,
    pub wake_word: Option<Box<dyn WakeWordDetector>>,
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A running device.  All methods are safe to call from any thread; requests
/// are queued for the main loop.
pub struct Device {
    scheduler: Scheduler<Command>,
    state: StateCell,
    pipeline: Arc<AudioPipeline>,
    main_loop: MainLoopHandle,
    audio_loop: Option<JoinHandle<()>>,
    upgrade: JoinHandle<FlowOutcome>,
}

impl Device {
    pub fn start(config: DeviceConfig, parts: Collaborators) -> Result<Device, DeviceError> {
        let Collaborators {
            codec,
            opus,
            network,
            board,
            sounds,
            upgrade,
            processor,
            wake_word,
        } = parts;

        log::info!("device: starting on board '{}'", board.board_type());

        let (scheduler, queue) = Scheduler::channel();
        let state = StateCell::default();

        let build = |codec| {
            AudioPipeline::new(
                &config.audio,
                codec,
                Arc::clone(&opus),
                Arc::clone(&board),
                scheduler.clone(),
                state.clone(),
            )
        };
        let mut pipeline = match build(codec) {
            Err(PipelineError::UnsupportedChannels(channels)) => {
                log::error!(
                    "device: codec has {channels} input channels, continuing without audio"
                );
                build(None)?
            }
            other => other?,
        };
        if let Some(processor) = processor {
            pipeline = pipeline.with_processor(processor);
        }
        if let Some(detector) = wake_word {
            pipeline = pipeline.with_wake_word(detector);
        }
        let pipeline = Arc::new(pipeline);

        let mut app = Application::new(
            config.clone(),
            network,
            board,
            Arc::clone(&pipeline),
            sounds,
            state.clone(),
        );
        app.set_device_state(DeviceState::Starting);

        let audio_loop = pipeline.spawn_loop().map_err(spawn_err("audio-loop"))?;
        app.start_network(ChannelEvents::new(scheduler.clone()));
        app.set_device_state(DeviceState::Idle);

        let main_loop = queue
            .spawn(move |command| app.handle(command))
            .map_err(spawn_err("main-loop"))?;

        let interval = config.diagnostics.clock_interval();
        if !interval.is_zero() {
            let clock = scheduler.clone();
            thread::Builder::new()
                .name("clock".into())
                .spawn(move || {
                    while !clock.is_closed() {
                        thread::sleep(interval);
                        clock.schedule(Command::ClockTick);
                    }
                })
                .map_err(spawn_err("clock"))?;
        }

        let upgrade = UpgradeFlow::new(upgrade, config.upgrade, scheduler.clone(), state.clone())
            .spawn()
            .map_err(spawn_err("upgrade-check"))?;

        Ok(Device {
            scheduler,
            state,
            pipeline,
            main_loop,
            audio_loop,
            upgrade,
        })
    }

    // ---- requests ---

    pub fn toggle_chat_state(&self) {
        self.scheduler.schedule(Command::ToggleChat);
    }

    pub fn start_listening(&self) {
        self.scheduler.schedule(Command::StartListening);
    }

    pub fn stop_listening(&self) {
        self.scheduler.schedule(Command::StopListening);
    }

    pub fn wake_word_invoke(&self, phrase: impl Into<String>) {
        self.scheduler
            .schedule(Command::WakeWordDetected(phrase.into()));
    }

    pub fn nfc_card_detected(&self, uid: impl Into<String>) {
        self.scheduler.schedule(Command::NfcCardDetected(uid.into()));
    }

    pub fn nfc_card_removed(&self) {
        self.scheduler.schedule(Command::NfcCardRemoved);
    }

    // ---- observation ---

    /// Snapshot of the current state.  May lag the main loop.
    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Handle for queueing arbitrary commands.
    pub fn scheduler(&self) -> Scheduler<Command> {
        self.scheduler.clone()
    }

    pub fn has_audio(&self) -> bool {
        self.pipeline.has_codec()
    }

    pub fn upgrade_finished(&self) -> bool {
        self.upgrade.is_finished()
    }

    /// Block until the main loop exits.  Re-raises a main-loop panic.
    pub fn join(self) {
        self.main_loop.join();
        self.pipeline.stop();
        if let Some(audio) = self.audio_loop {
            let _ = audio.join();
        }
    }
}
