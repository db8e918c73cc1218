//! The device: lifecycle state machine, worker thread, and control surface.
//!
//! Every device owns a dedicated worker thread that runs the backend's I/O
//! loop. The application-facing operations and the worker cooperate
//! through an atomically exchanged state word and three auto-reset events:
//!
//! - `start` flips `Stopped -> Starting`, wakes the worker, and blocks on
//!   the start event until the worker has either entered its loop (having
//!   started the endpoint and, for playback, pre-rolled a full buffer) or
//!   failed. `Started` is published before the event is signaled, so every
//!   observer sees `Started` only after the endpoint really runs.
//! - `stop` flips `Started -> Stopping`, requests a break, and blocks on
//!   the stop event until the worker has wound the endpoint down and
//!   published `Stopped`.
//! - Teardown is infallible: stop if needed (ignoring failures), publish
//!   `Uninitialized`, wake the worker, and join it. Backend resources die
//!   with the worker.
//!
//! The `stopped` callback fires on the worker thread exactly once per
//! `Started -> Stopped` transition, including spontaneous stops when the
//! I/O loop fails mid-run; those failures never surface through `start`'s
//! result channel.

use crate::backend::{BackendKind, DeviceId, EndpointDevice};
use crate::buffer::{CaptureCallback, DataCallback, StoppedCallback};
use crate::config::{DeviceConfig, Direction, ResolvedConfig, StreamParams};
use crate::context::ContextInner;
use crate::engine::{CallbackSlots, Engine};
use crate::error::{Error, Result};
use crate::state::{AtomicDeviceState, DeviceState};
use crate::sync::{Event, WorkerControl, lock};
use oido_core::{ChannelMap, SampleFormat};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// State shared between the control surface and the worker thread.
struct Shared {
    state: AtomicDeviceState,
    /// Serializes start/stop/teardown entries from the application side.
    op_lock: Mutex<()>,
    wakeup: Event,
    start_done: Event,
    stop_done: Event,
    control: WorkerControl,
    /// Start failure reported by the worker before it publishes `Started`.
    work_result: Mutex<Option<Error>>,
    callbacks: Arc<CallbackSlots>,
}

/// An open audio device.
///
/// Dropping the device stops it (if needed) and releases all backend
/// resources.
pub struct Device {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    _context: Arc<ContextInner>,
    client: StreamParams,
    negotiated: ResolvedConfig,
    direction: Direction,
    backend_kind: BackendKind,
}

impl Device {
    pub(crate) fn new(
        context: Arc<ContextInner>,
        direction: Direction,
        id: Option<&DeviceId>,
        config: &DeviceConfig,
        data: Option<DataCallback>,
        capture: Option<CaptureCallback>,
    ) -> Result<Device> {
        let resolved = config.resolve()?;
        let backend_kind = context.backend.kind();

        let endpoint = context.backend.open(direction, id, &resolved)?;
        let negotiated = endpoint.negotiated();
        debug_assert!(negotiated.periods >= 1);
        debug_assert!(negotiated.buffer_size_in_frames >= negotiated.periods);

        let callbacks = Arc::new(CallbackSlots::new());
        callbacks.set_data(data);
        callbacks.set_capture(capture);
        let engine = Engine::new(
            direction,
            resolved.params,
            negotiated.params,
            Arc::clone(&callbacks),
        )?;

        let shared = Arc::new(Shared {
            state: AtomicDeviceState::new(DeviceState::Stopped),
            op_lock: Mutex::new(()),
            wakeup: Event::new(),
            start_done: Event::new(),
            stop_done: Event::new(),
            control: WorkerControl::new(),
            work_result: Mutex::new(None),
            callbacks,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(format!("oido-{direction}"))
            .spawn(move || worker_main(endpoint, engine, &worker_shared))
            .map_err(Error::ThreadSpawn)?;

        tracing::debug!(
            backend = %backend_kind,
            %direction,
            format = %resolved.params.format,
            channels = resolved.params.channels,
            sample_rate = resolved.params.sample_rate,
            buffer = negotiated.buffer_size_in_frames,
            buffer_defaulted = negotiated.buffer_size_defaulted,
            periods = negotiated.periods,
            periods_defaulted = negotiated.periods_defaulted,
            "device initialized"
        );

        Ok(Device {
            shared,
            worker: Some(worker),
            _context: context,
            client: resolved.params,
            negotiated,
            direction,
            backend_kind,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.shared.state.load()
    }

    /// Whether the I/O loop is running.
    pub fn is_started(&self) -> bool {
        self.state() == DeviceState::Started
    }

    /// Playback or capture.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The backend serving this device.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    /// Sample format of the application-facing stream.
    pub fn format(&self) -> SampleFormat {
        self.client.format
    }

    /// Channels of the application-facing stream.
    pub fn channels(&self) -> u16 {
        self.client.channels
    }

    /// Sample rate of the application-facing stream, Hz.
    pub fn sample_rate(&self) -> u32 {
        self.client.sample_rate
    }

    /// Channel layout of the application-facing stream.
    pub fn channel_map(&self) -> &ChannelMap {
        &self.client.channel_map
    }

    /// The endpoint-side parameters the backend negotiated. May differ
    /// from the application-facing parameters; the DSP pipeline bridges
    /// the two.
    pub fn negotiated_params(&self) -> &StreamParams {
        &self.negotiated.params
    }

    /// Endpoint buffer size in frames.
    pub fn buffer_size_in_frames(&self) -> u32 {
        self.negotiated.buffer_size_in_frames
    }

    /// Number of periods in the endpoint buffer.
    pub fn periods(&self) -> u32 {
        self.negotiated.periods
    }

    /// Replace the playback data callback. Takes effect on the next
    /// invocation; never observed torn.
    pub fn set_data_callback(&self, callback: DataCallback) {
        self.shared.callbacks.set_data(Some(callback));
    }

    /// Replace the capture callback.
    pub fn set_capture_callback(&self, callback: CaptureCallback) {
        self.shared.callbacks.set_capture(Some(callback));
    }

    /// Install the stopped callback (see module docs for its ordering).
    pub fn set_stopped_callback(&self, callback: StoppedCallback) {
        self.shared.callbacks.set_stopped(Some(callback));
    }

    /// Start the device: bring the endpoint up (pre-rolling a full buffer
    /// for playback) and enter the I/O loop.
    ///
    /// Blocks until the worker acknowledges. Returns the worker's failure
    /// if the endpoint could not be started.
    pub fn start(&self) -> Result<()> {
        let _guard = lock(&self.shared.op_lock);
        match self.shared.state.load() {
            DeviceState::Stopped => {}
            DeviceState::Starting => return Err(Error::AlreadyStarting),
            DeviceState::Started => return Err(Error::AlreadyStarted),
            DeviceState::Stopping => return Err(Error::Busy("stopping")),
            DeviceState::Uninitialized => return Err(Error::NotInitialized),
        }

        // Drop any latched acknowledgements from a run that ended with no
        // waiter (a spontaneous stop), then hand the worker its orders.
        self.shared.start_done.reset();
        self.shared.stop_done.reset();
        *lock(&self.shared.work_result) = None;

        self.shared.state.swap(DeviceState::Starting);
        self.shared.wakeup.signal();
        self.shared.start_done.wait();

        if self.shared.state.load() == DeviceState::Started {
            Ok(())
        } else {
            Err(lock(&self.shared.work_result).take().unwrap_or_else(|| {
                Error::backend(self.backend_kind, "device failed to start")
            }))
        }
    }

    /// Stop the device: break the I/O loop, stop the endpoint, and wait
    /// for the worker to publish `Stopped`.
    pub fn stop(&self) -> Result<()> {
        let _guard = lock(&self.shared.op_lock);
        self.stop_locked()
    }

    fn stop_locked(&self) -> Result<()> {
        if let Err(actual) = self
            .shared
            .state
            .compare_exchange(DeviceState::Started, DeviceState::Stopping)
        {
            return Err(match actual {
                DeviceState::Stopped => Error::AlreadyStopped,
                DeviceState::Stopping => Error::AlreadyStopping,
                DeviceState::Starting => Error::Busy("starting"),
                DeviceState::Uninitialized => Error::NotInitialized,
                DeviceState::Started => unreachable!("exchange failed with expected state"),
            });
        }
        self.shared.control.request_break();
        self.shared.stop_done.wait();
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        {
            let _guard = lock(&self.shared.op_lock);
            let _ = self.stop_locked();
            self.shared.state.swap(DeviceState::Uninitialized);
            self.shared.wakeup.signal();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        tracing::debug!(backend = %self.backend_kind, "device uninitialized");
    }
}

/// The worker thread: parks on the wakeup event between runs, services one
/// start-run-stop cycle per wakeup, and exits when the device publishes
/// `Uninitialized`.
fn worker_main(mut endpoint: Box<dyn EndpointDevice>, mut engine: Engine, shared: &Arc<Shared>) {
    loop {
        shared.wakeup.wait();
        match shared.state.load() {
            DeviceState::Uninitialized => break,
            DeviceState::Starting => {}
            _ => continue,
        }

        shared.control.clear_break();
        let mut session = match endpoint.open_session(&mut engine) {
            Ok(session) => session,
            Err(error) => {
                tracing::error!(%error, "endpoint start failed");
                *lock(&shared.work_result) = Some(error);
                shared.state.swap(DeviceState::Stopped);
                shared.start_done.signal();
                continue;
            }
        };

        shared.state.swap(DeviceState::Started);
        shared.start_done.signal();

        let run_result = session.run(&mut engine, &shared.control);
        if let Err(error) = session.stop() {
            tracing::warn!(%error, "endpoint stop failed");
        }
        drop(session);

        shared.state.swap(DeviceState::Stopped);
        engine.fire_stopped();
        shared.stop_done.signal();

        if let Err(error) = run_result {
            // A mid-loop failure stops the device; it is reported here and
            // through the stopped callback, never through start's result.
            tracing::error!(%error, "device loop failed");
        }
    }
}
