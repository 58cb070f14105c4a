//! Engine - composites channels into the master frame and schedules ticks
//!
//! Structural state sits behind one `RwLock` used at three levels:
//! - read (`read_recursive()`): lookups, never blocked by a running tick,
//!   even with a writer queued behind it
//! - update (`upgradable_read()`): held for a whole tick; excludes other
//!   ticks and structural writes but lets readers through
//! - write (`write()`): structural mutation, fully exclusive
//!
//! Frames are handed to consumers through a [`DoubleBuffer`].

use crate::blend::BlendMode;
use crate::channel::{Channel, CrossfadeGroup};
use crate::color::{ColorBuffer, ColorSpace};
use crate::double_buffer::DoubleBuffer;
use crate::effect::{run_chain, EffectSlot};
use crate::error::{RenderError, RenderResult};
use crate::event::EventBus;
use crate::model::Model;
use crate::node::Frame;
use crate::output::Output;
use chrono::{Local, NaiveTime};
use crossbeam_channel::Receiver;
use lux_input::{InputQueue, InputSender, MidiMessage};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared handle to a channel owned by the engine
pub type ChannelHandle = Arc<Mutex<Channel>>;

/// Closure run at the start of every rendered tick with the scaled delta (ms)
pub type LoopTask = Box<dyn FnMut(f64) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Engine-wide render settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Precision of channel outputs and the master frame
    pub space: ColorSpace,
    /// Target frame rate of the render thread; 0 runs unthrottled
    pub fps: f64,
    /// Multiplier applied to every tick delta
    pub speed: f64,
    /// Blend merging the A and B crossfader buses
    pub crossfader_blend: BlendMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            space: ColorSpace::Rgb8,
            fps: 60.0,
            speed: 1.0,
            crossfader_blend: BlendMode::Normal,
        }
    }
}

/// Structural and lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ChannelAdded { index: usize },
    ChannelRemoved { index: usize },
    ChannelMoved { from: usize, to: usize },
    EffectAdded { index: usize },
    EffectRemoved { index: usize },
    OutputAdded { name: String },
    OutputRemoved { name: String },
    ModelChanged { size: usize },
    Started,
    Stopped,
    /// The render thread ended because a tick failed
    RenderFailed { message: String },
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// Paused: input was drained, nothing was rendered
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    /// Rendered frames since construction
    pub frames: u64,
    /// Achieved frame rate, exponentially averaged
    pub fps: f64,
    /// Wall time of the last rendered tick
    pub last_frame_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    fps: f64,
    speed: f64,
    crossfader: f64,
    crossfader_blend: BlendMode,
}

/// Everything guarded by the structural lock
struct Structure {
    model: Arc<dyn Model>,
    channels: Vec<ChannelHandle>,
    effects: Mutex<Vec<EffectSlot>>,
    outputs: Mutex<Vec<Box<dyn Output>>>,
    tasks: Mutex<Vec<(TaskId, LoopTask)>>,
}

/// Crossfader bus scratch space
struct Buses {
    left: ColorBuffer,
    right: ColorBuffer,
    merged: ColorBuffer,
}

impl Buses {
    fn new(space: ColorSpace, len: usize) -> Self {
        Self {
            left: ColorBuffer::new(space, len),
            right: ColorBuffer::new(space, len),
            merged: ColorBuffer::new(space, len),
        }
    }
}

pub struct Engine {
    space: ColorSpace,
    structure: RwLock<Structure>,
    buffer: DoubleBuffer,
    buses: Mutex<Buses>,
    settings: Mutex<Settings>,
    input: InputQueue,
    input_events: EventBus<MidiMessage>,
    events: EventBus<EngineEvent>,
    paused: AtomicBool,
    threaded: AtomicBool,
    cancel: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
    stats: Mutex<EngineStats>,
    last_tick: Mutex<Option<Instant>>,
    clock: Mutex<Option<NaiveTime>>,
    next_task: AtomicU64,
}

impl Engine {
    pub fn new(config: EngineConfig, model: Arc<dyn Model>) -> Self {
        let len = model.size();
        info!(pixels = len, space = config.space.name(), fps = config.fps, "engine created");
        Self {
            space: config.space,
            structure: RwLock::new(Structure {
                model,
                channels: Vec::new(),
                effects: Mutex::new(Vec::new()),
                outputs: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            }),
            buffer: DoubleBuffer::new(config.space, len),
            buses: Mutex::new(Buses::new(config.space, len)),
            settings: Mutex::new(Settings {
                fps: config.fps.max(0.0),
                speed: config.speed.max(0.0),
                crossfader: 0.5,
                crossfader_blend: config.crossfader_blend,
            }),
            input: InputQueue::new(),
            input_events: EventBus::new(),
            events: EventBus::new(),
            paused: AtomicBool::new(false),
            threaded: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
            stats: Mutex::new(EngineStats::default()),
            last_tick: Mutex::new(None),
            clock: Mutex::new(None),
            next_task: AtomicU64::new(1),
        }
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    // --- Geometry ---

    pub fn model(&self) -> Arc<dyn Model> {
        Arc::clone(&self.structure.read_recursive().model)
    }

    /// Pixel count of the current geometry
    pub fn len(&self) -> usize {
        self.structure.read_recursive().model.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap the geometry; every buffer is reallocated to the new size
    pub fn set_model(&self, model: Arc<dyn Model>) {
        let mut s = self.structure.write();
        let len = model.size();
        for ch in &s.channels {
            ch.lock().configure(self.space, len);
        }
        self.buffer.reset(self.space, len);
        *self.buses.lock() = Buses::new(self.space, len);
        s.model = model;
        info!(pixels = len, "model changed");
        self.events.emit(EngineEvent::ModelChanged { size: len });
    }

    // --- Channels ---

    /// Append a channel; it renders from the next tick on
    pub fn add_channel(&self, mut channel: Channel) -> ChannelHandle {
        let mut s = self.structure.write();
        let index = s.channels.len();
        channel.configure(self.space, s.model.size());
        channel.set_index(index);
        info!(channel = %channel.label(), index, "channel added");

        let handle = Arc::new(Mutex::new(channel));
        s.channels.push(Arc::clone(&handle));
        self.events.emit(EngineEvent::ChannelAdded { index });
        handle
    }

    /// Remove a channel, deactivating its patterns
    pub fn remove_channel(&self, index: usize) -> RenderResult<ChannelHandle> {
        let mut s = self.structure.write();
        RenderError::check_index(index, s.channels.len())?;
        let handle = s.channels.remove(index);
        reindex(&s.channels);
        {
            let mut ch = handle.lock();
            ch.release();
            info!(channel = %ch.label(), index, "channel removed");
        }
        self.events.emit(EngineEvent::ChannelRemoved { index });
        Ok(handle)
    }

    pub fn move_channel(&self, from: usize, to: usize) -> RenderResult<()> {
        let mut s = self.structure.write();
        let len = s.channels.len();
        RenderError::check_index(from, len)?;
        RenderError::check_index(to, len)?;
        if from == to {
            return Ok(());
        }
        let handle = s.channels.remove(from);
        s.channels.insert(to, handle);
        reindex(&s.channels);
        debug!(from, to, "channel moved");
        self.events.emit(EngineEvent::ChannelMoved { from, to });
        Ok(())
    }

    pub fn channel(&self, index: usize) -> Option<ChannelHandle> {
        self.structure.read_recursive().channels.get(index).cloned()
    }

    /// Snapshot of the channel list
    pub fn channels(&self) -> Vec<ChannelHandle> {
        self.structure.read_recursive().channels.clone()
    }

    pub fn channel_count(&self) -> usize {
        self.structure.read_recursive().channels.len()
    }

    /// Run `f` with one channel locked
    pub fn with_channel<R>(&self, index: usize, f: impl FnOnce(&mut Channel) -> R) -> RenderResult<R> {
        let handle = {
            let s = self.structure.read_recursive();
            RenderError::check_index(index, s.channels.len())?;
            Arc::clone(&s.channels[index])
        };
        let mut ch = handle.lock();
        Ok(f(&mut ch))
    }

    /// Swap in a whole new channel list and master chain under one write lock
    ///
    /// `settings` runs while the lock is still held, so no tick can observe a
    /// half-replaced show or a mixer that does not match it.
    pub(crate) fn replace_show(
        &self,
        channels: Vec<Channel>,
        effects: Vec<EffectSlot>,
        settings: impl FnOnce(&Self),
    ) {
        let mut s = self.structure.write();
        let len = s.model.size();

        let old = std::mem::take(&mut s.channels);
        for handle in &old {
            handle.lock().release();
        }
        s.channels = channels
            .into_iter()
            .enumerate()
            .map(|(index, mut channel)| {
                channel.configure(self.space, len);
                channel.set_index(index);
                Arc::new(Mutex::new(channel))
            })
            .collect();
        let added_effects = effects.len();
        let old_effects = std::mem::replace(s.effects.get_mut(), effects);
        let added_channels = s.channels.len();

        for index in (0..old.len()).rev() {
            self.events.emit(EngineEvent::ChannelRemoved { index });
        }
        for index in (0..old_effects.len()).rev() {
            self.events.emit(EngineEvent::EffectRemoved { index });
        }
        for index in 0..added_channels {
            self.events.emit(EngineEvent::ChannelAdded { index });
        }
        for index in 0..added_effects {
            self.events.emit(EngineEvent::EffectAdded { index });
        }
        settings(self);
        info!(channels = added_channels, effects = added_effects, "show replaced");
    }

    // --- Master effects ---

    pub fn add_effect(&self, effect: EffectSlot) -> usize {
        let mut s = self.structure.write();
        let effects = s.effects.get_mut();
        let index = effects.len();
        info!(effect = %effect.label(), index, "master effect added");
        effects.push(effect);
        self.events.emit(EngineEvent::EffectAdded { index });
        index
    }

    pub fn remove_effect(&self, index: usize) -> RenderResult<EffectSlot> {
        let mut s = self.structure.write();
        let effects = s.effects.get_mut();
        RenderError::check_index(index, effects.len())?;
        let slot = effects.remove(index);
        info!(effect = %slot.label(), index, "master effect removed");
        self.events.emit(EngineEvent::EffectRemoved { index });
        Ok(slot)
    }

    pub fn effect_count(&self) -> usize {
        self.structure.read_recursive().effects.lock().len()
    }

    /// Run `f` with the master effect chain locked
    pub fn with_effects<R>(&self, f: impl FnOnce(&mut Vec<EffectSlot>) -> R) -> R {
        let s = self.structure.read_recursive();
        let mut effects = s.effects.lock();
        f(&mut effects)
    }

    // --- Outputs ---

    pub fn add_output(&self, output: Box<dyn Output>) -> usize {
        let mut s = self.structure.write();
        let outputs = s.outputs.get_mut();
        let index = outputs.len();
        let name = output.name().to_string();
        info!(output = %name, index, "output added");
        outputs.push(output);
        self.events.emit(EngineEvent::OutputAdded { name });
        index
    }

    pub fn remove_output(&self, index: usize) -> RenderResult<Box<dyn Output>> {
        let mut s = self.structure.write();
        let outputs = s.outputs.get_mut();
        RenderError::check_index(index, outputs.len())?;
        let output = outputs.remove(index);
        let name = output.name().to_string();
        info!(output = %name, index, "output removed");
        self.events.emit(EngineEvent::OutputRemoved { name });
        Ok(output)
    }

    pub fn output_count(&self) -> usize {
        self.structure.read_recursive().outputs.lock().len()
    }

    // --- Loop tasks ---

    pub fn add_task(&self, task: impl FnMut(f64) + Send + 'static) -> TaskId {
        let id = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let task: LoopTask = Box::new(task);
        self.structure.write().tasks.get_mut().push((id, task));
        id
    }

    /// Returns whether the task existed
    pub fn remove_task(&self, id: TaskId) -> bool {
        let mut s = self.structure.write();
        let tasks = s.tasks.get_mut();
        let before = tasks.len();
        tasks.retain(|(t, _)| *t != id);
        tasks.len() != before
    }

    // --- Input and events ---

    /// Producer handle for a control-surface I/O thread
    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    /// Every input message, in arrival order, as the engine drains them
    pub fn subscribe_input(&self) -> Receiver<MidiMessage> {
        self.input_events.subscribe()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // --- Settings ---

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        debug!(paused, "pause toggled");
    }

    pub fn speed(&self) -> f64 {
        self.settings.lock().speed
    }

    pub fn set_speed(&self, speed: f64) {
        self.settings.lock().speed = speed.max(0.0);
    }

    pub fn fps(&self) -> f64 {
        self.settings.lock().fps
    }

    pub fn set_fps(&self, fps: f64) {
        self.settings.lock().fps = fps.max(0.0);
    }

    /// Crossfader position: 0.0 is all A, 1.0 is all B
    pub fn crossfader(&self) -> f64 {
        self.settings.lock().crossfader
    }

    pub fn set_crossfader(&self, position: f64) {
        if !position.is_nan() {
            self.settings.lock().crossfader = position.clamp(0.0, 1.0);
        }
    }

    pub fn crossfader_blend(&self) -> BlendMode {
        self.settings.lock().crossfader_blend
    }

    pub fn set_crossfader_blend(&self, mode: BlendMode) {
        self.settings.lock().crossfader_blend = mode;
    }

    /// Pin the time of day seen by pattern time windows; `None` uses the local clock
    pub fn set_time_of_day(&self, time: Option<NaiveTime>) {
        *self.clock.lock() = time;
    }

    fn time_of_day(&self) -> NaiveTime {
        self.clock.lock().unwrap_or_else(|| Local::now().time())
    }

    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    // --- Frames ---

    /// Copy the last published frame into `dst`
    pub fn copy_frame(&self, dst: &mut ColorBuffer) {
        self.buffer.copy_into(dst);
    }

    /// The last published frame
    pub fn frame(&self) -> ColorBuffer {
        self.buffer.with_copy(ColorBuffer::clone)
    }

    /// Run `f` against the last published frame without copying it
    pub fn with_frame<R>(&self, f: impl FnOnce(&ColorBuffer) -> R) -> R {
        self.buffer.with_copy(f)
    }

    /// Tick with the wall-clock time since the previous tick
    pub fn tick(&self) -> RenderResult<FrameStatus> {
        let now = Instant::now();
        let delta_ms = {
            let mut last = self.last_tick.lock();
            let delta = last.map_or(0.0, |t| now.duration_since(t).as_secs_f64() * 1000.0);
            *last = Some(now);
            delta
        };
        self.tick_delta(delta_ms)
    }

    /// Render one frame `delta_ms` after the previous one and publish it
    pub fn tick_delta(&self, delta_ms: f64) -> RenderResult<FrameStatus> {
        let status = self.render_frame(delta_ms)?;
        if status == FrameStatus::Rendered {
            self.buffer.flip();
        }
        Ok(status)
    }

    fn render_frame(&self, delta_ms: f64) -> RenderResult<FrameStatus> {
        let started = Instant::now();
        let s = self.structure.upgradable_read();

        for msg in self.input.drain() {
            self.input_events.emit(msg);
            for handle in &s.channels {
                let mut ch = handle.lock();
                if ch.monitor_input() {
                    ch.input(&msg);
                }
            }
        }

        if self.is_paused() {
            return Ok(FrameStatus::Paused);
        }

        let settings = *self.settings.lock();
        let delta = delta_ms.max(0.0) * settings.speed;
        for (_, task) in s.tasks.lock().iter_mut() {
            task(delta);
        }

        let frame = Frame::new(delta, self.time_of_day(), &*s.model);
        let mut acc = self.buffer.render();
        acc.fill_black();

        let mut buses = self.buses.lock();
        let Buses { left, right, merged } = &mut *buses;
        let use_buses = s.channels.iter().any(|h| {
            let ch = h.lock();
            ch.is_enabled() && ch.group() != CrossfadeGroup::Bypass
        });
        if use_buses {
            left.fill_black();
            right.fill_black();
        }

        for handle in &s.channels {
            let mut ch = handle.lock();
            if !ch.is_enabled() {
                continue;
            }
            ch.tick(frame)?;
            let target = match ch.group() {
                CrossfadeGroup::Bypass => &mut *acc,
                CrossfadeGroup::A => &mut *left,
                CrossfadeGroup::B => &mut *right,
            };
            ch.blend_mode().blend_in_place(target, ch.output(), ch.fader())?;
        }

        if use_buses {
            settings.crossfader_blend.blend(left, right, settings.crossfader, merged)?;
            BlendMode::Add.blend_in_place(&mut acc, merged, 1.0)?;
        }
        drop(buses);

        run_chain(&mut s.effects.lock(), frame, &mut acc)?;

        for output in s.outputs.lock().iter_mut() {
            if let Err(e) = output.send(&acc) {
                warn!(output = %output.name(), error = %e, "output send failed");
            }
        }

        let mut stats = self.stats.lock();
        stats.frames += 1;
        stats.last_frame_ms = started.elapsed().as_secs_f64() * 1000.0;
        if delta_ms > 0.0 {
            let instant = 1000.0 / delta_ms;
            stats.fps = if stats.fps == 0.0 { instant } else { stats.fps * 0.9 + instant * 0.1 };
        }
        Ok(FrameStatus::Rendered)
    }

    // --- Threading ---

    pub fn is_threaded(&self) -> bool {
        self.threaded.load(Ordering::Acquire)
    }

    /// Start the render thread; does nothing if it is already running
    ///
    /// A loop that is winding down after a stop request or a failed frame
    /// is joined first, then a fresh one is spawned. From the render thread
    /// itself a pending stop cannot be undone and an error is returned.
    pub fn start(self: &Arc<Self>) -> RenderResult<()> {
        if self.on_render_thread() {
            return if self.cancel.load(Ordering::Acquire) {
                Err(RenderError::Thread("restart requested from the stopping render thread".to_string()))
            } else {
                Ok(())
            };
        }

        let mut slot = self.thread.lock();
        if self.is_threaded() && !self.cancel.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(old) = slot.take() {
            if old.join().is_err() {
                error!("render thread panicked");
            }
            debug!("previous render thread joined");
        }

        self.cancel.store(false, Ordering::Release);
        self.threaded.store(true, Ordering::Release);
        *self.last_tick.lock() = None;

        let engine = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("lux-render".to_string())
            .spawn(move || engine.run_loop())
            .map_err(|e| {
                self.threaded.store(false, Ordering::Release);
                RenderError::Thread(e.to_string())
            })?;

        *slot = Some(handle);
        info!(fps = self.fps(), "render thread started");
        self.events.emit(EngineEvent::Started);
        Ok(())
    }

    /// Stop the render thread
    ///
    /// Off the render thread this blocks until the thread has exited. From
    /// the render thread itself (a loop task) it only requests the stop.
    pub fn stop(&self) {
        if self.on_render_thread() {
            self.cancel.store(true, Ordering::Release);
            return;
        }

        let mut slot = self.thread.lock();
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                error!("render thread panicked");
            }
        }
        self.threaded.store(false, Ordering::Release);
    }

    fn on_render_thread(&self) -> bool {
        *self.thread_id.lock() == Some(thread::current().id())
    }

    fn run_loop(&self) {
        *self.thread_id.lock() = Some(thread::current().id());
        debug!("render loop running");
        let mut last = Instant::now();
        while !self.cancel.load(Ordering::Acquire) {
            let frame_start = Instant::now();
            let delta_ms = frame_start.duration_since(last).as_secs_f64() * 1000.0;
            last = frame_start;

            if let Err(e) = self.tick_delta(delta_ms) {
                error!(error = %e, "render loop terminated by failed frame");
                self.events.emit(EngineEvent::RenderFailed { message: e.to_string() });
                self.cancel.store(true, Ordering::Release);
                break;
            }

            let fps = self.fps();
            if fps > 0.0 {
                let target = Duration::from_secs_f64(1.0 / fps);
                let elapsed = frame_start.elapsed();
                if elapsed < target {
                    thread::sleep(target - elapsed);
                }
            }
        }
        *self.thread_id.lock() = None;
        self.threaded.store(false, Ordering::Release);
        info!(frames = self.stats().frames, "render thread stopped");
        self.events.emit(EngineEvent::Stopped);
    }
}

fn reindex(channels: &[ChannelHandle]) {
    for (i, ch) in channels.iter().enumerate() {
        ch.lock().set_index(i);
    }
}
