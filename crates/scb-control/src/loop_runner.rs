//! Loop Runner - 后台控制循环
//!
//! [`ControlLoop`] 在专用线程中按固定频率运行 `constant → pid → endpoint` 链。
//!
//! # 核心功能
//!
//! - **精确定时**: 绝对时间锚点 + `spin_sleep` 补偿残余时间，周期不累积漂移
//! - **dt 钳位**: 实际 dt 超过 `dt_clamp_multiplier` 倍标称周期时调用 `on_time_jump()`
//! - **自动整定**: 有通道增益全零时，先逐个通道做继电器整定，完成后写零并暂停
//! - **错误计数**: 端点读写失败只记录和计数，循环继续运行，不重试
//!
//! # 生命周期
//!
//! ```text
//! Built ──start──► Running ◄──resume── Paused
//!                     └──────pause──────►┘
//! (any) ──stop──► Stopped（终态）
//! ```
//!
//! 后台线程在 [`ControlLoop::new`] 中创建，`Built` 和 `Paused` 状态下只空转计时，
//! 不调用端点。

use crate::config::{ControlConfig, TuningOptions};
use crate::endpoint::Controllable;
use crate::error::ControlError;
use crate::pid::PidController;
use crate::tuning::{RelayTuner, TunedValues, TunerStep};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use scb_components::CancelToken;
use spin_sleep::SpinSleeper;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 残余等待时间低于此值时改用 spin_sleep
const SPIN_MARGIN: Duration = Duration::from_millis(1);

/// 控制循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// 已创建，未启动
    Built = 0,
    /// 运行中
    Running = 1,
    /// 已暂停（保留 PID 状态）
    Paused = 2,
    /// 已停止（终态）
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Built,
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// 控制循环运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// 成功执行的周期数
    pub ticks: u64,
    /// 失败的周期数
    pub errors: u64,
    /// 最近一次错误
    pub last_error: Option<String>,
}

struct LoopShared {
    state: AtomicU8,
    tuning: AtomicBool,
    setpoints: ArcSwap<Vec<f64>>,
    ticks: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl LoopShared {
    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: LoopState, to: LoopState) -> Result<(), LoopState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LoopState::from_u8)
    }

    fn record_error(&self, name: &str, err: &ControlError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let message = err.to_string();
        let mut last = self.last_error.lock();
        if last.as_deref() == Some(message.as_str()) {
            debug!("Control loop {} tick failed again: {}", name, message);
        } else {
            warn!("Control loop {} tick failed: {}", name, message);
        }
        *last = Some(message);
    }
}

/// 后台线程的停止句柄
///
/// 由 [`ControlLoop::request_stop`] 返回，在不持有其他锁的地方调用
/// [`StopHandle::join`] 等待线程退出。
#[must_use = "the worker keeps running until the handle is joined or dropped"]
pub struct StopHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl StopHandle {
    /// 等待后台线程退出
    pub fn join(self) -> Result<(), ControlError> {
        self.handle.join().map_err(|_| {
            tracing::error!("Control loop {} worker panicked", self.name);
            ControlError::WorkerPanicked
        })?;
        debug!("Control loop {} worker joined", self.name);
        Ok(())
    }
}

/// 后台控制循环
///
/// Drop 时停止并等待后台线程。
pub struct ControlLoop {
    name: String,
    shared: Arc<LoopShared>,
    constants: HashMap<String, usize>,
    tuned: TunedValues,
    cancel: CancelToken,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// 校验配置并创建后台线程（状态为 `Built`）
    ///
    /// `tuned` 的槽位数必须等于通道数；增益全零的通道在启动后先做继电器整定。
    pub fn new<C>(
        config: ControlConfig,
        controllable: Arc<C>,
        tuned: TunedValues,
    ) -> Result<Self, ControlError>
    where
        C: Controllable + 'static,
    {
        let topology = config.validate()?;
        let channel_count = topology.channels.len();
        if tuned.len() != channel_count {
            return Err(ControlError::InvalidConfig(format!(
                "Tuned slots ({}) do not match channel count ({})",
                tuned.len(),
                channel_count
            )));
        }

        let constants: HashMap<String, usize> = topology
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| (ch.constant.clone(), i))
            .collect();
        let pending_tuning: VecDeque<usize> = topology
            .channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.pid.needs_auto_tuning())
            .map(|(i, _)| i)
            .collect();

        let shared = Arc::new(LoopShared {
            state: AtomicU8::new(LoopState::Built as u8),
            tuning: AtomicBool::new(!pending_tuning.is_empty()),
            setpoints: ArcSwap::from_pointee(
                topology.channels.iter().map(|ch| ch.initial_setpoint).collect(),
            ),
            ticks: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
        });

        let period = config.period();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let cancel = CancelToken::new();
        let name = topology.controllable.clone();

        let worker = Worker {
            name: name.clone(),
            controllable,
            shared: shared.clone(),
            stop_rx,
            cancel: cancel.clone(),
            tuned: tuned.clone(),
            pids: topology
                .channels
                .iter()
                .map(|ch| {
                    PidController::from_config(&ch.pid)
                        .with_output_limit(ch.output_limit)
                        .with_integral_limit(ch.integral_limit)
                })
                .collect(),
            pending_tuning,
            tuner: None,
            tuning_options: config.tuning.clone(),
            period,
            max_dt: period.mul_f64(config.dt_clamp_multiplier),
        };

        let handle = thread::Builder::new()
            .name(format!("scb-loop-{}", name))
            .spawn(move || worker.run())
            .map_err(|e| ControlError::Spawn(e.to_string()))?;

        info!(
            "Control loop {} built: {} channels at {} Hz{}",
            name,
            channel_count,
            config.frequency_hz,
            if shared.tuning.load(Ordering::Relaxed) {
                " (auto-tuning requested)"
            } else {
                ""
            }
        );

        Ok(Self {
            name,
            shared,
            constants,
            tuned,
            cancel,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// 被控对象名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前状态
    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    /// 是否在运行
    pub fn running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// 是否仍在自动整定
    pub fn is_tuning(&self) -> bool {
        self.shared.tuning.load(Ordering::Acquire)
    }

    /// 整定结果槽位
    pub fn tuned_values(&self) -> &TunedValues {
        &self.tuned
    }

    /// 启动（Built → Running）
    pub fn start(&self) -> Result<(), ControlError> {
        match self.shared.transition(LoopState::Built, LoopState::Running) {
            Ok(()) => {
                info!("Control loop {} started", self.name);
                Ok(())
            },
            Err(LoopState::Stopped) => Err(ControlError::Stopped),
            Err(_) => Err(ControlError::AlreadyStarted),
        }
    }

    /// 暂停（Running → Paused）
    ///
    /// 对 `Built` / `Paused` 是空操作。
    pub fn pause(&self) -> Result<(), ControlError> {
        match self.shared.transition(LoopState::Running, LoopState::Paused) {
            Ok(()) => {
                debug!("Control loop {} paused", self.name);
                Ok(())
            },
            Err(LoopState::Stopped) => Err(ControlError::Stopped),
            Err(_) => Ok(()),
        }
    }

    /// 恢复（Paused → Running）
    ///
    /// 对 `Running` 是空操作。
    pub fn resume(&self) -> Result<(), ControlError> {
        match self.shared.transition(LoopState::Paused, LoopState::Running) {
            Ok(()) => {
                debug!("Control loop {} resumed", self.name);
                Ok(())
            },
            Err(LoopState::Running) => Ok(()),
            Err(LoopState::Built) => Err(ControlError::NotStarted),
            Err(_) => Err(ControlError::Stopped),
        }
    }

    /// 修改常量块的值
    pub fn update_constant_block(&self, name: &str, value: f64) -> Result<(), ControlError> {
        let index = *self
            .constants
            .get(name)
            .ok_or_else(|| ControlError::UnknownBlock {
                name: name.to_string(),
            })?;
        if self.state() == LoopState::Stopped {
            return Err(ControlError::Stopped);
        }
        self.shared.setpoints.rcu(|current| {
            let mut next = current.as_ref().clone();
            next[index] = value;
            next
        });
        Ok(())
    }

    /// 当前设定值（按通道顺序）
    pub fn setpoints(&self) -> Vec<f64> {
        self.shared.setpoints.load().as_ref().clone()
    }

    /// 运行统计
    pub fn stats(&self) -> LoopStats {
        LoopStats {
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
            last_error: self.shared.last_error.lock().clone(),
        }
    }

    /// 请求停止（不阻塞）
    ///
    /// 状态立即变为 `Stopped`，进行中的端点调用收到取消。
    /// 返回的句柄用于等待后台线程退出；重复调用返回 `None`。
    pub fn request_stop(&mut self) -> Option<StopHandle> {
        self.shared.state.store(LoopState::Stopped as u8, Ordering::Release);
        self.cancel.cancel();
        self.stop_tx.take();
        self.handle.take().map(|handle| {
            info!("Control loop {} stopping", self.name);
            StopHandle {
                name: self.name.clone(),
                handle,
            }
        })
    }

    /// 停止并等待后台线程退出（幂等）
    pub fn stop(&mut self) -> Result<(), ControlError> {
        match self.request_stop() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("setpoints", &self.setpoints())
            .finish()
    }
}

struct Worker<C> {
    name: String,
    controllable: Arc<C>,
    shared: Arc<LoopShared>,
    stop_rx: Receiver<()>,
    cancel: CancelToken,
    tuned: TunedValues,
    pids: Vec<PidController>,
    pending_tuning: VecDeque<usize>,
    tuner: Option<(usize, RelayTuner)>,
    tuning_options: TuningOptions,
    period: Duration,
    max_dt: Duration,
}

impl<C: Controllable> Worker<C> {
    fn run(mut self) {
        let sleeper = SpinSleeper::default();
        let mut next_tick = Instant::now() + self.period;
        let mut last_tick: Option<Instant> = None;

        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            if wait > SPIN_MARGIN {
                match self.stop_rx.recv_timeout(wait - SPIN_MARGIN) {
                    Err(RecvTimeoutError::Timeout) => {},
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let remaining = next_tick.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                sleeper.sleep(remaining);
            }

            let now = Instant::now();
            next_tick += self.period;
            if next_tick < now {
                // 超时太久，丢弃错过的周期
                next_tick = now + self.period;
            }

            match self.shared.state() {
                LoopState::Running => {},
                LoopState::Stopped => break,
                LoopState::Built | LoopState::Paused => continue,
            }

            let real_dt = last_tick.map_or(self.period, |t| now.duration_since(t));
            last_tick = Some(now);
            let mut dt = real_dt;
            if real_dt > self.max_dt {
                for pid in &mut self.pids {
                    pid.on_time_jump(real_dt);
                }
                dt = self.max_dt;
            }

            match self.tick(dt, now) {
                Ok(()) => {
                    self.shared.ticks.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => self.shared.record_error(&self.name, &e),
            }
        }

        info!("Control loop {} worker exited", self.name);
    }

    fn tick(&mut self, dt: Duration, now: Instant) -> Result<(), ControlError> {
        let measured = self
            .controllable
            .state(&self.cancel)
            .map_err(|e| ControlError::Endpoint(e.to_string()))?;
        if measured.len() != self.pids.len() {
            return Err(ControlError::DimensionMismatch {
                expected: self.pids.len(),
                actual: measured.len(),
            });
        }

        if self.tuner.is_none()
            && let Some(index) = self.pending_tuning.pop_front()
            && let Some(slot) = self.tuned.get(index)
        {
            info!("Control loop {}: auto-tuning {}", self.name, slot.kind);
            self.tuner = Some((index, RelayTuner::new(slot.kind, self.tuning_options.clone())));
        }

        let step = self
            .tuner
            .as_mut()
            .map(|(index, tuner)| (*index, tuner.step(measured[*index], now)));

        let outputs = match step {
            Some((index, TunerStep::Output(u))) => {
                let mut out = vec![0.0; self.pids.len()];
                out[index] = u;
                out
            },
            Some((index, TunerStep::Done(tuned))) => {
                info!(
                    "Control loop {}: tuned {} p={:.4} i={:.4} d={:.4}",
                    self.name, tuned.kind, tuned.p, tuned.i, tuned.d
                );
                self.tuned.set(index, tuned);
                self.pids[index].set_gains(tuned.p, tuned.i, tuned.d);
                self.pids[index].reset();
                self.tuner = None;
                if self.pending_tuning.is_empty() {
                    return self.finish_tuning();
                }
                vec![0.0; self.pids.len()]
            },
            None => {
                let setpoints = self.shared.setpoints.load();
                self.pids
                    .iter_mut()
                    .zip(setpoints.iter().zip(measured.iter()))
                    .map(|(pid, (sp, pv))| pid.tick(*sp, *pv, dt))
                    .collect()
            },
        };

        self.controllable
            .set_state(&self.cancel, &outputs)
            .map_err(|e| ControlError::Endpoint(e.to_string()))
    }

    /// 整定全部完成：写零输出并暂停，等待用户保存增益
    fn finish_tuning(&mut self) -> Result<(), ControlError> {
        let zeros = vec![0.0; self.pids.len()];
        let result = self
            .controllable
            .set_state(&self.cancel, &zeros)
            .map_err(|e| ControlError::Endpoint(e.to_string()));
        self.shared.tuning.store(false, Ordering::Release);
        let _ = self.shared.transition(LoopState::Running, LoopState::Paused);
        info!("Control loop {}: auto-tuning finished, loop paused", self.name);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockConfig;
    use crate::pid::{PidConfig, PidKind};

    #[derive(Debug, thiserror::Error)]
    #[error("plant offline")]
    struct PlantOffline;

    /// 记录写入的单通道对象
    struct Recorder {
        measured: Mutex<f64>,
        writes: Mutex<Vec<Vec<f64>>>,
        fail: AtomicBool,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                measured: Mutex::new(0.0),
                writes: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn write_count(&self) -> usize {
            self.writes.lock().len()
        }
    }

    impl Controllable for Recorder {
        type Error = PlantOffline;

        fn state(&self, _token: &CancelToken) -> Result<Vec<f64>, Self::Error> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(PlantOffline);
            }
            Ok(vec![*self.measured.lock()])
        }

        fn set_state(&self, _token: &CancelToken, signals: &[f64]) -> Result<(), Self::Error> {
            self.writes.lock().push(signals.to_vec());
            Ok(())
        }
    }

    fn single_channel(pid: PidConfig, hz: f64) -> ControlConfig {
        ControlConfig::new(
            vec![
                BlockConfig::constant("sp", 0.0),
                BlockConfig::pid("pid", pid, "sp"),
                BlockConfig::endpoint("ep", "recorder", vec!["pid".to_string()]),
            ],
            hz,
        )
    }

    fn fixed_gains() -> PidConfig {
        PidConfig::new(PidKind::LinearVelocity, 1.0, 0.0, 0.0)
    }

    #[test]
    fn test_built_loop_does_not_call_endpoint() {
        let recorder = Recorder::new();
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 200.0),
            recorder.clone(),
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(control.state(), LoopState::Built);
        assert_eq!(recorder.write_count(), 0);
        control.stop().unwrap();
    }

    #[test]
    fn test_lifecycle_transitions() {
        let recorder = Recorder::new();
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 200.0),
            recorder.clone(),
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();

        assert_eq!(control.resume(), Err(ControlError::NotStarted));
        control.start().unwrap();
        assert_eq!(control.start(), Err(ControlError::AlreadyStarted));
        assert!(control.running());

        control.pause().unwrap();
        control.pause().unwrap();
        assert_eq!(control.state(), LoopState::Paused);
        control.resume().unwrap();
        control.resume().unwrap();
        assert!(control.running());

        control.stop().unwrap();
        control.stop().unwrap();
        assert_eq!(control.state(), LoopState::Stopped);
        assert_eq!(control.pause(), Err(ControlError::Stopped));
        assert_eq!(control.resume(), Err(ControlError::Stopped));
    }

    #[test]
    fn test_running_loop_tracks_setpoint() {
        let recorder = Recorder::new();
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 200.0),
            recorder.clone(),
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();

        control.update_constant_block("sp", 0.4).unwrap();
        assert_eq!(control.setpoints(), vec![0.4]);
        control.start().unwrap();
        thread::sleep(Duration::from_millis(60));
        control.stop().unwrap();

        let writes = recorder.writes.lock().clone();
        assert!(!writes.is_empty());
        // P = 1.0，测量值恒为 0，输出等于设定值
        assert!(writes.iter().all(|w| (w[0] - 0.4).abs() < 1e-9));
        assert!(control.stats().ticks > 0);
    }

    #[test]
    fn test_no_writes_while_paused_or_after_stop() {
        let recorder = Recorder::new();
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 200.0),
            recorder.clone(),
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();
        control.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        control.pause().unwrap();
        // 等待可能正在执行的周期结束
        thread::sleep(Duration::from_millis(20));
        let paused_count = recorder.write_count();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(recorder.write_count(), paused_count);

        control.resume().unwrap();
        thread::sleep(Duration::from_millis(30));
        control.stop().unwrap();
        let stopped_count = recorder.write_count();
        assert!(stopped_count > paused_count);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.write_count(), stopped_count);
    }

    #[test]
    fn test_update_unknown_constant_block() {
        let recorder = Recorder::new();
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 50.0),
            recorder,
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();
        assert_eq!(
            control.update_constant_block("pid", 1.0),
            Err(ControlError::UnknownBlock {
                name: "pid".to_string()
            })
        );
        control.stop().unwrap();
        assert_eq!(control.update_constant_block("sp", 1.0), Err(ControlError::Stopped));
    }

    #[test]
    fn test_endpoint_errors_are_counted_not_fatal() {
        let recorder = Recorder::new();
        recorder.fail.store(true, Ordering::Relaxed);
        let mut control = ControlLoop::new(
            single_channel(fixed_gains(), 200.0),
            recorder.clone(),
            TunedValues::untuned(&[PidKind::LinearVelocity]),
        )
        .unwrap();
        control.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        let stats = control.stats();
        assert!(stats.errors > 0);
        assert_eq!(stats.last_error.as_deref(), Some("Endpoint error: plant offline"));
        assert!(control.running());

        recorder.fail.store(false, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(50));
        assert!(control.stats().ticks > 0);
        control.stop().unwrap();
    }

    #[test]
    fn test_tuned_slot_count_must_match_channels() {
        let result = ControlLoop::new(
            single_channel(fixed_gains(), 10.0),
            Recorder::new(),
            TunedValues::untuned(&PidKind::ALL),
        );
        assert!(matches!(result, Err(ControlError::InvalidConfig(_))));
    }

    #[test]
    fn test_drop_joins_worker() {
        let recorder = Recorder::new();
        {
            let control = ControlLoop::new(
                single_channel(fixed_gains(), 200.0),
                recorder.clone(),
                TunedValues::untuned(&[PidKind::LinearVelocity]),
            )
            .unwrap();
            control.start().unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        let count = recorder.write_count();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.write_count(), count);
        // 后台线程退出后不再持有被控对象
        assert_eq!(Arc::strong_count(&recorder), 1);
    }
}
