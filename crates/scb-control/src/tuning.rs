//! 继电器自动整定
//!
//! Åström–Hägglund 继电器反馈法：用 `±d` 的继电器输出代替 PID，
//! 使系统进入极限环振荡，测量振荡周期 `Tu` 和测量值振幅 `a`：
//!
//! ```text
//! Ku = 4d / (π a)
//! Kp = 0.6 Ku,  Ki = 1.2 Ku / Tu,  Kd = 0.075 Ku Tu
//! ```
//!
//! 整定结果写入 [`TunedValues`]，由配置方并发读取。

use crate::config::TuningOptions;
use crate::pid::{PidConfig, PidKind};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// 振幅下限（低于此值的周期视为无效测量）
const MIN_AMPLITUDE: f64 = 1e-9;

/// 整定结果槽位
///
/// 每个通道一个槽位，初始为增益全零（未整定）。控制循环线程写入，
/// 其他线程无锁读取。克隆共享同一组槽位。
#[derive(Clone)]
pub struct TunedValues {
    slots: Arc<ArcSwap<Vec<PidConfig>>>,
}

impl TunedValues {
    /// 为给定通道创建未整定的槽位
    pub fn untuned(kinds: &[PidKind]) -> Self {
        let slots = kinds.iter().map(|k| PidConfig::untuned(*k)).collect();
        Self {
            slots: Arc::new(ArcSwap::from_pointee(slots)),
        }
    }

    /// 槽位数
    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    /// 是否没有槽位
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取单个槽位
    pub fn get(&self, index: usize) -> Option<PidConfig> {
        self.slots.load().get(index).copied()
    }

    /// 读取全部槽位
    pub fn snapshot(&self) -> Vec<PidConfig> {
        self.slots.load().as_ref().clone()
    }

    /// 写入单个槽位（越界时忽略）
    pub fn set(&self, index: usize, value: PidConfig) {
        self.slots.rcu(|current| {
            let mut next = current.as_ref().clone();
            if let Some(slot) = next.get_mut(index) {
                *slot = value;
            }
            next
        });
    }
}

impl fmt::Debug for TunedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TunedValues").field(&self.snapshot()).finish()
    }
}

/// 整定器单步结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TunerStep {
    /// 本周期的继电器输出
    Output(f64),
    /// 整定完成
    Done(PidConfig),
}

/// 单通道继电器整定器
#[derive(Debug, Clone)]
pub struct RelayTuner {
    kind: PidKind,
    options: TuningOptions,
    high: bool,
    last_switch: Option<Instant>,
    transient_skipped: bool,
    peak_max: f64,
    peak_min: f64,
    periods: Vec<f64>,
    amplitudes: Vec<f64>,
}

impl RelayTuner {
    /// 创建整定器（初始输出为 `+d`）
    pub fn new(kind: PidKind, options: TuningOptions) -> Self {
        Self {
            kind,
            options,
            high: true,
            last_switch: None,
            transient_skipped: false,
            peak_max: f64::NEG_INFINITY,
            peak_min: f64::INFINITY,
            periods: Vec::new(),
            amplitudes: Vec::new(),
        }
    }

    /// 已测得的有效周期数
    pub fn measured_cycles(&self) -> usize {
        self.periods.len()
    }

    /// 输入一个测量值，返回继电器输出或整定结果
    pub fn step(&mut self, measured: f64, now: Instant) -> TunerStep {
        self.peak_max = self.peak_max.max(measured);
        self.peak_min = self.peak_min.min(measured);

        let error = self.options.setpoint - measured;
        let h = self.options.hysteresis;

        if self.high && error < -h {
            self.high = false;
            // 每次高→低切换结束一个完整周期
            if let Some(previous) = self.last_switch {
                let period = now.duration_since(previous).as_secs_f64();
                let amplitude = (self.peak_max - self.peak_min) / 2.0;
                if !self.transient_skipped {
                    self.transient_skipped = true;
                } else if period > 0.0 && amplitude > MIN_AMPLITUDE {
                    self.periods.push(period);
                    self.amplitudes.push(amplitude);
                }
            }
            self.last_switch = Some(now);
            self.peak_max = measured;
            self.peak_min = measured;
        } else if !self.high && error > h {
            self.high = true;
        }

        if self.periods.len() >= self.options.cycles {
            return TunerStep::Done(self.gains());
        }

        let d = self.options.relay_amplitude;
        TunerStep::Output(if self.high { d } else { -d })
    }

    fn gains(&self) -> PidConfig {
        let n = self.periods.len() as f64;
        let tu = self.periods.iter().sum::<f64>() / n;
        let a = self.amplitudes.iter().sum::<f64>() / n;
        let ku = 4.0 * self.options.relay_amplitude / (std::f64::consts::PI * a);
        PidConfig::new(self.kind, 0.6 * ku, 1.2 * ku / tu, 0.075 * ku * tu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// 离散一阶惯性对象：v += (gain * u - v) * alpha
    fn run_tuner(tuner: &mut RelayTuner, alpha: f64, gain: f64, max_steps: usize) -> Option<PidConfig> {
        let start = Instant::now();
        let dt = Duration::from_millis(10);
        let mut v = 0.0;
        for k in 0..max_steps {
            let now = start + dt * k as u32;
            match tuner.step(v, now) {
                TunerStep::Output(u) => v += (gain * u - v) * alpha,
                TunerStep::Done(cfg) => return Some(cfg),
            }
        }
        None
    }

    #[test]
    fn test_tuned_values_slots() {
        let tuned = TunedValues::untuned(&PidKind::ALL);
        assert_eq!(tuned.len(), 2);
        assert!(tuned.get(0).unwrap().needs_auto_tuning());

        let shared = tuned.clone();
        shared.set(1, PidConfig::new(PidKind::AngularVelocity, 1.0, 0.5, 0.0));
        assert!(!tuned.get(1).unwrap().needs_auto_tuning());
        assert!(tuned.get(0).unwrap().needs_auto_tuning());

        // 越界写入被忽略
        tuned.set(5, PidConfig::untuned(PidKind::LinearVelocity));
        assert_eq!(tuned.snapshot().len(), 2);
        assert!(tuned.get(5).is_none());
    }

    #[test]
    fn test_relay_tuner_converges_on_first_order_plant() {
        let mut tuner = RelayTuner::new(PidKind::LinearVelocity, TuningOptions::default());
        let cfg = run_tuner(&mut tuner, 0.5, 1.0, 500).expect("tuner should finish");

        assert_eq!(cfg.kind, PidKind::LinearVelocity);
        assert!(!cfg.needs_auto_tuning());
        assert!(cfg.p > 0.0 && cfg.i > 0.0 && cfg.d > 0.0);
        // Ki / Kp = 2 / Tu
        let tu = 2.0 * cfg.p / cfg.i;
        assert!(tu > 0.0 && tu < 1.0, "tu = {}", tu);
    }

    #[test]
    fn test_relay_tuner_output_sign_follows_error() {
        let mut tuner = RelayTuner::new(PidKind::AngularVelocity, TuningOptions::default());
        let now = Instant::now();
        assert_eq!(tuner.step(0.0, now), TunerStep::Output(0.5));
        // 测量值高于设定值，切换到低
        assert_eq!(tuner.step(1.0, now), TunerStep::Output(-0.5));
        // 测量值低于设定值，切换回高
        assert_eq!(tuner.step(-1.0, now), TunerStep::Output(0.5));
    }

    #[test]
    fn test_relay_tuner_stalls_without_oscillation() {
        let mut tuner = RelayTuner::new(PidKind::LinearVelocity, TuningOptions::default());
        // 增益为零的对象不会越过设定值
        assert!(run_tuner(&mut tuner, 0.5, 0.0, 200).is_none());
        assert_eq!(tuner.measured_cycles(), 0);
    }
}
