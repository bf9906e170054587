//! 传感器闭环底盘集成测试
//!
//! 使用 Mock 传感器和底盘验证：
//! 1. 配置阶段的角色分配、依赖查找和错误
//! 2. 开环透传
//! 3. 命令管线与控制循环的交互（暂停、设定值、停止）
//! 4. 单飞取消和关闭

use nalgebra::Vector3;
use scb_base::prelude::*;
use scb_components::mock::{BaseCall, MockBase, MockMovementSensor};
use scb_components::{ComponentError, MovementSensorProperties};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Fixture {
    deps: Dependencies,
    base: Arc<MockBase>,
    velocity: Arc<MockMovementSensor>,
}

fn fixture() -> Fixture {
    let base = Arc::new(MockBase::new("wheels"));
    let velocity = Arc::new(MockMovementSensor::velocities_only("odometry"));
    let mut deps = Dependencies::new();
    deps.add_base(base.clone())
        .add_movement_sensor(velocity.clone())
        .add_movement_sensor(Arc::new(MockMovementSensor::orientation_only("imu")))
        .add_movement_sensor(Arc::new(MockMovementSensor::compass_only("compass")))
        .add_movement_sensor(Arc::new(MockMovementSensor::new("dead")));
    Fixture {
        deps,
        base,
        velocity,
    }
}

fn fixed_gains() -> Vec<PidConfig> {
    vec![
        PidConfig::new(PidKind::LinearVelocity, 0.5, 2.0, 0.0),
        PidConfig::new(PidKind::AngularVelocity, 0.003, 0.03, 0.0),
    ]
}

fn closed_loop_config() -> ScbConfig {
    ScbConfig::new(["odometry", "imu"], "wheels")
        .with_control_parameters(fixed_gains())
        .with_control_frequency(50.0)
}

fn velocity(linear_mmps: f64, angular_dps: f64) -> (Vector3<f64>, Vector3<f64>) {
    (
        Vector3::new(0.0, linear_mmps, 0.0),
        Vector3::new(0.0, 0.0, angular_dps),
    )
}

#[test]
fn test_roles_pick_first_capable_sensor() {
    let f = fixture();
    let config = ScbConfig::new(["dead", "imu", "compass", "odometry"], "wheels");
    let scb = SensorBase::new("scb", &config, &f.deps).unwrap();

    let roles = scb.sensor_roles();
    assert_eq!(roles.orientation.as_deref(), Some("imu"));
    assert_eq!(roles.compass.as_deref(), Some("compass"));
    assert_eq!(roles.velocities.as_deref(), Some("odometry"));
    assert_eq!(roles.position, None);
    assert!(!scb.has_control_loop_plan());
    assert_eq!(f.velocity.property_query_count(), 1);
}

#[test]
fn test_duplicate_orientation_sensors_first_wins() {
    let mut deps = Dependencies::new();
    deps.add_base(Arc::new(MockBase::new("wheels")))
        .add_movement_sensor(Arc::new(MockMovementSensor::new("a")))
        .add_movement_sensor(Arc::new(MockMovementSensor::orientation_only("b")))
        .add_movement_sensor(Arc::new(MockMovementSensor::orientation_only("c")));

    let scb = SensorBase::new("scb", &ScbConfig::new(["a", "b", "c"], "wheels"), &deps).unwrap();
    assert_eq!(scb.sensor_roles().orientation.as_deref(), Some("b"));
}

#[test]
fn test_no_feedback_sensor_is_fatal() {
    let mut deps = Dependencies::new();
    deps.add_base(Arc::new(MockBase::new("wheels")))
        .add_movement_sensor(Arc::new(MockMovementSensor::new("dead")))
        .add_movement_sensor(Arc::new(MockMovementSensor::orientation_only("flaky").with_failing_properties()));

    let err = SensorBase::new("scb", &ScbConfig::new(["dead", "flaky"], "wheels"), &deps).unwrap_err();
    assert_eq!(err, BaseError::NoFeedbackSensor);
    assert!(err.is_fatal());
    assert!(err.is_config_error());
}

#[test]
fn test_missing_dependencies() {
    let f = fixture();

    let err = SensorBase::new("scb", &ScbConfig::new(["ghost"], "wheels"), &f.deps).unwrap_err();
    assert!(matches!(err, BaseError::MissingDependency(ComponentError::NotFound { ref name, .. }) if name == "ghost"));

    let err = SensorBase::new("scb", &ScbConfig::new(["imu"], "tracks"), &f.deps).unwrap_err();
    assert!(matches!(err, BaseError::MissingDependency(_)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let f = fixture();
    let err = SensorBase::new("scb", &ScbConfig::new(Vec::<String>::new(), "wheels"), &f.deps)
        .unwrap_err();
    assert!(matches!(err, BaseError::Config(ConfigError::NoMovementSensor { .. })));
    assert_eq!(
        err.to_string(),
        "Invalid configuration: scb: need at least one movement sensor for base"
    );
}

#[test]
fn test_open_loop_fallback_without_control_parameters() {
    let f = fixture();
    let scb = SensorBase::new("scb", &ScbConfig::new(["odometry"], "wheels"), &f.deps).unwrap();
    assert!(!scb.has_control_loop_plan());

    let (linear, angular) = velocity(300.0, 20.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();

    assert_eq!(f.base.last_call(), Some(BaseCall::SetVelocity { linear, angular }));
    assert_eq!(scb.loop_state(), None);
    assert_eq!(scb.tuning_status(), TuningStatus::NotRequested);
}

#[test]
fn test_control_parameters_without_velocity_sensor_run_open_loop() {
    let f = fixture();
    let config = ScbConfig::new(["imu"], "wheels").with_control_parameters(fixed_gains());
    let scb = SensorBase::new("scb", &config, &f.deps).unwrap();
    assert!(!scb.has_control_loop_plan());

    let (linear, angular) = velocity(100.0, 0.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
    assert_eq!(f.base.last_call(), Some(BaseCall::SetVelocity { linear, angular }));
}

#[test]
fn test_set_velocity_starts_loop_and_pushes_setpoints() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    assert!(scb.has_control_loop_plan());
    assert_eq!(scb.loop_state(), None);

    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();

    assert_eq!(scb.loop_state(), Some(LoopState::Running));
    assert_eq!(scb.setpoints(), Some(vec![0.5, 30.0]));

    thread::sleep(Duration::from_millis(100));
    let (last_linear, last_angular) = f.base.power_calls().last().copied().unwrap();
    assert!(last_linear.y > 0.0);
    assert!(last_angular.z > 0.0);
    assert!(f.velocity.read_count() > 0);
}

#[test]
fn test_set_power_pauses_loop_and_set_velocity_resumes() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    let token = CancelToken::new();

    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&token, linear, angular, None).unwrap();
    thread::sleep(Duration::from_millis(50));

    let manual = (Vector3::new(0.0, 0.2, 0.0), Vector3::new(0.0, 0.0, -0.1));
    scb.set_power(&token, manual.0, manual.1, None).unwrap();
    assert_eq!(scb.loop_state(), Some(LoopState::Paused));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(
        f.base.last_call(),
        Some(BaseCall::SetPower {
            linear: manual.0,
            angular: manual.1
        })
    );

    let (linear, angular) = velocity(200.0, -10.0);
    scb.set_velocity(&token, linear, angular, None).unwrap();
    assert_eq!(scb.setpoints(), Some(vec![0.2, -10.0]));
    assert_eq!(scb.loop_state(), Some(LoopState::Running));
}

#[test]
fn test_stop_zeroes_setpoints_then_stops_base() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    let token = CancelToken::new();

    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&token, linear, angular, None).unwrap();
    thread::sleep(Duration::from_millis(50));

    scb.stop(&token, None).unwrap();
    assert_eq!(scb.setpoints(), Some(vec![0.0, 0.0]));
    assert_eq!(scb.loop_state(), Some(LoopState::Paused));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(f.base.last_call(), Some(BaseCall::Stop));
    assert!(!scb.is_moving(&token).unwrap());
}

#[test]
fn test_stop_cancels_in_flight_set_velocity() {
    let f = fixture();
    f.base.set_velocity_delay(Duration::from_millis(500));
    let scb = Arc::new(SensorBase::new("scb", &ScbConfig::new(["imu"], "wheels"), &f.deps).unwrap());

    let mover = {
        let scb = scb.clone();
        thread::spawn(move || {
            let (linear, angular) = velocity(300.0, 0.0);
            scb.set_velocity(&CancelToken::new(), linear, angular, None)
        })
    };

    thread::sleep(Duration::from_millis(50));
    scb.stop(&CancelToken::new(), None).unwrap();

    let result = mover.join().unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(f.base.calls(), vec![BaseCall::Stop]);
}

#[test]
fn test_cancelled_caller_token_cancels_command() {
    let f = fixture();
    f.base.set_velocity_delay(Duration::from_millis(500));
    let scb = SensorBase::new("scb", &ScbConfig::new(["imu"], "wheels"), &f.deps).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let (linear, angular) = velocity(300.0, 0.0);
    let err = scb.set_velocity(&token, linear, angular, None).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(f.base.call_count(), 0);
}

#[test]
fn test_close_is_idempotent_and_final() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    let token = CancelToken::new();

    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&token, linear, angular, None).unwrap();
    thread::sleep(Duration::from_millis(50));

    scb.close().unwrap();
    assert!(scb.is_closed());
    assert_eq!(scb.loop_state(), None);
    assert_eq!(f.base.last_call(), Some(BaseCall::Stop));

    let calls = f.base.call_count();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(f.base.call_count(), calls);

    scb.close().unwrap();
    assert_eq!(
        scb.set_velocity(&token, linear, angular, None),
        Err(BaseError::Closed)
    );
    assert_eq!(scb.stop(&token, None), Err(BaseError::Closed));
    assert_eq!(scb.reconfigure(&closed_loop_config(), &f.deps), Err(BaseError::Closed));
}

#[test]
fn test_drop_stops_base() {
    let f = fixture();
    {
        let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
        let (linear, angular) = velocity(300.0, 0.0);
        scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
        thread::sleep(Duration::from_millis(40));
    }
    let calls = f.base.call_count();
    assert_eq!(f.base.last_call(), Some(BaseCall::Stop));
    thread::sleep(Duration::from_millis(80));
    assert_eq!(f.base.call_count(), calls);
}

#[test]
fn test_feedback_read_failure_does_not_actuate() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    f.velocity
        .fail_reads(Some(ComponentError::hardware("odometry", "encoder fault")));

    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(f.base.power_calls().is_empty());
    let stats = scb.loop_stats().unwrap();
    assert!(stats.errors > 0);
    assert!(stats.last_error.unwrap().contains("encoder fault"));
}

#[test]
fn test_reconfigure_replaces_roles_and_stops_loop() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
    assert_eq!(scb.loop_state(), Some(LoopState::Running));

    scb.reconfigure(&ScbConfig::new(["compass", "imu"], "wheels"), &f.deps).unwrap();
    assert_eq!(scb.loop_state(), None);
    assert!(!scb.has_control_loop_plan());
    assert_eq!(scb.sensor_roles().compass.as_deref(), Some("compass"));
    assert_eq!(scb.sensor_roles().velocities, None);

    f.base.clear();
    thread::sleep(Duration::from_millis(80));
    assert_eq!(f.base.call_count(), 0);
}

#[test]
fn test_reconfigure_reports_crashed_loop_and_applies_config() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();
    let (linear, angular) = velocity(500.0, 30.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();

    f.velocity.panic_on_read(true);
    thread::sleep(Duration::from_millis(100));
    f.velocity.panic_on_read(false);

    let queries = f.velocity.property_query_count();
    let err = scb.reconfigure(&closed_loop_config(), &f.deps).unwrap_err();
    assert_eq!(err, BaseError::Control(scb_control::ControlError::WorkerPanicked));
    assert_eq!(f.velocity.property_query_count(), queries + 1);

    // 新配置已生效，新的控制循环正常工作
    assert!(scb.has_control_loop_plan());
    assert_eq!(scb.loop_state(), None);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
    assert_eq!(scb.loop_state(), Some(LoopState::Running));
    scb.close().unwrap();
}

#[test]
fn test_failed_reconfigure_leaves_component_unconfigured() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();

    let err = scb.reconfigure(&ScbConfig::new(["dead"], "wheels"), &f.deps).unwrap_err();
    assert_eq!(err, BaseError::NoFeedbackSensor);

    let (linear, angular) = velocity(100.0, 0.0);
    assert_eq!(
        scb.set_velocity(&CancelToken::new(), linear, angular, None),
        Err(BaseError::NotConfigured)
    );
    assert_eq!(scb.heading().unwrap(), (0.0, false));

    scb.reconfigure(&closed_loop_config(), &f.deps).unwrap();
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
}

#[test]
fn test_heading_sources() {
    let imu = Arc::new(MockMovementSensor::orientation_only("imu"));
    let compass = Arc::new(MockMovementSensor::compass_only("compass"));
    let mut deps = Dependencies::new();
    deps.add_base(Arc::new(MockBase::new("wheels")))
        .add_movement_sensor(imu.clone())
        .add_movement_sensor(compass.clone())
        .add_movement_sensor(Arc::new(MockMovementSensor::velocities_only("odometry")));

    imu.set_yaw_degrees(45.0);
    compass.set_compass_heading(90.0);

    let scb = SensorBase::new("scb", &ScbConfig::new(["compass", "imu"], "wheels"), &deps).unwrap();
    let (heading, supported) = scb.heading().unwrap();
    assert!(supported);
    assert!((heading - 45.0).abs() < 1e-9);

    scb.reconfigure(&ScbConfig::new(["compass", "odometry"], "wheels"), &deps).unwrap();
    assert_eq!(scb.heading().unwrap(), (-90.0, true));

    scb.reconfigure(&ScbConfig::new(["odometry"], "wheels"), &deps).unwrap();
    assert_eq!(scb.heading().unwrap(), (0.0, false));

    let err = scb.reconfigure(&ScbConfig::new(["compass"], "wheels"), &deps).unwrap_err();
    assert_eq!(err, BaseError::NoFeedbackSensor);
}

#[test]
fn test_position_sensor_role() {
    let gps = MockMovementSensor::new("gps").with_properties(MovementSensorProperties {
        position_supported: true,
        orientation_supported: true,
        ..Default::default()
    });
    let mut deps = Dependencies::new();
    deps.add_base(Arc::new(MockBase::new("wheels")))
        .add_movement_sensor(Arc::new(gps));

    let scb = SensorBase::new("scb", &ScbConfig::new(["gps"], "wheels"), &deps).unwrap();
    assert_eq!(scb.position_sensor().map(|s| s.name().to_string()), Some("gps".to_string()));
    assert_eq!(scb.sensor_roles().orientation.as_deref(), Some("gps"));
}

#[test]
fn test_do_command() {
    let f = fixture();
    let scb = SensorBase::new("scb", &closed_loop_config(), &f.deps).unwrap();

    let request = json!({"get_tuned_pid": true});
    let response = scb.do_command(request.as_object().unwrap()).unwrap();
    assert_eq!(response.get("control_parameters"), Some(&json!([])));

    let response = scb.do_command(&Extra::new()).unwrap();
    assert!(response.is_empty());
}

#[test]
fn test_pass_through_queries() {
    let f = fixture();
    let scb = SensorBase::new("scb", &ScbConfig::new(["imu"], "wheels"), &f.deps).unwrap();
    let token = CancelToken::new();

    assert_eq!(scb.properties(&token, None).unwrap().width_meters, 0.3);
    assert_eq!(scb.geometries(&token, None).unwrap()[0].label, "wheels");
    assert!(!scb.is_moving(&token).unwrap());
}

#[test]
fn test_sensor_base_nests_as_base() {
    let f = fixture();
    let scb: Arc<dyn Base> =
        Arc::new(SensorBase::new("scb", &ScbConfig::new(["imu"], "wheels"), &f.deps).unwrap());
    assert_eq!(scb.name(), "scb");

    let (linear, angular) = velocity(100.0, 5.0);
    scb.set_velocity(&CancelToken::new(), linear, angular, None).unwrap();
    scb.stop(&CancelToken::new(), None).unwrap();
    assert_eq!(
        f.base.calls(),
        vec![BaseCall::SetVelocity { linear, angular }, BaseCall::Stop]
    );
}
