//! Rig assembly: map the TOML config onto a `Gantry` (simulated devices by
//! default, rppal drivers behind the `hardware` feature) plus the links the
//! command session runs over.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};
use gantry_config::Config;
use gantry_core::channel::{EncoderChannel, HeightChannel, HeightScale};
use gantry_core::config::{DualAxisCfg, GripperTiming, SafetyCfg, VerticalCfg};
use gantry_core::orchestrator::Gantry;
use gantry_core::sampler::PoseSampler;
use gantry_traits::clock::MonotonicClock;

/// Simulated plant gains: ticks (or height units) of travel per sampler pass
/// at full duty. Sized so no phase can jump across its tolerance band in a
/// single pass.
const SIM_X_GAIN: f32 = 30.0;
const SIM_Y_GAIN: f32 = 20.0;
const SIM_HEIGHT_GAIN: f32 = 0.02;

/// Merge the `[safety]` move cap into the per-axis configs, which carry the
/// watchdog at run time.
fn axis_cfgs(cfg: &Config) -> (DualAxisCfg, gantry_core::config::AxisCfg, VerticalCfg) {
    let mut x: DualAxisCfg = (&cfg.x_axis).into();
    let mut y: gantry_core::config::AxisCfg = (&cfg.y_axis).into();
    let mut z: VerticalCfg = (&cfg.vertical).into();
    x.axis.max_move_ms = cfg.safety.max_move_ms;
    y.max_move_ms = cfg.safety.max_move_ms;
    z.max_move_ms = cfg.safety.max_move_ms;
    (x, y, z)
}

/// Build a fully simulated gantry. The halt flag is polled before every
/// controller step; Ctrl-C sets it.
pub fn sim_gantry(cfg: &Config, scale: HeightScale, halt: Arc<AtomicBool>) -> Result<Gantry> {
    let (x_cfg, y_cfg, z_cfg) = axis_cfgs(cfg);
    let ch = &cfg.channels;
    // A reversed channel models a mirrored mounting: its counter runs
    // backward under positive drive and the decode mirrors it back.
    let mounted = |rev: bool, gain: f32| if rev { -gain } else { gain };
    let (x1_motor, x1_enc) = gantry_hardware::sim_axis(mounted(ch.x1_reversed, SIM_X_GAIN));
    let (x2_motor, x2_enc) = gantry_hardware::sim_axis(mounted(ch.x2_reversed, SIM_X_GAIN));
    let (y_motor, y_enc) = gantry_hardware::sim_axis(mounted(ch.y_reversed, SIM_Y_GAIN));
    let (z_motor, z_sensor) = gantry_hardware::sim_vertical(z_cfg.up_height, SIM_HEIGHT_GAIN);
    let sampler = PoseSampler::spawn(
        EncoderChannel::new(x1_enc, ch.x1_reversed, ch.overflow_limit),
        EncoderChannel::new(x2_enc, ch.x2_reversed, ch.overflow_limit),
        EncoderChannel::new(y_enc, ch.y_reversed, ch.overflow_limit),
        HeightChannel::new(z_sensor, scale),
        Duration::from_millis(cfg.sampler.period_ms),
        Duration::from_millis(cfg.timeouts.sample_ms),
        Arc::new(MonotonicClock::new()),
    );

    tracing::info!("simulated rig assembled");
    Gantry::builder()
        .with_x_motors(x1_motor, x2_motor)
        .with_y_motor(y_motor)
        .with_z_motor(z_motor)
        .with_gripper(gantry_hardware::SimGripper::default())
        .with_sampler(sampler)
        .with_x_cfg(x_cfg)
        .with_y_cfg(y_cfg)
        .with_vertical_cfg(z_cfg)
        .with_geometry((&cfg.geometry).into())
        .with_gripper_timing(GripperTiming::from(&cfg.gripper))
        .with_safety(SafetyCfg::from(&cfg.safety))
        .with_halt_check(move || halt.load(Ordering::Relaxed))
        .try_build()
        .wrap_err("assembling simulated gantry")
}

/// Build the real rig: I2C encoder chain, SPI height ADC, GPIO H-bridges,
/// servo gripper.
#[cfg(feature = "hardware")]
pub fn hardware_gantry(cfg: &Config, scale: HeightScale, halt: Arc<AtomicBool>) -> Result<Gantry> {
    use gantry_hardware::encoder_bus::{self, BusEncoder};
    use gantry_hardware::hbridge::{AdcHeightSensor, HBridgeMotor, ServoGripper};
    use rppal::gpio::Gpio;
    use rppal::i2c::I2c;
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
    use std::sync::Mutex;

    let (x_cfg, y_cfg, z_cfg) = axis_cfgs(cfg);
    let ch = &cfg.channels;

    let bus: encoder_bus::SharedBus =
        Arc::new(Mutex::new(I2c::new().wrap_err("open I2C bus")?));
    encoder_bus::broadcast_reset(&bus).wrap_err("encoder chain broadcast reset")?;
    let x1 = BusEncoder::init(bus.clone(), ch.x1_address, false).wrap_err("init x1 encoder")?;
    let x2 = BusEncoder::init(bus.clone(), ch.x2_address, false).wrap_err("init x2 encoder")?;
    let y = BusEncoder::init(bus.clone(), ch.y_address, ch.y_terminates_chain)
        .wrap_err("init y encoder")?;

    let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)
        .wrap_err("open SPI for height ADC")?;
    let height = AdcHeightSensor::new(spi, ch.height_adc_channel);

    let gpio = Gpio::new().wrap_err("open GPIO")?;
    let pins = &cfg.pins;
    let motor = |fwd: u8, rev: u8| -> Result<HBridgeMotor> {
        Ok(HBridgeMotor::new(
            gpio.get(fwd).wrap_err("claim forward pin")?.into_output(),
            gpio.get(rev).wrap_err("claim reverse pin")?.into_output(),
        ))
    };
    let x1_motor = motor(pins.x1_forward, pins.x1_reverse)?;
    let x2_motor = motor(pins.x2_forward, pins.x2_reverse)?;
    let y_motor = motor(pins.y_forward, pins.y_reverse)?;
    let z_motor = motor(pins.z_forward, pins.z_reverse)?;
    let gripper = ServoGripper::new(
        gpio.get(pins.gripper).wrap_err("claim gripper pin")?.into_output(),
        f64::from(cfg.gripper.open_fraction),
        f64::from(cfg.gripper.closed_fraction),
    );

    let sampler = PoseSampler::spawn(
        EncoderChannel::new(x1, ch.x1_reversed, ch.overflow_limit),
        EncoderChannel::new(x2, ch.x2_reversed, ch.overflow_limit),
        EncoderChannel::new(y, ch.y_reversed, ch.overflow_limit),
        HeightChannel::new(height, scale),
        Duration::from_millis(cfg.sampler.period_ms),
        Duration::from_millis(cfg.timeouts.sample_ms),
        Arc::new(MonotonicClock::new()),
    );

    tracing::info!("hardware rig assembled");
    Gantry::builder()
        .with_x_motors(x1_motor, x2_motor)
        .with_y_motor(y_motor)
        .with_z_motor(z_motor)
        .with_gripper(gripper)
        .with_sampler(sampler)
        .with_x_cfg(x_cfg)
        .with_y_cfg(y_cfg)
        .with_vertical_cfg(z_cfg)
        .with_geometry((&cfg.geometry).into())
        .with_gripper_timing(GripperTiming::from(&cfg.gripper))
        .with_safety(SafetyCfg::from(&cfg.safety))
        .with_halt_check(move || halt.load(Ordering::Relaxed))
        .try_build()
        .wrap_err("assembling hardware gantry")
}

/// Feature-dispatching entry point used by the subcommands.
pub fn build_gantry(cfg: &Config, scale: HeightScale, halt: Arc<AtomicBool>) -> Result<Gantry> {
    #[cfg(feature = "hardware")]
    {
        return hardware_gantry(cfg, scale, halt);
    }
    #[cfg(not(feature = "hardware"))]
    sim_gantry(cfg, scale, halt)
}
