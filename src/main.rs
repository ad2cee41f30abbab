// SensorLink - Firmware Entry Point
//
// Boot sequence:
//   1. Logging, device state, writer handles.
//   2. Mount config storage, count the boot, apply the stored periodic tick.
//   3. Bring up LEDs and the wireless bridge.
//   4. Spawn dispatcher, bridge receive, motion, audio and periodic tasks.
//
// A subsystem that fails to come up is logged and left out; the rest keep
// running.
//
// On a host build the same pipeline runs against simulated devices and takes
// hex-encoded command packets on stdin, one per line.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

// ---------------------------------------------------------------------------
// ESP-IDF firmware
// ---------------------------------------------------------------------------

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use anyhow::Context;
    use esp_idf_hal::gpio::{AnyIOPin, IOPin, OutputPin, PinDriver};
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::uart::{self, UartDriver};
    use esp_idf_hal::units::Hertz;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use sensorlink::config::*;
    use sensorlink::drivers::board::{
        bridge_rx_loop, AdcBattery, BridgeTx, EspNvsStorage, GpioLeds, I2sMic, MotionInterrupt,
    };
    use sensorlink::drivers::imu::Mpu6050;
    use sensorlink::drivers::rtc::Pcf8563;
    use sensorlink::pool::BufferPool;
    use sensorlink::tasks::audio::{audio_pipeline, LevelMeter};
    use sensorlink::tasks::dispatcher::{command_queue, Dispatcher};
    use sensorlink::tasks::motion::{init_motion, MotionConfig, MotionPipeline};
    use sensorlink::tasks::periodic::PeriodicTask;
    use sensorlink::telemetry::Telemetry;
    use sensorlink::{ConfigStore, DeviceState};

    pub fn run() -> anyhow::Result<()> {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("SensorLink firmware starting");

        let peripherals = Peripherals::take()?;

        // ---- Device state ------------------------------------------------
        let state = DeviceState::new();
        let command_writer = state.command_writer().context("command writer claimed")?;
        let imu_writer = state.imu_writer().context("IMU writer claimed")?;
        let battery_writer = state.battery_writer().context("battery writer claimed")?;

        // ---- I2C bus (shared between IMU and RTC) ------------------------
        let i2c_config = I2cConfig::new().baudrate(I2C_BAUDRATE_KHZ.kHz().into());
        let i2c: I2cDriver<'static> = I2cDriver::new(
            peripherals.i2c0,
            peripherals.pins.gpio6, // SDA
            peripherals.pins.gpio7, // SCL
            &i2c_config,
        )?;
        log::info!("I2C up on SDA GPIO{} / SCL GPIO{}", PIN_I2C_SDA, PIN_I2C_SCL);
        // The bus lives for the whole programme; firmware never exits.
        let i2c_bus: &'static Mutex<I2cDriver<'static>> = Box::leak(Box::new(Mutex::new(i2c)));

        // ---- Persistent config ---------------------------------------------
        let nvs = EspDefaultNvsPartition::take()?;
        let mut store = ConfigStore::new(EspNvsStorage::new(nvs));
        match store
            .init()
            .and_then(|()| store.read_and_track_boot(&command_writer))
        {
            Ok(record) => log::info!(
                "Boot #{} (unique id 0x{:04x})",
                record.boot_count,
                record.unique_id
            ),
            Err(e) => log::error!("Config unavailable, running on defaults: {}", e),
        }

        // ---- LEDs ----------------------------------------------------------
        let rgb = [
            PinDriver::output(peripherals.pins.gpio2.downgrade_output())?,
            PinDriver::output(peripherals.pins.gpio3.downgrade_output())?,
            PinDriver::output(peripherals.pins.gpio4.downgrade_output())?,
        ];
        let pwm_timer = Box::leak(Box::new(LedcTimerDriver::new(
            peripherals.ledc.timer0,
            &TimerConfig::new().frequency(1.kHz().into()),
        )?));
        let pwm = LedcDriver::new(peripherals.ledc.channel0, &*pwm_timer, peripherals.pins.gpio5)?;
        let leds = GpioLeds::new(rgb, pwm);
        log::info!(
            "LEDs on GPIO{}/{}/{}, PWM on GPIO{}",
            PIN_LED_RED,
            PIN_LED_GREEN,
            PIN_LED_BLUE,
            PIN_PWM_LED
        );

        // ---- Wireless bridge -------------------------------------------------
        let uart_config = uart::config::Config::default().baudrate(Hertz(BRIDGE_BAUDRATE));
        let bridge = UartDriver::new(
            peripherals.uart1,
            peripherals.pins.gpio18, // TX
            peripherals.pins.gpio19, // RX
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &uart_config,
        )?;
        let (bridge_tx, bridge_rx) = bridge.into_split();
        let telemetry: Arc<dyn Telemetry> = Arc::new(BridgeTx::new(bridge_tx));
        log::info!(
            "Bridge UART up at {} baud (TX GPIO{}, RX GPIO{})",
            BRIDGE_BAUDRATE,
            PIN_BRIDGE_TX,
            PIN_BRIDGE_RX
        );

        // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) -------------

        let (commands, command_rx) = command_queue();

        let dispatcher = Dispatcher::new(
            command_writer,
            leds,
            Pcf8563::new(i2c_bus),
            Arc::clone(&telemetry),
        );
        thread::Builder::new()
            .name("dispatcher".into())
            .stack_size(STACK_DISPATCHER)
            .spawn(move || dispatcher.run(command_rx))?;

        thread::Builder::new()
            .name("bridge_rx".into())
            .stack_size(STACK_TRANSPORT_RX)
            .spawn(move || bridge_rx_loop(bridge_rx, commands))?;

        // Motion: the interrupt notification belongs to the waiting thread, so
        // the whole init sequence runs there.
        let mut imu_power = PinDriver::output(peripherals.pins.gpio8.downgrade_output())?;
        let imu_int = PinDriver::input(peripherals.pins.gpio9.downgrade())?;
        let motion_telemetry = Arc::clone(&telemetry);
        log::info!("IMU power on GPIO{}, INT on GPIO{}", PIN_IMU_POWER, PIN_IMU_INT);
        thread::Builder::new()
            .name("motion".into())
            .stack_size(STACK_MOTION)
            .spawn(move || {
                let mut imu = Mpu6050::new(i2c_bus);
                let mut trigger = None;
                let armed = init_motion(
                    &mut imu_power,
                    &mut imu,
                    || {
                        trigger = Some(MotionInterrupt::new(imu_int)?);
                        Ok(())
                    },
                    &MotionConfig::default(),
                );
                match (armed, trigger) {
                    (Ok(()), Some(trigger)) => {
                        MotionPipeline::new(imu, trigger, imu_writer, motion_telemetry).run()
                    }
                    (Err(e), _) => log::error!("Motion subsystem disabled: {}", e),
                    (Ok(()), None) => log::error!("Motion trigger missing"),
                }
            })?;

        // Audio
        match I2sMic::new(
            peripherals.i2s0,
            peripherals.pins.gpio10.downgrade(), // BCLK
            peripherals.pins.gpio21.downgrade(), // DIN
            peripherals.pins.gpio20.downgrade(), // WS
        ) {
            Ok(mic) => {
                log::info!(
                    "I2S mic on BCLK GPIO{} / WS GPIO{} / DIN GPIO{}",
                    PIN_MIC_BCLK,
                    PIN_MIC_WS,
                    PIN_MIC_DIN
                );
                let pool = BufferPool::new(AUDIO_POOL_SLOTS);
                let (producer, consumer) = audio_pipeline(mic, LevelMeter::new(), pool);
                thread::Builder::new()
                    .name("audio_prod".into())
                    .stack_size(STACK_AUDIO)
                    .spawn(move || producer.run())?;
                thread::Builder::new()
                    .name("audio_cons".into())
                    .stack_size(STACK_AUDIO)
                    .spawn(move || consumer.run())?;
            }
            Err(e) => log::error!("Microphone init failed, audio disabled: {}", e),
        }

        // Periodic housekeeping; the ADC handle is created on its own thread.
        thread::Builder::new()
            .name("periodic".into())
            .stack_size(STACK_PERIODIC)
            .spawn(move || {
                let battery = AdcBattery::new()
                    .map_err(|e| log::error!("Battery monitor unavailable: {}", e))
                    .ok();
                PeriodicTask::new(battery, battery_writer).run()
            })?;

        log::info!("All tasks spawned");

        // Main thread has nothing left to do; all work happens in the tasks.
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }
}

// ---------------------------------------------------------------------------
// Host simulator
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::io::{self, BufRead, Write};
    use std::sync::Arc;
    use std::thread;

    use anyhow::Context;

    use sensorlink::config::*;
    use sensorlink::events::{MotionReading, RtcTime};
    use sensorlink::pool::BufferPool;
    use sensorlink::signal::BinarySignal;
    use sensorlink::sim::{
        parse_hex, to_hex, RecordingLeds, ScriptedMotion, SimBattery, SimPin, SimRtc, ToneSource,
    };
    use sensorlink::storage::MemoryStorage;
    use sensorlink::tasks::audio::{audio_pipeline, LevelMeter};
    use sensorlink::tasks::dispatcher::{command_queue, Dispatcher};
    use sensorlink::tasks::motion::{init_motion, MotionConfig, MotionPipeline};
    use sensorlink::tasks::periodic::PeriodicTask;
    use sensorlink::telemetry::Telemetry;
    use sensorlink::{ConfigStore, DeviceState, Result};

    /// Replies go to stdout as hex, prefixed with `<<`.
    struct ConsoleTelemetry;

    impl Telemetry for ConsoleTelemetry {
        fn send(&self, frame: &[u8]) -> Result<()> {
            let mut out = io::stdout().lock();
            writeln!(out, "<< {}", to_hex(frame))
                .map_err(|e| sensorlink::Error::Transport(e.to_string()))
        }
    }

    pub fn run() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("SensorLink simulator starting");

        let state = DeviceState::new();
        let command_writer = state.command_writer().context("command writer claimed")?;
        let imu_writer = state.imu_writer().context("IMU writer claimed")?;
        let battery_writer = state.battery_writer().context("battery writer claimed")?;

        let mut store = ConfigStore::new(MemoryStorage::new());
        store.init()?;
        let record = store.read_and_track_boot(&command_writer)?;
        log::info!("Boot #{} (unique id 0x{:04x})", record.boot_count, record.unique_id);

        let telemetry: Arc<dyn Telemetry> = Arc::new(ConsoleTelemetry);

        let (commands, command_rx) = command_queue();
        let rtc = SimRtc::new(RtcTime {
            year: 24,
            month: 1,
            day: 1,
            weekday: 1,
            hour: 0,
            minute: 0,
            second: 0,
        });
        let dispatcher = Dispatcher::new(command_writer, RecordingLeds::new(), rtc, Arc::clone(&telemetry));
        let dispatcher_thread = thread::Builder::new()
            .name("dispatcher".into())
            .stack_size(STACK_DISPATCHER)
            .spawn(move || dispatcher.run(command_rx))?;

        // Motion: `motion` on stdin stands in for the IMU interrupt.
        let trigger = Arc::new(BinarySignal::new());
        let mut imu = ScriptedMotion::new();
        imu.idle = Some(MotionReading { ax: 0.0, ay: 0.0, az: STANDARD_GRAVITY, gx: 0.0, gy: 0.0, gz: 0.0 });
        let mut imu_power = SimPin::default();
        match init_motion(&mut imu_power, &mut imu, || Ok(()), &MotionConfig::default()) {
            Ok(()) => {
                let pipeline =
                    MotionPipeline::new(imu, Arc::clone(&trigger), imu_writer, Arc::clone(&telemetry));
                thread::Builder::new()
                    .name("motion".into())
                    .stack_size(STACK_MOTION)
                    .spawn(move || pipeline.run())?;
            }
            Err(e) => log::error!("Motion subsystem disabled: {}", e),
        }

        let mut mic = ToneSource::new(440.0, 8000);
        mic.realtime = true;
        let (producer, consumer) =
            audio_pipeline(mic, LevelMeter::new(), BufferPool::new(AUDIO_POOL_SLOTS));
        thread::Builder::new()
            .name("audio_prod".into())
            .stack_size(STACK_AUDIO)
            .spawn(move || producer.run())?;
        thread::Builder::new()
            .name("audio_cons".into())
            .stack_size(STACK_AUDIO)
            .spawn(move || consumer.run())?;

        thread::Builder::new()
            .name("periodic".into())
            .stack_size(STACK_PERIODIC)
            .spawn(move || PeriodicTask::new(Some(SimBattery::new(2048)), battery_writer).run())?;

        log::info!("Ready: hex packets, `motion`, `state`; EOF to quit");

        for line in io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            match line {
                "" => continue,
                _ if line.starts_with('#') => continue,
                "motion" => trigger.post(),
                "state" => {
                    log::info!(
                        "tick {} ms, leds {:?}, battery {}, imu {:?}, rtc {}",
                        state.periodic_tick_ms(),
                        state.led_state(),
                        state.battery_raw(),
                        state.imu(),
                        state.rtc()
                    );
                }
                _ => match parse_hex(line) {
                    // Failures are already logged by the queue.
                    Some(bytes) => {
                        let _ = commands.on_receive(&bytes);
                    }
                    None => log::warn!("Not a hex packet: {}", line),
                },
            }
        }

        drop(commands);
        let _ = dispatcher_thread.join();
        log::info!("Input closed, simulator stopping");
        Ok(())
    }
}
