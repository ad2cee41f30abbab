// SensorLink - ESP-IDF Board Bindings
//
// Concrete implementations of the collaborator traits on the XIAO ESP32-C3
// carrier: GPIO + LEDC LEDs, NVS config storage, the UART-attached wireless
// bridge, the I2S microphone, the battery ADC and the IMU interrupt pin.

use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};

use esp_idf_hal::delay::BLOCK;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, InterruptType, Level, Output, PinDriver};
use esp_idf_hal::i2s::config::{DataBitWidth, StdConfig};
use esp_idf_hal::i2s::{I2sDriver, I2sRx, I2S0};
use esp_idf_hal::ledc::LedcDriver;
use esp_idf_hal::task::notification::Notification;
use esp_idf_hal::uart::{UartRxDriver, UartTxDriver};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::EspError;

use super::{BatteryMonitor, LedActuator, PcmSource};
use crate::codec::{peek_header, HEADER_LEN, MAX_PACKET_LEN};
use crate::config::*;
use crate::error::{Error, Result, StorageError};
use crate::events::LedChannel;
use crate::pool::PcmBlock;
use crate::signal::TriggerWait;
use crate::storage::{RecordStorage, StorageGeometry};
use crate::tasks::dispatcher::CommandQueue;
use crate::telemetry::Telemetry;

const LED_PWM_PERIOD_NS: u64 = 1_000_000; // LEDC timer runs at 1 kHz
const NVS_SECTOR_SIZE: u32 = 4096;

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------

pub struct GpioLeds {
    rgb: [PinDriver<'static, AnyOutputPin, Output>; 3],
    pwm: LedcDriver<'static>,
}

impl GpioLeds {
    /// `rgb` in red, green, blue order.
    pub fn new(rgb: [PinDriver<'static, AnyOutputPin, Output>; 3], pwm: LedcDriver<'static>) -> Self {
        Self { rgb, pwm }
    }
}

impl LedActuator for GpioLeds {
    fn set_led(&mut self, channel: LedChannel, on: bool) -> Result<()> {
        self.rgb[channel.index()]
            .set_level(Level::from(on))
            .map_err(|e| {
                log::error!("LED GPIO write failed: {}", e);
                Error::DeviceNotReady("LED GPIO")
            })
    }

    fn set_pwm_width_ns(&mut self, width_ns: u32) -> Result<()> {
        let max = u64::from(self.pwm.get_max_duty());
        let duty = (u64::from(width_ns) * max / LED_PWM_PERIOD_NS).min(max) as u32;
        self.pwm.set_duty(duty).map_err(|e| {
            log::error!("LEDC duty update failed: {}", e);
            Error::DeviceNotReady("LED PWM")
        })
    }
}

// ---------------------------------------------------------------------------
// NVS record storage
// ---------------------------------------------------------------------------

/// Records live as blobs in the `sensorlink` NVS namespace, one key per
/// record id.
pub struct EspNvsStorage {
    partition: EspDefaultNvsPartition,
    nvs: Option<EspNvs<NvsDefault>>,
}

impl EspNvsStorage {
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        Self { partition, nvs: None }
    }

    fn handle(&mut self) -> core::result::Result<&mut EspNvs<NvsDefault>, StorageError> {
        self.nvs.as_mut().ok_or(StorageError::NotReady)
    }
}

fn record_name(key: u16) -> String {
    format!("rec{}", key)
}

impl RecordStorage for EspNvsStorage {
    fn mount(&mut self) -> core::result::Result<StorageGeometry, StorageError> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)
            .map_err(|e| StorageError::Mount(e.to_string()))?;
        self.nvs = Some(nvs);
        Ok(StorageGeometry {
            sector_size: NVS_SECTOR_SIZE,
            sector_count: STORAGE_SECTOR_COUNT,
        })
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> core::result::Result<Option<usize>, StorageError> {
        let name = record_name(key);
        let nvs = self.handle()?;

        let len = match nvs.blob_len(&name).map_err(|e| StorageError::Read(e.to_string()))? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len > buf.len() {
            // Report the size without reading; the caller rejects it.
            return Ok(Some(len));
        }

        let data = nvs
            .get_blob(&name, buf)
            .map_err(|e| StorageError::Read(e.to_string()))?;
        Ok(data.map(|d| d.len()))
    }

    fn write(&mut self, key: u16, data: &[u8]) -> core::result::Result<(), StorageError> {
        let name = record_name(key);
        self.handle()?
            .set_blob(&name, data)
            .map_err(|e| StorageError::Write(e.to_string()))
    }

    fn clear(&mut self) -> core::result::Result<(), StorageError> {
        // The namespace only ever holds the config record.
        let name = record_name(CONFIG_RECORD_KEY);
        self.handle()?
            .remove(&name)
            .map_err(|e| StorageError::Erase(e.to_string()))?;
        self.nvs = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wireless bridge over UART
// ---------------------------------------------------------------------------

/// Egress half of the bridge link.  Frames are written whole under the lock
/// so concurrent senders never interleave bytes.
pub struct BridgeTx {
    tx: Mutex<UartTxDriver<'static>>,
}

impl BridgeTx {
    pub fn new(tx: UartTxDriver<'static>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl Telemetry for BridgeTx {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rest = frame;
        while !rest.is_empty() {
            let n = tx.write(rest).map_err(|e| Error::Transport(e.to_string()))?;
            rest = &rest[n..];
        }
        Ok(())
    }
}

fn read_exact(rx: &UartRxDriver<'static>, buf: &mut [u8]) -> core::result::Result<(), EspError> {
    let mut filled = 0;
    while filled < buf.len() {
        filled += rx.read(&mut buf[filled..], BLOCK)?;
    }
    Ok(())
}

/// Ingress half: pull whole frames off the UART and feed them to the
/// command queue.  Frames are delimited by the `len` field of their header;
/// on an impossible length the stream is shifted by one byte until a
/// plausible header lines up again.
pub fn bridge_rx_loop(rx: UartRxDriver<'static>, commands: CommandQueue) -> ! {
    log::info!("Bridge receive task started");

    let mut frame = [0u8; MAX_PACKET_LEN];
    if let Err(e) = read_exact(&rx, &mut frame[..HEADER_LEN]) {
        log::error!("UART read failed: {}", e);
    }

    loop {
        let len = match peek_header(&frame[..HEADER_LEN]) {
            Ok((_, len)) => len,
            Err(e) => {
                log::warn!("Resyncing bridge stream: {}", e);
                frame.copy_within(1..HEADER_LEN, 0);
                if let Err(e) = read_exact(&rx, &mut frame[HEADER_LEN - 1..HEADER_LEN]) {
                    log::error!("UART read failed: {}", e);
                }
                continue;
            }
        };

        match read_exact(&rx, &mut frame[HEADER_LEN..len]) {
            // Errors are logged inside the queue; the next frame is independent.
            Ok(()) => {
                let _ = commands.on_receive(&frame[..len]);
            }
            Err(e) => log::error!("UART read failed: {}", e),
        }

        if let Err(e) = read_exact(&rx, &mut frame[..HEADER_LEN]) {
            log::error!("UART read failed: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// PDM-to-I2S microphone on I2S0, 16 kHz mono, 16-bit.
pub struct I2sMic {
    driver: I2sDriver<'static, I2sRx>,
}

impl I2sMic {
    pub fn new(
        i2s: I2S0,
        bclk: AnyIOPin,
        din: AnyIOPin,
        ws: AnyIOPin,
    ) -> core::result::Result<Self, EspError> {
        let config = StdConfig::philips(AUDIO_SAMPLE_RATE_HZ, DataBitWidth::Bits16);
        let mut driver =
            I2sDriver::new_std_rx(i2s, &config, bclk, din, Option::<AnyIOPin>::None, ws)?;
        driver.rx_enable()?;
        log::info!("I2S microphone running at {} Hz", AUDIO_SAMPLE_RATE_HZ);
        Ok(Self { driver })
    }
}

impl PcmSource for I2sMic {
    fn read_block(&mut self, block: &mut PcmBlock) -> Result<()> {
        let mut bytes = [0u8; AUDIO_SAMPLES_PER_BLOCK * 2];
        let mut filled = 0;
        while filled < bytes.len() {
            filled += self
                .driver
                .read(&mut bytes[filled..], BLOCK)
                .map_err(|e| Error::SensorFetch(e.to_string()))?;
        }
        for (sample, chunk) in block.iter_mut().zip(bytes.chunks_exact(2)) {
            *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Battery ADC
// ---------------------------------------------------------------------------

/// One-shot ADC1 reader.  Holds a raw driver handle, so it must be created
/// on the thread that uses it.
pub struct AdcBattery {
    handle: esp_idf_sys::adc_oneshot_unit_handle_t,
    channel: esp_idf_sys::adc_channel_t,
}

impl AdcBattery {
    /// ADC1 with 11 dB attenuation (0..3.3 V) on [`PIN_BATTERY_ADC`].
    pub fn new() -> Result<Self> {
        let mut handle: esp_idf_sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let channel = PIN_BATTERY_ADC as esp_idf_sys::adc_channel_t;

        unsafe {
            let unit_cfg = esp_idf_sys::adc_oneshot_unit_init_cfg_t {
                unit_id: esp_idf_sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: esp_idf_sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..core::mem::zeroed()
            };
            let ret = esp_idf_sys::adc_oneshot_new_unit(&unit_cfg, &mut handle);
            if ret != esp_idf_sys::ESP_OK {
                log::error!("ADC unit init failed ({})", ret);
                return Err(Error::DeviceNotReady("battery ADC"));
            }

            let chan_cfg = esp_idf_sys::adc_oneshot_chan_cfg_t {
                atten: esp_idf_sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: esp_idf_sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            let ret = esp_idf_sys::adc_oneshot_config_channel(handle, channel, &chan_cfg);
            if ret != esp_idf_sys::ESP_OK {
                log::error!("ADC channel config failed ({})", ret);
                return Err(Error::DeviceNotReady("battery ADC"));
            }
        }

        Ok(Self { handle, channel })
    }
}

impl BatteryMonitor for AdcBattery {
    fn read_raw(&mut self) -> Result<i32> {
        let mut raw: i32 = 0;
        let ret = unsafe { esp_idf_sys::adc_oneshot_read(self.handle, self.channel, &mut raw) };
        if ret != esp_idf_sys::ESP_OK {
            return Err(Error::SensorFetch(format!("adc_oneshot_read returned {}", ret)));
        }
        Ok(raw)
    }
}

// ---------------------------------------------------------------------------
// IMU interrupt
// ---------------------------------------------------------------------------

/// Rising edge on the IMU INT pin, forwarded from the ISR as a task
/// notification.  The ISR does nothing else.
///
/// The notification targets the creating thread, so build this on the
/// motion task itself.
pub struct MotionInterrupt {
    pin: PinDriver<'static, AnyIOPin, Input>,
    notification: Notification,
}

impl MotionInterrupt {
    pub fn new(mut pin: PinDriver<'static, AnyIOPin, Input>) -> Result<Self> {
        let notification = Notification::new();
        let notifier = notification.notifier();

        pin.set_interrupt_type(InterruptType::PosEdge)
            .map_err(|_| Error::DeviceNotReady("IMU interrupt pin"))?;

        // SAFETY: the callback runs in ISR context; it only posts a
        // notification, which is ISR-safe.
        unsafe {
            pin.subscribe(move || {
                notifier.notify_and_yield(NonZeroU32::MIN);
            })
            .map_err(|_| Error::DeviceNotReady("IMU interrupt pin"))?;
        }

        pin.enable_interrupt()
            .map_err(|_| Error::DeviceNotReady("IMU interrupt pin"))?;
        Ok(Self { pin, notification })
    }
}

impl TriggerWait for MotionInterrupt {
    fn wait(&mut self) {
        while self.notification.wait(BLOCK).is_none() {}

        // The driver disarms the interrupt after each edge.
        if let Err(e) = self.pin.enable_interrupt() {
            log::error!("Could not re-arm IMU interrupt: {}", e);
        }
    }
}
