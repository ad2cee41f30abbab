// SensorLink - Hardware & System Configuration
// Target: Seeed Studio Xiao ESP32-C3 (RISC-V) with an external sensor board

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (Xiao ESP32-C3 pinout)
// ---------------------------------------------------------------------------
pub const PIN_LED_RED: i32 = 2;         // D0    - Status LED, red
pub const PIN_LED_GREEN: i32 = 3;       // D1    - Status LED, green
pub const PIN_LED_BLUE: i32 = 4;        // D2    - Status LED, blue
pub const PIN_PWM_LED: i32 = 5;         // D3    - Dimmable LED (LEDC channel 0)
pub const PIN_I2C_SDA: i32 = 6;         // D4    - I2C data line
pub const PIN_I2C_SCL: i32 = 7;         // D5    - I2C clock line
pub const PIN_IMU_POWER: i32 = 8;       // D8    - IMU supply enable (active HIGH)
pub const PIN_IMU_INT: i32 = 9;         // D9    - MPU6050 INT (motion detect)
pub const PIN_MIC_BCLK: i32 = 10;       // D10   - I2S bit clock
pub const PIN_MIC_WS: i32 = 20;         // D7    - I2S word select
pub const PIN_MIC_DIN: i32 = 21;        // D6    - I2S data in
pub const PIN_BATTERY_ADC: u32 = 1;     //         Battery voltage (ADC1 channel 1)

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_ADDR_MPU6050: u8 = 0x68;
pub const I2C_ADDR_PCF8563: u8 = 0x51;
pub const I2C_BAUDRATE_KHZ: u32 = 400;

// ---------------------------------------------------------------------------
// Wireless serial bridge (transport)
// ---------------------------------------------------------------------------
pub const BRIDGE_BAUDRATE: u32 = 115_200;
pub const PIN_BRIDGE_TX: i32 = 18;      //         UART1 TX (USB D- pad, USB-JTAG unused)
pub const PIN_BRIDGE_RX: i32 = 19;      //         UART1 RX (USB D+ pad)

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_DISPATCHER: usize = 4096;
pub const STACK_TRANSPORT_RX: usize = 4096;
pub const STACK_MOTION: usize = 4096;
pub const STACK_AUDIO: usize = 4096;
pub const STACK_PERIODIC: usize = 3072;

// ---------------------------------------------------------------------------
// Queues & Pools
// ---------------------------------------------------------------------------
pub const COMMAND_QUEUE_DEPTH: usize = 10;
pub const COMMAND_ENQUEUE_TIMEOUT_MS: u64 = 100;
pub const AUDIO_QUEUE_DEPTH: usize = 10;
pub const AUDIO_POOL_SLOTS: usize = 12;
pub const AUDIO_SAMPLES_PER_BLOCK: usize = 160;  // 320 bytes of 16-bit PCM
pub const AUDIO_SAMPLE_RATE_HZ: u32 = 16_000;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const DEFAULT_PERIODIC_TICK_MS: u16 = 1000;
pub const MIN_PERIODIC_SLEEP_MS: u64 = 1;
pub const IMU_POWER_SETTLE_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Persisted configuration
// ---------------------------------------------------------------------------
pub const NVS_NAMESPACE: &str = "sensorlink";
pub const CONFIG_RECORD_KEY: u16 = 1;
pub const DEFAULT_UNIQUE_ID: u16 = 0x0001;
pub const DEFAULT_BOOT_COUNT: u32 = 0;
pub const STORAGE_SECTOR_COUNT: u32 = 3;

// ---------------------------------------------------------------------------
// Motion detection
// ---------------------------------------------------------------------------
pub const IMU_OUTPUT_DATA_RATE_HZ: u16 = 26;
pub const IMU_MOTION_THRESHOLD_MG: u16 = 500;   // 0.5 g slope
pub const IMU_MOTION_DURATION: u8 = 1;          // one sample over threshold
pub const IMU_FIXED_POINT_SCALE: f32 = 100.0;   // 9.81 m/s^2 -> 981

// ---------------------------------------------------------------------------
// MPU6050 Sensor Scale Factors
// ---------------------------------------------------------------------------
pub const ACCEL_SCALE_8G: f32 = 4096.0;   // LSB/g  at ±8 g
pub const GYRO_SCALE_500: f32 = 65.5;     // LSB/°/s at ±500 °/s
pub const STANDARD_GRAVITY: f32 = 9.806_65;
