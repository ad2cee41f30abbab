//! Command queue and dispatcher tests

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sensorlink::codec::CommandPacket;
use sensorlink::events::{LedChannel, RtcTime};
use sensorlink::protocol::{Command, Reply};
use sensorlink::sim::{LedCall, RecordingLeds, RecordingTelemetry, SimRtc};
use sensorlink::state::LedState;
use sensorlink::tasks::dispatcher::{command_queue, Dispatcher};
use sensorlink::{DeviceState, Error};

fn fixture() -> (Arc<DeviceState>, Arc<RecordingTelemetry>, Dispatcher<RecordingLeds, SimRtc>) {
    let state = DeviceState::new();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let dispatcher = Dispatcher::new(
        state.command_writer().unwrap(),
        RecordingLeds::new(),
        SimRtc::default(),
        telemetry.clone(),
    );
    (state, telemetry, dispatcher)
}

fn packet(bytes: &[u8]) -> CommandPacket {
    CommandPacket::decode(bytes).unwrap()
}

#[test]
fn test_led_ctrl_every_channel_and_level() {
    let (state, _, mut dispatcher) = fixture();

    for channel in LedChannel::ALL {
        for on in [true, false, true] {
            dispatcher.dispatch(Command::LedCtrl { channel, on }).unwrap();
            assert_eq!(state.led(channel), on);
            assert_eq!(dispatcher.leds().is_lit(channel), on);
            assert_eq!(dispatcher.leds().calls.last(), Some(&LedCall::Led(channel, on)));
        }
    }
}

#[test]
fn test_led_ctrl_nonzero_means_on() {
    let (state, _, mut dispatcher) = fixture();
    dispatcher.handle_packet(&packet(&[0x01, 0x00, 0x06, 0x00, 0x01, 0x7F]));
    assert!(state.led(LedChannel::Green));
}

#[test]
fn test_end_to_end_red_on() {
    let (state, _, mut dispatcher) = fixture();
    let (queue, commands) = command_queue();

    queue.on_receive(&[0x01, 0x00, 0x06, 0x00, 0x00, 0x01]).unwrap();
    dispatcher.handle_packet(&commands.try_recv().unwrap());

    assert_eq!(
        state.led_state(),
        LedState { red: true, green: false, blue: false, pwm_width_ns: 0 }
    );
    assert_eq!(dispatcher.leds().calls, vec![LedCall::Led(LedChannel::Red, true)]);
}

// `01 00 06 00 02 01` is sometimes quoted as "red on" in protocol notes, but
// the channel map is 0 red, 1 green, 2 blue and the receiver follows the map.
// Red is covered by `test_end_to_end_red_on` above.
#[test]
fn test_end_to_end_channel_two_is_blue() {
    let (state, _, mut dispatcher) = fixture();
    let (queue, commands) = command_queue();

    queue.on_receive(&[0x01, 0x00, 0x06, 0x00, 0x02, 0x01]).unwrap();
    dispatcher.handle_packet(&commands.try_recv().unwrap());

    assert!(state.led(LedChannel::Blue));
    assert!(!state.led(LedChannel::Red));
    assert_eq!(dispatcher.leds().calls, vec![LedCall::Led(LedChannel::Blue, true)]);
}

#[test]
fn test_set_periodic_tick_every_value() {
    let (state, _, mut dispatcher) = fixture();

    for tick in 0..=u16::MAX {
        let bytes = tick.to_be_bytes();
        dispatcher.handle_packet(&packet(&[0x04, 0x00, 0x06, 0x00, bytes[0], bytes[1]]));
        assert_eq!(state.periodic_tick_ms(), tick);
    }
}

#[test]
fn test_set_pwm_width() {
    let (state, _, mut dispatcher) = fixture();
    dispatcher.handle_packet(&packet(&[0x03, 0x00, 0x08, 0x00, 0x00, 0x03, 0xD0, 0x90]));

    assert_eq!(state.pwm_width_ns(), 250_000);
    assert_eq!(dispatcher.leds().calls, vec![LedCall::PwmWidth(250_000)]);
}

#[test]
fn test_get_batt_adc_is_a_no_op() {
    let (state, telemetry, mut dispatcher) = fixture();
    dispatcher.handle_packet(&packet(&[0x02, 0x00, 0x04, 0x00]));

    assert_eq!(state.led_state(), LedState::default());
    assert!(dispatcher.leds().calls.is_empty());
    assert!(telemetry.frames().is_empty());
}

#[test]
fn test_set_then_get_rtc() {
    let (state, telemetry, mut dispatcher) = fixture();
    let time = RtcTime { year: 24, month: 2, day: 29, weekday: 4, hour: 13, minute: 37, second: 5 };

    let mut bytes = vec![0x05, 0x00, 0x0B, 0x00];
    bytes.extend_from_slice(&time.to_bytes());
    dispatcher.handle_packet(&packet(&bytes));
    assert_eq!(dispatcher.rtc().time, time);
    assert_eq!(state.rtc(), time);
    assert!(telemetry.frames().is_empty());

    dispatcher.handle_packet(&packet(&[0x06, 0x00, 0x04, 0x00]));
    let frames = telemetry.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], vec![0x11, 0x00, 0x0B, 0x00, 24, 2, 29, 4, 13, 37, 5]);
    assert_eq!(frames[0].as_slice(), Reply::NotifyRtc(time).encode().as_slice());
}

#[test]
fn test_invalid_rtc_is_dropped() {
    let (_, _, mut dispatcher) = fixture();
    dispatcher.handle_packet(&packet(&[0x05, 0x00, 0x0B, 0x00, 24, 13, 1, 1, 0, 0, 0]));
    assert_eq!(dispatcher.rtc().sets, 0);
}

#[test]
fn test_get_rtc_failure_sends_nothing() {
    let (_, telemetry, mut dispatcher) = fixture();
    let mut failing = Dispatcher::new(
        DeviceState::new().command_writer().unwrap(),
        RecordingLeds::new(),
        SimRtc { fail: true, ..SimRtc::default() },
        telemetry.clone(),
    );
    assert!(failing.dispatch(Command::GetRtc).is_err());
    assert!(telemetry.frames().is_empty());

    // The healthy dispatcher is unaffected.
    assert!(dispatcher.dispatch(Command::GetRtc).is_ok());
}

#[test]
fn test_telemetry_failure_does_not_fail_command() {
    let (_, telemetry, mut dispatcher) = fixture();
    telemetry.set_failing(true);
    assert!(dispatcher.dispatch(Command::GetRtc).is_ok());
}

#[test]
fn test_unknown_id_changes_nothing() {
    let (state, telemetry, mut dispatcher) = fixture();
    dispatcher.handle_packet(&packet(&[0x99, 0x00, 0x05, 0x00, 0x01]));

    assert_eq!(state.led_state(), LedState::default());
    assert_eq!(state.periodic_tick_ms(), 1000);
    assert!(telemetry.frames().is_empty());
}

#[test]
fn test_queue_full_after_ten() {
    let (queue, _commands) = command_queue();
    let led = [0x01, 0x00, 0x06, 0x00, 0x00, 0x01];

    for _ in 0..10 {
        queue.on_receive(&led).unwrap();
    }

    let start = Instant::now();
    let result = queue.on_receive(&led);
    assert!(matches!(result, Err(Error::QueueFull)));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_enqueue_waits_for_room() {
    let (queue, commands) = command_queue();
    let led = CommandPacket::new(1, &[0, 1]).unwrap();
    for _ in 0..10 {
        queue.enqueue(led.clone()).unwrap();
    }

    let drainer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        commands.recv()
    });
    assert!(queue.enqueue(led).is_ok());
    assert!(drainer.join().unwrap().is_some());
}

#[test]
fn test_malformed_bytes_never_reach_the_queue() {
    let (queue, commands) = command_queue();
    assert!(matches!(
        queue.on_receive(&[0x01, 0x00, 0x02, 0x00]),
        Err(Error::MalformedPacket(_))
    ));
    assert!(commands.try_recv().is_none());
}

#[test]
fn test_run_loop_survives_bad_packets() {
    let (state, telemetry, dispatcher) = fixture();
    let (queue, commands) = command_queue();

    let worker = thread::spawn(move || dispatcher.run(commands));

    // Channel out of range, short SET_PRD_TICK, unknown id, then good ones.
    let packets: [&[u8]; 6] = [
        &[0x01, 0x00, 0x06, 0x00, 0x07, 0x01],
        &[0x04, 0x00, 0x05, 0x00, 0x01],
        &[0x77, 0x00, 0x04, 0x00],
        &[0x01, 0x00, 0x06, 0x00, 0x01, 0x01],
        &[0x04, 0x00, 0x06, 0x00, 0x00, 0xFA],
        &[0x06, 0x00, 0x04, 0x00],
    ];
    for bytes in packets {
        queue.on_receive(bytes).unwrap();
    }
    drop(queue);
    worker.join().unwrap();

    assert!(state.led(LedChannel::Green));
    assert_eq!(state.periodic_tick_ms(), 250);
    assert_eq!(telemetry.frames().len(), 1);
}

#[test]
fn test_commands_apply_in_arrival_order() {
    let (state, _, dispatcher) = fixture();
    let (queue, commands) = command_queue();
    let worker = thread::spawn(move || dispatcher.run(commands));

    for tick in [10u16, 20, 30] {
        let b = tick.to_be_bytes();
        queue.on_receive(&[0x04, 0x00, 0x06, 0x00, b[0], b[1]]).unwrap();
    }
    drop(queue);
    worker.join().unwrap();

    assert_eq!(state.periodic_tick_ms(), 30);
}
