mod common;

use std::time::Duration;

use avctl_control::{ChannelRegistry, Dispatcher};
use avctl_core::{
    Action, ChannelKind, CommandGroup, ControlError, DispatchPolicy, OutcomeData, PulseKey,
};
use common::{FakeLine, FakePulse};
use tokio::time::Instant;

fn two_channel_action() -> Action {
    Action::new(vec![
        CommandGroup {
            line: vec![("amp".into(), vec!["PWON\r".into(), "MV50\r".into()])],
            pulse: vec![("tv".into(), vec![PulseKey::Key("KEY_POWER".into())])],
        },
        CommandGroup {
            line: vec![("amp".into(), vec!["SIBD\r".into()])],
            pulse: vec![(
                "tv".into(),
                vec![
                    PulseKey::Delay(Duration::from_millis(100)),
                    PulseKey::Key("KEY_HDMI1".into()),
                ],
            )],
        },
    ])
}

#[tokio::test(start_paused = true)]
async fn leaves_across_channels_complete_exactly_once() {
    let amp = FakeLine::with_delay("amp", Duration::from_millis(40));
    for cmd in ["PWON\r", "MV50\r", "SIBD\r"] {
        amp.respond(cmd, cmd.trim_end());
    }
    let tv = FakePulse::with_delay("tv", Duration::from_millis(150));

    let mut registry = ChannelRegistry::new();
    registry.insert_line("amp".into(), amp.clone());
    registry.insert_pulse("tv".into(), tv.clone());
    let dispatcher = Dispatcher::new(registry, DispatchPolicy::Strict);

    let started = Instant::now();
    let report = dispatcher.dispatch(&two_channel_action()).await;
    let elapsed = started.elapsed();

    assert_eq!(report.outcomes.len(), 5, "one outcome per leaf");
    assert!(report.succeeded);
    assert_eq!(report.outcomes.for_channel("amp").count(), 3);
    assert_eq!(report.outcomes.for_channel("tv").count(), 2);

    // Same-channel leaves run in declaration order.
    assert_eq!(amp.sent(), vec!["PWON\r", "MV50\r", "SIBD\r"]);
    assert_eq!(tv.sequences().len(), 2);
    assert_eq!(tv.sequences()[0], vec![PulseKey::Key("KEY_POWER".into())]);

    // Channels ran concurrently: the slower tv lane (2 x 150ms) bounds the
    // dispatch, not the sum of both lanes.
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(420), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn outcome_payloads_carry_response_and_key_count() {
    let amp = FakeLine::new("amp");
    amp.respond("PW?\r", "PWON");
    let tv = FakePulse::new("tv");

    let mut registry = ChannelRegistry::new();
    registry.insert_line("amp".into(), amp);
    registry.insert_pulse("tv".into(), tv);
    let dispatcher = Dispatcher::new(registry, DispatchPolicy::Lenient);

    let action = Action::new(vec![CommandGroup {
        line: vec![("amp".into(), vec!["PW?\r".into()])],
        pulse: vec![(
            "tv".into(),
            vec![PulseKey::Key("KEY_A".into()), PulseKey::Delay(Duration::ZERO)],
        )],
    }]);
    let report = dispatcher.dispatch(&action).await;

    let amp_outcome = report.outcomes.for_channel("amp").next().unwrap();
    assert_eq!(amp_outcome.kind, ChannelKind::Line);
    assert_eq!(amp_outcome.result, Ok(OutcomeData::Response("PWON".into())));

    let tv_outcome = report.outcomes.for_channel("tv").next().unwrap();
    assert_eq!(tv_outcome.kind, ChannelKind::Pulse);
    assert_eq!(tv_outcome.result, Ok(OutcomeData::Sent(2)));
}

#[tokio::test]
async fn failed_leaf_is_reported_as_data() {
    let amp = FakeLine::new("amp");
    amp.respond("PWON\r", "PWON");
    let tv = FakePulse::failing("tv");

    let mut registry = ChannelRegistry::new();
    registry.insert_line("amp".into(), amp);
    registry.insert_pulse("tv".into(), tv);

    let action = Action::new(vec![CommandGroup {
        line: vec![("amp".into(), vec!["PWON\r".into()])],
        pulse: vec![("tv".into(), vec![PulseKey::Key("KEY_POWER".into())])],
    }]);

    let lenient = Dispatcher::new(registry.clone(), DispatchPolicy::Lenient)
        .dispatch(&action)
        .await;
    assert!(lenient.succeeded);
    assert_eq!(lenient.outcomes.errors().count(), 1);

    let strict = Dispatcher::new(registry, DispatchPolicy::Strict)
        .dispatch(&action)
        .await;
    assert!(!strict.succeeded);
    let err = strict.outcomes.errors().next().unwrap();
    assert!(matches!(err, ControlError::Connection { .. }));
    assert_eq!(err.channel().as_str(), "tv");
}

#[tokio::test]
async fn unknown_channels_count_toward_completion() {
    let amp = FakeLine::new("amp");
    amp.respond("PWON\r", "PWON");
    let mut registry = ChannelRegistry::new();
    registry.insert_line("amp".into(), amp);

    let action = Action::new(vec![CommandGroup {
        line: vec![
            ("amp".into(), vec!["PWON\r".into()]),
            ("ghost".into(), vec!["X\r".into(), "Y\r".into()]),
        ],
        pulse: vec![("ir".into(), vec![PulseKey::Key("KEY_POWER".into())])],
    }]);
    let report = Dispatcher::new(registry, DispatchPolicy::Lenient)
        .dispatch(&action)
        .await;

    assert_eq!(report.outcomes.len(), 4);
    let configuration = report
        .outcomes
        .errors()
        .filter(|e| matches!(e, ControlError::Configuration { .. }))
        .count();
    assert_eq!(configuration, 3);
}

#[tokio::test]
async fn report_serializes_for_the_wire() {
    let report = Dispatcher::new(ChannelRegistry::new(), DispatchPolicy::Lenient)
        .dispatch(&Action::line("nowhere", vec!["X\r".into()]))
        .await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["succeeded"], true);
    assert_eq!(json["outcomes"]["outcomes"][0]["result"]["Err"]["error"], "configuration");
    let back: avctl_control::DispatchReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
}
