mod common;

use common::*;
use keyparse::prelude::*;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn caps_tap_emits_exactly_one_escape() {
    let mut scheduler = recording(Layout::caps2esc());
    let fired = feed(
        &mut scheduler,
        &[down(KeyCode::CAPSLOCK, 0), up(KeyCode::CAPSLOCK, 80)],
    );
    assert_eq!(fired, vec![Fired::new("caps2esc", Action::Tap(KeyCode::ESC))]);
    assert!(scheduler.generation().is_empty());
}

#[test]
fn caps_held_without_release_stays_suspended() {
    let mut scheduler = recording(Layout::caps2esc());
    let fired = feed(&mut scheduler, &[down(KeyCode::CAPSLOCK, 0)]);
    assert!(fired.is_empty());

    let live: Vec<&Matcher> = scheduler.generation().iter().map(|(_, m)| m).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].rule(), Some("caps2esc"));
}

#[test]
fn interleaved_pushes_both_complete() {
    let layout = Layout::new(vec![
        Rule::new("push-a", pushed(Some(KeyCode::A)), Action::Log("a".into())),
        Rule::new("push-b", pushed(Some(KeyCode::B)), Action::Log("b".into())),
    ]);
    let mut scheduler = recording(layout);
    let fired = feed(
        &mut scheduler,
        &[
            down(KeyCode::A, 0),
            down(KeyCode::B, 10),
            up(KeyCode::B, 20),
            up(KeyCode::A, 30),
        ],
    );
    assert_eq!(
        fired,
        vec![
            Fired::new("push-b", Action::Log("b".into())),
            Fired::new("push-a", Action::Log("a".into())),
        ]
    );
}

#[test]
fn wait_pressed_outlasts_any_amount_of_noise() {
    let layout = Layout::new(vec![Rule::new(
        "armed",
        sequence([pressed(Some(KeyCode::CAPSLOCK)), wait_pressed(Some(KeyCode::SPACE))]),
        Action::Log("space after caps".into()),
    )]);
    let mut scheduler = recording(layout);
    let mut rng = StdRng::seed_from_u64(11);
    let mut events = vec![down(KeyCode::CAPSLOCK, 0)];
    for millis in 1..5_000 {
        events.push(noise_event(&mut rng, &[KeyCode::SPACE, KeyCode::CAPSLOCK], millis));
    }
    events.push(down(KeyCode::SPACE, 5_000));
    let fired = feed(&mut scheduler, &events);
    assert_eq!(fired.len(), 1);
}

#[test]
fn dual_function_caps_taps_escape_or_chords_left() {
    let layout = Layout::new(vec![Rule::new(
        "caps-layer",
        held_with(
            KeyCode::CAPSLOCK,
            pushed(Some(KeyCode::H)),
            HoldOptions {
                on_release: Some(Action::Tap(KeyCode::ESC)),
                repeat: true,
            },
        ),
        Action::Tap(KeyCode::LEFT),
    )]);
    let mut scheduler = recording(layout);

    let tap = feed(
        &mut scheduler,
        &[down(KeyCode::CAPSLOCK, 0), up(KeyCode::CAPSLOCK, 50)],
    );
    assert_eq!(tap, vec![Fired::new("caps-layer", Action::Tap(KeyCode::ESC))]);

    let chord = feed(
        &mut scheduler,
        &[
            down(KeyCode::CAPSLOCK, 100),
            KeyEvent::key(KeyCode::CAPSLOCK, Edge::Repeat, at(400)),
            down(KeyCode::H, 450),
            up(KeyCode::H, 500),
            down(KeyCode::H, 550),
            up(KeyCode::H, 600),
            up(KeyCode::CAPSLOCK, 700),
        ],
    );
    assert_eq!(
        chord,
        vec![
            Fired::new("caps-layer", Action::Tap(KeyCode::LEFT)),
            Fired::new("caps-layer", Action::Tap(KeyCode::LEFT)),
        ]
    );
    assert!(!scheduler.generation().watches_release_of(KeyCode::CAPSLOCK));
}

fn caps_layer() -> Layout {
    Layout::new(vec![Rule::new(
        "caps-layer",
        held_with(
            KeyCode::CAPSLOCK,
            combine([
                bind("left", pushed(Some(KeyCode::H)), Action::Tap(KeyCode::LEFT)),
                bind("down", pushed(Some(KeyCode::J)), Action::Tap(KeyCode::DOWN)),
            ]),
            HoldOptions {
                on_release: Some(Action::Tap(KeyCode::ESC)),
                repeat: true,
            },
        ),
        Action::Tap(KeyCode::ESC),
    )])
}

#[test]
fn layer_tap_emits_a_single_escape() {
    let mut scheduler = recording(caps_layer());
    let fired = feed(
        &mut scheduler,
        &[down(KeyCode::CAPSLOCK, 0), up(KeyCode::CAPSLOCK, 60)],
    );
    assert_eq!(fired, vec![Fired::new("caps-layer", Action::Tap(KeyCode::ESC))]);
    assert!(scheduler.generation().is_empty());
}

#[test]
fn layer_chords_fire_without_a_trailing_escape() {
    let mut scheduler = recording(caps_layer());
    let fired = feed(
        &mut scheduler,
        &[
            down(KeyCode::CAPSLOCK, 0),
            down(KeyCode::H, 100),
            up(KeyCode::H, 150),
            down(KeyCode::J, 200),
            up(KeyCode::J, 250),
            down(KeyCode::H, 300),
            up(KeyCode::H, 350),
            up(KeyCode::CAPSLOCK, 400),
        ],
    );
    assert_eq!(
        fired,
        vec![
            Fired::new("left", Action::Tap(KeyCode::LEFT)),
            Fired::new("down", Action::Tap(KeyCode::DOWN)),
            Fired::new("left", Action::Tap(KeyCode::LEFT)),
        ]
    );
    assert!(!scheduler.generation().watches_release_of(KeyCode::CAPSLOCK));

    // The next tap is an escape again.
    let fired = feed(
        &mut scheduler,
        &[down(KeyCode::CAPSLOCK, 500), up(KeyCode::CAPSLOCK, 550)],
    );
    assert_eq!(fired, vec![Fired::new("caps-layer", Action::Tap(KeyCode::ESC))]);
}

#[test]
fn two_keyboards_of_noise_never_fire() {
    let layout = Layout::new(vec![
        Rule::new("caps2esc", pushed(Some(KeyCode::CAPSLOCK)), Action::Tap(KeyCode::ESC)),
        Rule::new(
            "double-caps",
            within(
                chrono::TimeDelta::milliseconds(300),
                repeat(2, pushed(Some(KeyCode::CAPSLOCK))),
            ),
            Action::Log("double".into()),
        ),
        Rule::new(
            "caps-h",
            held(KeyCode::CAPSLOCK, pushed(Some(KeyCode::H))),
            Action::Tap(KeyCode::LEFT),
        ),
    ]);
    let mut scheduler = recording(layout);
    let mut first = StdRng::seed_from_u64(1);
    let mut second = StdRng::seed_from_u64(2);
    let mut picker = StdRng::seed_from_u64(3);

    for millis in 0..20_000 {
        let keyboard = if picker.gen_bool(0.5) { &mut first } else { &mut second };
        let event = noise_event(keyboard, &[KeyCode::CAPSLOCK], millis);
        let report = scheduler.deliver(&event);
        assert!(report.fired.is_empty(), "spurious fire on {event:?}");
    }
    assert!(scheduler.dispatcher().fired.is_empty());
}

#[test]
fn toml_layout_drives_the_scheduler() {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(
        br#"
        [[rules]]
        name = "caps2esc"
        pattern = { pushed = "KEY_CAPSLOCK" }
        action = { tap = "KEY_ESC" }

        [[rules]]
        name = "space-then-a"
        pattern = { sequence = [{ pushed = "KEY_SPACE" }, { pressed = "KEY_A" }] }
        action = { log = "space, then a" }
        "#,
    )
    .unwrap();
    let config = KeyparseConfig::load(Some(file.path())).unwrap();
    let mut scheduler = Scheduler::with_config(
        config.layout().unwrap(),
        RecordingDispatcher::new(),
        &config.engine,
    );

    let fired = feed(
        &mut scheduler,
        &[
            down(KeyCode::SPACE, 0),
            up(KeyCode::SPACE, 10),
            down(KeyCode::A, 20),
            down(KeyCode::CAPSLOCK, 30),
            up(KeyCode::CAPSLOCK, 40),
        ],
    );
    assert_eq!(
        fired,
        vec![
            Fired::new("space-then-a", Action::Log("space, then a".into())),
            Fired::new("caps2esc", Action::Tap(KeyCode::ESC)),
        ]
    );
}

#[test]
fn example_layout_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../keyparse.example.toml");
    let config = KeyparseConfig::load(Some(&path)).unwrap();
    assert_eq!(config.engine.reseed, ReseedPolicy::EveryEvent);

    let layout = config.layout().unwrap();
    let names: Vec<&str> = layout.rules().iter().map(|rule| rule.name.as_str()).collect();
    assert_eq!(names, vec!["caps-layer", "double-space", "leader"]);

    let mut scheduler = recording(layout);
    let fired = feed(
        &mut scheduler,
        &[
            down(KeyCode::SPACE, 0),
            up(KeyCode::SPACE, 50),
            down(KeyCode::SPACE, 100),
            up(KeyCode::SPACE, 150),
        ],
    );
    assert_eq!(fired, vec![Fired::new("double-space", Action::Log("double space".into()))]);

    let fired = feed(
        &mut scheduler,
        &[
            down(KeyCode::CAPSLOCK, 1_000),
            down(KeyCode::K, 1_100),
            up(KeyCode::K, 1_150),
            up(KeyCode::CAPSLOCK, 1_200),
            down(KeyCode::CAPSLOCK, 1_300),
            up(KeyCode::CAPSLOCK, 1_350),
        ],
    );
    assert_eq!(
        fired,
        vec![
            Fired::new("up", Action::Tap(KeyCode::UP)),
            Fired::new("caps-layer", Action::Tap(KeyCode::ESC)),
        ]
    );
}
