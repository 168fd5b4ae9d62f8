use thc_core::config::{MAX_THC_STEP_S, MAX_TIMER_PERIOD, TIMER_CONVERSION_CONSTANT};
use thc_core::height::{
    ControlState, HeightConfig, HeightController, TargetSpeedLaw, VoltageFeedback,
};
use thc_core::pulse::StepDirection;

struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn signed(&mut self, magnitude: i32) -> i32 {
        let span = u32::try_from(magnitude).unwrap() * 2 + 1;
        i32::try_from(self.next() % span).unwrap() - magnitude
    }
}

#[derive(Default)]
struct Scripted {
    target: i32,
    resets: u32,
}

impl TargetSpeedLaw for Scripted {
    fn reset(&mut self) {
        self.resets += 1;
    }

    fn target_speed(&mut self, _feedback: VoltageFeedback) -> i32 {
        self.target
    }
}

#[test]
fn speed_respects_acceleration_and_ceiling() {
    let mut rng = XorShift(0x2545_F491);
    let mut thc = HeightController::new(Scripted::default(), HeightConfig::default());
    thc.enable();
    let max_acceleration = thc.config().max_acceleration;

    for round in 0..20_000 {
        if round % 37 == 0 {
            thc.law_mut().target = rng.signed(40_000);
        }
        if round % 1_000 == 500 {
            thc.set_max_acceleration(rng.next() % 1_000_000);
        }
        let limit = thc.config().max_acceleration;

        let before = thc.current_speed();
        let effects = thc.update(100, VoltageFeedback::default());
        let after = thc.current_speed();

        assert!((after - before).abs() <= limit, "round {round}: {before} -> {after}");
        assert!(after.abs() <= MAX_THC_STEP_S);

        match effects.program {
            Some(program) => {
                let frequency = after.unsigned_abs();
                let expected = if frequency == 0 {
                    MAX_TIMER_PERIOD
                } else {
                    u16::try_from(TIMER_CONVERSION_CONSTANT / frequency)
                        .unwrap_or(MAX_TIMER_PERIOD)
                };
                assert_eq!(program.period, expected);
                assert_eq!(program.direction, StepDirection::from_speed(after));
            }
            None => assert_eq!(before, after),
        }
    }

    assert!(max_acceleration > 0);
    assert_eq!(thc.law_mut().resets, 1);
}

#[test]
fn disabled_controller_always_targets_zero() {
    let mut thc = HeightController::new(
        Scripted {
            target: 7_000,
            resets: 0,
        },
        HeightConfig::default(),
    );

    thc.enable();
    for _ in 0..10 {
        thc.update(100, VoltageFeedback::default());
    }
    thc.disable();
    assert_eq!(thc.target_speed(), 0);

    let mut previous = thc.current_speed();
    let mut released = 0;
    for _ in 0..100 {
        let effects = thc.update(100, VoltageFeedback::default());
        assert!(thc.current_speed() <= previous);
        previous = thc.current_speed();
        if effects.release_axis.is_some() {
            released += 1;
        }
    }

    assert_eq!(released, 1);
    assert_eq!(thc.state(), ControlState::Disabled);
    assert_eq!(thc.current_speed(), 0);
}

#[test]
fn travel_window_bounds_are_inclusive() {
    let config = HeightConfig::default().with_limits(-50, 50);
    let mut thc = HeightController::new(Scripted::default(), config);
    thc.enable();

    assert!(thc.update(-50, VoltageFeedback::default()).fault.is_none());
    assert!(thc.update(50, VoltageFeedback::default()).fault.is_none());
    assert!(thc.update(-51, VoltageFeedback::default()).fault.is_some());
}
