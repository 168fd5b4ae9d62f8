use thc_core::ignition::{IgnitionController, IgnitionState};
use thc_core::sim::{SimQueue, SimTorch};

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
}

fn unlocked() -> IgnitionController<SimTorch> {
    let mut torch = IgnitionController::new(SimTorch::default());
    torch.init();
    torch.unlock();
    torch
}

#[test]
fn cut_ends_once_queue_drains() {
    let mut torch = unlocked();
    let mut queue = SimQueue::default();
    queue.push(3);

    assert!(torch.start());
    assert_eq!(torch.state(), IgnitionState::Igniting);
    assert!(torch.signals().torch_on);

    torch.signals_mut().transferred = true;
    torch.update(&queue);
    assert_eq!(torch.state(), IgnitionState::Established);

    torch.stop_after_move();
    for tick in 0..3 {
        let step = torch.update(&queue);
        assert_eq!(
            step.state,
            IgnitionState::Established,
            "tick {tick} must keep cutting while motion is queued"
        );
        assert!(torch.signals().torch_on);
        queue.complete_one();
    }

    assert_eq!(queue.pending, 0);
    let step = torch.update(&queue);
    assert_eq!(step.state, IgnitionState::Off);
    assert!(!torch.signals().torch_on);
    assert!(!torch.stop_pending());
}

#[test]
fn start_is_refused_until_unlocked() {
    let mut torch = IgnitionController::new(SimTorch::default());
    torch.init();

    assert!(!torch.start());
    assert_eq!(torch.state(), IgnitionState::Locked);
    assert_eq!(torch.signals().starts, 0);

    torch.unlock();
    assert!(torch.start());
    assert_eq!(torch.signals().starts, 1);
}

#[test]
fn arc_loss_stops_torch_exactly_once() {
    let mut torch = unlocked();
    let queue = SimQueue::default();
    torch.start();
    torch.signals_mut().transferred = true;
    torch.update(&queue);
    torch.stop_after_move();

    torch.signals_mut().transferred = false;
    let lost = torch.update(&queue);
    assert!(lost.arc_lost());
    assert!(!torch.signals().torch_on);

    for _ in 0..5 {
        let step = torch.update(&queue);
        assert!(!step.changed());
        assert_eq!(step.torch, None);
    }
    assert_eq!(torch.state(), IgnitionState::Lost);
}

#[test]
fn random_commands_never_escape_lock() {
    let mut rng = XorShift(0x1234_5678);
    let mut queue = SimQueue::default();
    let mut torch = IgnitionController::new(SimTorch::default());
    torch.init();

    for _ in 0..5_000 {
        let before = torch.state();
        let roll = rng.next() % 7;
        torch.signals_mut().transferred = rng.next() % 2 == 0;
        queue.pending = rng.next() % 3;

        match roll {
            0 => {
                let accepted = torch.start();
                assert_eq!(accepted, before != IgnitionState::Locked);
                if before == IgnitionState::Locked {
                    assert_eq!(torch.state(), IgnitionState::Locked);
                }
            }
            1 => {
                torch.stop();
                assert!(!torch.signals().torch_on);
            }
            2 => {
                torch.lock();
                assert_eq!(torch.state(), IgnitionState::Locked);
            }
            3 => {
                torch.unlock();
                assert_eq!(torch.state(), IgnitionState::Off);
            }
            4 => torch.stop_after_move(),
            _ => {
                let transferred = torch.signals().transferred;
                let step = torch.update(&queue);
                match before {
                    IgnitionState::Igniting => {
                        let expected = if transferred {
                            IgnitionState::Established
                        } else {
                            IgnitionState::Igniting
                        };
                        assert_eq!(step.state, expected);
                    }
                    IgnitionState::Established if !transferred => {
                        assert_eq!(step.state, IgnitionState::Lost);
                    }
                    IgnitionState::Established => {
                        assert!(matches!(
                            step.state,
                            IgnitionState::Established | IgnitionState::Off
                        ));
                    }
                    stable => assert_eq!(step.state, stable),
                }
            }
        }

        if before == IgnitionState::Locked && roll != 3 {
            assert_eq!(torch.state(), IgnitionState::Locked);
        }
        if torch.state() == IgnitionState::Lost {
            assert!(!torch.signals().torch_on);
        }
    }
}
