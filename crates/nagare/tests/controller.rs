use std::num::NonZeroUsize;

use bytes::Bytes;
use nagare::{
    config::OverflowPolicy,
    controller::{Command, DrainController, DrainState},
    queue::FragmentQueue,
    NagareError, PlayerConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::fake::{base_url, locator};

const FRAGMENT_DURATION: f64 = 2.;

#[test]
fn test_random_interleaving_keeps_single_flight_and_order() {
    let error = NagareError::HttpError(reqwest::StatusCode::SERVICE_UNAVAILABLE);

    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut controller = DrainController::new(FragmentQueue::new(), 1);
        let total = 40;

        let mut announced = Vec::new();
        let mut appended = Vec::new();
        let mut pending: Option<Command> = None;
        let mut buffered_end: Option<f64> = None;

        loop {
            let announce = announced.len() < total && (pending.is_none() || rng.gen_bool(0.5));
            if announce {
                let l = locator(&format!("seg_{}.mp4", announced.len()));
                announced.push(l.clone());

                if let Some(command) = controller.enqueue(l) {
                    assert!(pending.is_none(), "second operation started (seed {seed})");
                    pending = Some(command);
                }
                if announced.len() == total {
                    if let Some(command) = controller.close_input() {
                        assert!(pending.is_none(), "second operation started (seed {seed})");
                        pending = Some(command);
                    }
                }
                continue;
            }

            match pending.take() {
                Some(Command::Fetch(_)) if rng.gen_bool(0.2) => {
                    pending = controller.on_fetch_failed(&error);
                }
                Some(Command::Fetch(_)) => {
                    pending = Some(controller.on_fetch_complete(Bytes::new(), buffered_end));
                }
                Some(Command::Append {
                    locator, offset, ..
                }) => {
                    assert_eq!(offset, buffered_end.unwrap_or(0.), "seed {seed}");
                    appended.push(locator);
                    buffered_end = Some(offset + FRAGMENT_DURATION);
                    pending = controller.on_append_complete();
                }
                Some(Command::EndOfStream) => break,
                None => unreachable!("controller idle after input closed (seed {seed})"),
            }
        }

        let report = controller.report();
        let expected: Vec<_> = announced
            .iter()
            .filter(|l| !report.failed.contains(l))
            .cloned()
            .collect();
        assert_eq!(appended, expected, "seed {seed}");
        assert_eq!(report.appended, appended.len());
        assert_eq!(report.last_appended.as_ref(), appended.last());
        assert_eq!(report.appended + report.failed.len(), total);
        assert_eq!(
            buffered_end.unwrap_or(0.),
            report.appended as f64 * FRAGMENT_DURATION
        );
        assert_eq!(controller.state(), &DrainState::EndOfStream);
    }
}

#[test]
fn test_dedup_from_config() {
    let mut config = PlayerConfig::fixed(vec!["seg_0.mp4".to_string()], base_url());
    config.dedup = true;
    let mut controller = DrainController::from_config(&config);

    assert_eq!(
        controller.enqueue(locator("seg_0.mp4")),
        Some(Command::Fetch(locator("seg_0.mp4")))
    );
    // still in flight, announced again
    assert_eq!(controller.enqueue(locator("seg_0.mp4")), None);
    assert!(controller.queue().is_empty());
    assert_eq!(controller.report().dropped, 1);
}

#[test]
fn test_duplicates_kept_by_default() {
    let config = PlayerConfig::fixed(vec!["seg_0.mp4".to_string()], base_url());
    let mut controller = DrainController::from_config(&config);

    controller.enqueue(locator("seg_0.mp4"));
    controller.enqueue(locator("seg_0.mp4"));
    assert_eq!(controller.queue().len(), 1);
    assert_eq!(controller.report().dropped, 0);
}

#[test]
fn test_overflow_drop_oldest() {
    let mut config = PlayerConfig::fixed(vec!["seg_0.mp4".to_string()], base_url());
    config.queue_capacity = NonZeroUsize::new(1);
    config.overflow = OverflowPolicy::DropOldest;
    let mut controller = DrainController::from_config(&config);

    controller.enqueue(locator("seg_0.mp4"));
    controller.enqueue(locator("seg_1.mp4"));
    controller.enqueue(locator("seg_2.mp4"));
    assert_eq!(controller.report().dropped, 1);

    controller.on_fetch_complete(Bytes::new(), None);
    assert_eq!(
        controller.on_append_complete(),
        Some(Command::Fetch(locator("seg_2.mp4")))
    );
}

#[test]
fn test_overflow_drop_newest() {
    let mut config = PlayerConfig::fixed(vec!["seg_0.mp4".to_string()], base_url());
    config.queue_capacity = NonZeroUsize::new(1);
    let mut controller = DrainController::from_config(&config);

    controller.enqueue(locator("seg_0.mp4"));
    controller.enqueue(locator("seg_1.mp4"));
    controller.enqueue(locator("seg_2.mp4"));
    assert_eq!(controller.report().dropped, 1);
    assert_eq!(
        controller.queue().iter().collect::<Vec<_>>(),
        vec![&locator("seg_1.mp4")]
    );
}

#[test]
fn test_finished_session_ignores_locators() {
    let mut controller = DrainController::new(FragmentQueue::new(), 0);
    assert_eq!(controller.close_input(), Some(Command::EndOfStream));
    assert!(controller.is_finished());

    assert_eq!(controller.enqueue(locator("seg_0.mp4")), None);
    assert!(controller.queue().is_empty());

    controller.reset();
    assert_eq!(controller.state(), &DrainState::Idle);
    assert_eq!(
        controller.enqueue(locator("seg_0.mp4")),
        Some(Command::Fetch(locator("seg_0.mp4")))
    );
}
