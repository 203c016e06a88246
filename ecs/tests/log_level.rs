//! Lives in its own binary: the `log` max level is process-wide.

use log::LevelFilter;
use moye_core::Options;
use moye_core::time::ManualClock;
use moye_ecs::Game;

#[test]
fn build_applies_the_configured_log_level() {
    let game = Game::builder()
        .with_clock(ManualClock::new(1_700_000_000_000))
        .with_options(Options::default().with_log_level(LevelFilter::Warn))
        .build()
        .unwrap();

    assert_eq!(log::max_level(), LevelFilter::Warn);
    game.dispose();
}
