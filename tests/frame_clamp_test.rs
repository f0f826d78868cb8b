/// Frame pacing properties of the simulation loop: the delta clamp and the
/// bounded fixed sub-stepping behind it.

use approx::assert_relative_eq;

use ironsight::config::GameConfig;
use ironsight::game::Game;
use ironsight::input::Input;
use ironsight::render::HeadlessRenderer;

fn start() -> (Game, Input) {
    let mut input = Input::new();
    let game = Game::new(
        GameConfig::default(),
        Box::new(HeadlessRenderer::new()),
        &mut input,
    )
    .expect("scene must build");
    (game, input)
}

#[test]
fn a_five_second_hitch_advances_at_most_one_thirtieth() {
    let (mut game, mut input) = start();

    let before = game.physics().simulated_time();
    game.advance_frame(&mut input, 5.0).unwrap();
    let advanced = game.physics().simulated_time() - before;

    assert!(advanced <= 1.0 / 30.0 + 1e-6);
    assert_relative_eq!(advanced as f32, 1.0 / 30.0, epsilon = 1e-4);
}

#[test]
fn steady_frames_track_real_time() {
    let (mut game, mut input) = start();

    for _ in 0..30 {
        game.advance_frame(&mut input, 1.0 / 60.0).unwrap();
    }

    assert_relative_eq!(game.physics().simulated_time() as f32, 0.5, epsilon = 1e-4);
}

#[test]
fn negative_deltas_do_not_rewind_the_simulation() {
    let (mut game, mut input) = start();

    game.advance_frame(&mut input, 1.0 / 60.0).unwrap();
    let before = game.physics().simulated_time();
    game.advance_frame(&mut input, -1.0).unwrap();

    assert!(game.physics().simulated_time() >= before);
}
