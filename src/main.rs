use ironsight::app::App;
use ironsight::config::GameConfig;
use ironsight::game::Game;
use ironsight::input::Input;
use ironsight::render::HeadlessRenderer;

use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = GameConfig::load_or_default("config/game.json");
    let mut input = Input::new();

    let app = App::new(&config.window)?;
    // The render backend is pluggable; the stock build ships the headless
    // one and leaves drawing to whichever backend the platform wires in.
    let game = Game::new(config, Box::new(HeadlessRenderer::new()), &mut input)?;

    info!("scene ready, starting frame loop");
    app.run(game, input)?;
    Ok(())
}
