mod bounce;
mod preload;
mod stats;
#[cfg(test)]
mod tests;

use arcade_engine::Game;

pub(crate) use bounce::BounceScene;
pub(crate) use preload::PreloadScene;
pub(crate) use stats::StatsPlugin;

pub(crate) const START_SCENE: &str = preload::KEY;
const STATS_LOG_INTERVAL_STEPS: u64 = 600;

pub(crate) fn register(game: &mut Game) {
    game.add_scene(preload::KEY, Box::new(PreloadScene::default()));
    game.add_scene(bounce::KEY, Box::new(BounceScene::default()));
    game.add_plugin(Box::new(StatsPlugin::new(STATS_LOG_INTERVAL_STEPS)));
}
