use arcade_engine::app::{Graphic, HeadlessRenderer, InputEvent, Key};
use arcade_engine::loader::{AssetRecord, Cache, MemoryFetcher};
use arcade_engine::{Game, GameConfig};
use serde_json::json;

use super::bounce::{self, level_from_cache, LevelData, LEVEL_KEY};
use super::preload::PACK_URL;
use super::{register, START_SCENE};

const TICK_MS: f64 = 17.0;
/// Ball-on-ball separation may push past an edge until the next bounds check.
const EDGE_SLACK: f32 = 16.0;

const PACK: &str = r#"{
    "demo": [
        { "type": "text", "key": "credits", "url": "text/credits.txt" },
        { "type": "json", "key": "level", "url": "data/level.json" },
        { "type": "spritesheet", "key": "ball", "url": "images/ball.png", "frameWidth": 16, "frameHeight": 16 }
    ]
}"#;

struct Fixture {
    game: Game,
    now_ms: f64,
}

impl Fixture {
    /// The ball sheet is never served, so every load finishes with one failure.
    fn new() -> Self {
        let fetcher = MemoryFetcher::new();
        fetcher.insert(PACK_URL, PACK.as_bytes().to_vec());
        fetcher.insert("text/credits.txt", b"made with arcade\n".to_vec());
        fetcher.insert("data/level.json", br#"{ "balls": 5, "gravity": 200.0 }"#.to_vec());

        let config = GameConfig {
            headless: true,
            ..GameConfig::default()
        };
        let mut game = Game::new(&config, Box::new(HeadlessRenderer::new()), Box::new(fetcher));
        register(&mut game);
        game.boot(START_SCENE);
        Self { game, now_ms: 0.0 }
    }

    fn tick(&mut self) {
        self.game.update(self.now_ms);
        self.now_ms += TICK_MS;
    }

    fn run_until_bounce(&mut self) {
        for _ in 0..120 {
            self.tick();
            if self.game.scenes.current() == Some(bounce::KEY) && self.game.scenes.is_created() {
                return;
            }
        }
        panic!("bounce scene never started");
    }
}

#[test]
fn preload_hands_over_to_bounce_despite_missing_sprite() {
    let mut fixture = Fixture::new();
    fixture.run_until_bounce();

    let ctx = &fixture.game.ctx;
    assert_eq!(ctx.cache.text("credits"), Some("made with arcade\n"));
    assert!(ctx.cache.texture(bounce::BALL_KEY).is_none());
    assert_eq!(ctx.world.gravity.y, 200.0);
    // Five balls plus the paddle.
    assert_eq!(ctx.bodies.len(), 6);

    let circles = ctx
        .stage
        .depth_first()
        .into_iter()
        .filter_map(|id| ctx.stage.get(id))
        .filter(|node| matches!(node.graphic, Some(Graphic::Circle { .. })))
        .count();
    assert_eq!(circles, 5);
}

#[test]
fn balls_never_escape_world_bounds() {
    let mut fixture = Fixture::new();
    fixture.run_until_bounce();
    for _ in 0..300 {
        fixture.tick();
    }

    let bounds = fixture.game.ctx.world.bounds;
    for (_, body) in fixture.game.ctx.bodies.iter() {
        assert!(body.left() >= bounds.x - EDGE_SLACK, "left {}", body.left());
        assert!(body.top() >= bounds.y - EDGE_SLACK, "top {}", body.top());
        assert!(body.right() <= bounds.right() + EDGE_SLACK, "right {}", body.right());
        assert!(body.bottom() <= bounds.bottom() + EDGE_SLACK, "bottom {}", body.bottom());
    }
}

#[test]
fn space_spawns_a_ball_that_expires() {
    let mut fixture = Fixture::new();
    fixture.run_until_bounce();
    let before = fixture.game.ctx.bodies.len();

    fixture.game.push_input(InputEvent::KeyDown(Key::Space));
    fixture.tick();
    fixture.tick();
    fixture.game.push_input(InputEvent::KeyUp(Key::Space));
    fixture.tick();
    assert_eq!(fixture.game.ctx.bodies.len(), before + 1);

    for _ in 0..540 {
        fixture.tick();
    }
    assert_eq!(fixture.game.ctx.bodies.len(), before);
}

#[test]
fn level_data_falls_back_per_field_and_on_bad_types() {
    let mut cache = Cache::new();
    assert_eq!(level_from_cache(&cache), LevelData::default());

    cache.add(LEVEL_KEY, None, AssetRecord::Json(json!({ "balls": 3 })));
    let level = level_from_cache(&cache);
    assert_eq!(level.balls, 3);
    assert_eq!(level.gravity, LevelData::default().gravity);

    cache.add(LEVEL_KEY, None, AssetRecord::Json(json!({ "gravity": "down" })));
    assert_eq!(level_from_cache(&cache), LevelData::default());
}
