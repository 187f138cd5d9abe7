use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dontdie_backend::commands::{self, Command, CommandInput, PlayRequest};
use dontdie_backend::error::GameError;
use dontdie_backend::seed::{STATIC_DATA, populate_main_bucket};
use dontdie_backend::session::{self, Clock, GameContext, GameSettings, Session};
use dontdie_backend::systems::player::ActiveMission;
use dontdie_db::{BlobStore, Database, DbError, KeyValueStore, Record};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const BUCKET: &str = "dontdie-main";
const PLAYERS: &str = "Player";

/// Store wrapper counting every read and write, with switchable blob reads.
struct CountingStore {
    db: Database,
    gets: AtomicUsize,
    updates: AtomicUsize,
    puts: AtomicUsize,
    fail_blob_reads: AtomicBool,
}

impl CountingStore {
    fn writes(&self) -> usize {
        self.updates.load(Ordering::SeqCst) + self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
        fields: &[&str],
    ) -> dontdie_db::Result<Option<Record>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.db.get(table, key_name, key_value, fields).await
    }

    async fn update(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
        values: Record,
    ) -> dontdie_db::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.db.update(table, key_name, key_value, values).await
    }
}

#[async_trait]
impl BlobStore for CountingStore {
    async fn get_object(&self, bucket: &str, key: &str) -> dontdie_db::Result<Vec<u8>> {
        if self.fail_blob_reads.load(Ordering::SeqCst) {
            return Err(DbError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.db.get_object(bucket, key).await
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> dontdie_db::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.db.put_object(bucket, key, body).await
    }
}

/// Noon on 1/1/2016 in the designers' time zone.
fn noon() -> Clock {
    Clock::Fixed(Utc.with_ymd_and_hms(2016, 1, 1, 20, 0, 0).unwrap())
}

/// Helper to create a seeded store and a game context over it
async fn setup() -> (Arc<CountingStore>, Arc<GameContext>) {
    setup_with(&[]).await
}

/// Same as `setup`, with some datasets replaced before seeding
async fn setup_with(overrides: &[(&str, &str)]) -> (Arc<CountingStore>, Arc<GameContext>) {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create in-memory database");
    for (file, body) in overrides {
        db.put_object(BUCKET, &format!("static-data/{file}"), body.as_bytes().to_vec())
            .await
            .unwrap();
    }
    populate_main_bucket(&db, BUCKET, "static-data/").await.unwrap();

    let store = Arc::new(CountingStore {
        db,
        gets: AtomicUsize::new(0),
        updates: AtomicUsize::new(0),
        puts: AtomicUsize::new(0),
        fail_blob_reads: AtomicBool::new(false),
    });
    let context = GameContext::new(store.clone(), store.clone(), GameSettings::default()).with_clock(noon());
    (store, Arc::new(context))
}

async fn seed_player(store: &CountingStore, id: &str, fields: Value) {
    let Value::Object(fields) = fields else {
        panic!("player fields must be an object");
    };
    store.db.update(PLAYERS, "PlayerID", id, fields).await.unwrap();
}

async fn stored_player(store: &CountingStore, id: &str) -> Record {
    store
        .db
        .get(PLAYERS, "PlayerID", id, &[])
        .await
        .unwrap()
        .unwrap_or_default()
}

async fn stored_scores(store: &CountingStore) -> Value {
    let body = store.db.get_object(BUCKET, "highscores").await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn request(body: Value) -> PlayRequest {
    serde_json::from_value(body).unwrap()
}

async fn play(context: &Arc<GameContext>, id: &str, body: Value) -> Result<Value, GameError> {
    session::play(Arc::clone(context), Some(id), request(body))
        .await
        .map(|output| serde_json::to_value(output).unwrap())
}

fn steve() -> Value {
    json!({
        "Username": "steve",
        "FavoriteColor": "3",
        "StartGameTime": "01-01-2016 11:59:40"
    })
}

fn titles(output: &Value) -> Vec<String> {
    output["player"]["updates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|update| update["title"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// SESSION LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_missing_identity_fails_before_any_subsystem_runs() {
    let (store, context) = setup().await;

    for identity in [None, Some(""), Some("   ")] {
        let result = session::play(
            Arc::clone(&context),
            identity,
            request(json!({ "commands": ["getPlayerInfo"] })),
        )
        .await;
        assert!(matches!(result, Err(GameError::IdentityInvalid)));
    }

    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_command_fails_before_execution() {
    let (store, context) = setup().await;

    let result = play(&context, "p1", json!({ "commands": ["setupPlayer", "fly"] })).await;

    assert!(matches!(result, Err(GameError::UnknownCommand(name)) if name == "fly"));
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_init_failure_runs_no_commands_and_writes_nothing() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;
    store.fail_blob_reads.store(true, Ordering::SeqCst);

    let result = play(
        &context,
        "p1",
        json!({ "commands": ["setupPlayer", "endGame"], "username": "bob", "favoriteColor": 1 }),
    )
    .await;

    assert!(matches!(result, Err(GameError::Dataset(_))));
    assert_eq!(store.writes(), 0);
    assert_eq!(stored_player(&store, "p1").await["Username"], json!("steve"));
}

#[tokio::test]
async fn test_loaded_player_with_no_changes_writes_nothing() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;

    let output = play(
        &context,
        "p1",
        json!({ "commands": ["getPlayerInfo", "getMessageOfTheDay", "getHighScoreTable"] }),
    )
    .await
    .unwrap();

    assert_eq!(output["getPlayerInfo"]["playerFound"], json!(true));
    assert_eq!(output["getPlayerInfo"]["favoriteColor"], json!("3"));
    assert_eq!(
        output["messageOfTheDay"],
        json!({ "message": "Message of the Day!", "color": "3" })
    );
    assert_eq!(output["highScoreTable"], json!({ "scores": [] }));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_unknown_player_is_reported_not_found() {
    let (store, context) = setup().await;

    let output = play(&context, "ghost", json!({ "commands": ["getPlayerInfo"] }))
        .await
        .unwrap();

    assert_eq!(output["getPlayerInfo"], json!({ "playerFound": false }));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_commands_needing_a_player_fail_for_unknown_player() {
    let (store, context) = setup().await;

    for command in ["startGame", "endGame", "getDailyGift"] {
        let result = play(&context, "ghost", json!({ "commands": [command] })).await;
        assert!(matches!(result, Err(GameError::PlayerNotLoaded)), "{command}");
    }
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_setup_player_persists_only_written_fields() {
    let (store, context) = setup().await;

    let output = play(
        &context,
        "p1",
        json!({ "commands": ["setupPlayer", "getPlayerInfo"], "username": "steve", "favoriteColor": 3 }),
    )
    .await
    .unwrap();

    assert_eq!(output["getPlayerInfo"]["playerFound"], json!(true));
    assert_eq!(store.updates.load(Ordering::SeqCst), 1);

    let stored = stored_player(&store, "p1").await;
    let mut fields: Vec<&str> = stored.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["FavoriteColor", "Username"]);
    assert_eq!(stored["FavoriteColor"], json!("3"));
}

#[tokio::test]
async fn test_setup_player_validation() {
    let (store, context) = setup().await;

    let missing = play(&context, "p1", json!({ "commands": ["setupPlayer"], "username": "steve" })).await;
    assert!(matches!(missing, Err(GameError::MissingCommandData(_))));

    let invalid = play(
        &context,
        "p1",
        json!({ "commands": ["setupPlayer"], "username": "no spaces", "favoriteColor": "red" }),
    )
    .await;
    assert!(matches!(invalid, Err(GameError::Validation(_))));

    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_failed_command_discards_earlier_changes() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;

    let result = play(
        &context,
        "p1",
        json!({ "commands": ["startGame", "setupPlayer"] }),
    )
    .await;

    assert!(matches!(result, Err(GameError::MissingCommandData(_))));
    assert_eq!(store.writes(), 0);
    assert_eq!(
        stored_player(&store, "p1").await["StartGameTime"],
        json!("01-01-2016 11:59:40")
    );
}

// =============================================================================
// GAMEPLAY
// =============================================================================

#[tokio::test]
async fn test_start_game_records_local_time() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", json!({ "Username": "steve", "FavoriteColor": "3" })).await;

    play(&context, "p1", json!({ "commands": ["startGame"] }))
        .await
        .unwrap();

    assert_eq!(
        stored_player(&store, "p1").await["StartGameTime"],
        json!("01-01-2016 12:00:00")
    );
}

#[tokio::test]
async fn test_end_game_scores_and_grants_achievement() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;

    let output = play(&context, "p1", json!({ "commands": ["endGame"] }))
        .await
        .unwrap();

    assert_eq!(
        output["player"]["endGameInfo"],
        json!({ "score": 20, "madeHighScoreTable": true, "endGameTime": "01-01-2016 12:00:00" })
    );
    assert_eq!(
        output["player"]["updates"],
        json!([{
            "title": "Achievement Unlocked!",
            "desc": "Fancy Ship acquired!",
            "item": "FancyShip",
            "itemIcon": "levels/samples/dont_die/textures/fancy_ship.dds"
        }])
    );

    let stored = stored_player(&store, "p1").await;
    assert_eq!(stored["LastScore"], json!(20));
    assert_eq!(stored["TotalScore"], json!(20));
    assert_eq!(stored["Inventory"], json!(["FancyShip"]));
    assert_eq!(stored["Achievements"], json!({ "Survival": 1 }));

    assert_eq!(
        stored_scores(&store).await,
        json!({ "scores": [{ "Score": 20, "Username": "steve", "Color": "3" }] })
    );
}

#[tokio::test]
async fn test_end_game_rejects_non_integer_total_score() {
    let (store, context) = setup().await;
    let mut player = steve();
    player["TotalScore"] = json!(12.5);
    seed_player(&store, "p1", player).await;

    let result = play(&context, "p1", json!({ "commands": ["endGame"] })).await;

    assert!(matches!(result, Err(GameError::Corrupt { what: "TotalScore", .. })));
    assert_eq!(store.writes(), 0);
    assert_eq!(stored_player(&store, "p1").await["TotalScore"], json!(12.5));
}

#[tokio::test]
async fn test_achievement_is_not_granted_twice_across_sessions() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;

    let first = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();
    let second = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();

    assert_eq!(titles(&first), vec!["Achievement Unlocked!"]);
    assert!(titles(&second).is_empty());

    let stored = stored_player(&store, "p1").await;
    assert_eq!(stored["TotalScore"], json!(40));
    assert_eq!(stored["Inventory"], json!(["FancyShip"]));
}

#[tokio::test]
async fn test_achievement_evaluator_grants_at_most_once() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", json!({ "Username": "steve", "LastScore": 30 })).await;

    let session = Session::start(Arc::clone(&context), "p1".to_string()).await.unwrap();
    let achievements = &session.systems().achievements;

    assert_eq!(achievements.grant_earned(&session).unwrap(), vec!["Survival"]);
    assert!(achievements.grant_earned(&session).unwrap().is_empty());

    let output = session.finish(Ok(())).await.unwrap();
    assert_eq!(output.player.updates.len(), 1);
}

#[tokio::test]
async fn test_unmet_criteria_grant_nothing() {
    let (store, context) = setup().await;
    seed_player(
        &store,
        "p1",
        json!({ "Username": "steve", "FavoriteColor": "3", "StartGameTime": "01-01-2016 11:59:55" }),
    )
    .await;

    let output = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();

    assert_eq!(output["player"]["endGameInfo"]["score"], json!(5));
    assert!(titles(&output).is_empty());
    assert!(!stored_player(&store, "p1").await.contains_key("Achievements"));
}

#[tokio::test]
async fn test_unknown_reward_item_aborts_without_writes() {
    let (store, context) = setup_with(&[(
        "achievements.csv",
        "Name,CompletionCriteria,ItemReward,CompletionText\nHaunted,player.LastScore >= 1,Ghost,Boo",
    )])
    .await;
    seed_player(&store, "p1", steve()).await;

    let result = play(&context, "p1", json!({ "commands": ["endGame"] })).await;

    assert!(matches!(result, Err(GameError::ItemNotFound(item)) if item == "Ghost"));
    assert_eq!(store.updates.load(Ordering::SeqCst), 0);
    assert!(!stored_player(&store, "p1").await.contains_key("LastScore"));
}

#[tokio::test]
async fn test_unreadable_criteria_never_grant() {
    let (store, context) = setup_with(&[(
        "achievements.csv",
        "Name,CompletionCriteria,ItemReward,CompletionText\nBroken,player.LastScore >=,,Nope",
    )])
    .await;
    seed_player(&store, "p1", steve()).await;

    let output = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();

    assert!(titles(&output).is_empty());
}

#[tokio::test]
async fn test_deeply_nested_criteria_never_grant() {
    let nested = format!("{}player.LastScore >= 1", "NOT NOT ".repeat(60));
    let achievements = format!("Name,CompletionCriteria,ItemReward,CompletionText\nDeep,{nested},,Deep");
    let (store, context) = setup_with(&[("achievements.csv", achievements.as_str())]).await;
    seed_player(&store, "p1", steve()).await;

    let output = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();

    assert!(titles(&output).is_empty());
    assert_eq!(stored_player(&store, "p1").await.get("Achievements"), None);
}

// =============================================================================
// MISSIONS AND DAILY GIFTS
// =============================================================================

#[tokio::test]
async fn test_daily_gift_starts_mission_once_per_interval() {
    let (store, context) = setup().await;
    seed_player(&store, "p1", steve()).await;

    let first = play(&context, "p1", json!({ "commands": ["getDailyGift"] })).await.unwrap();

    assert_eq!(first["dailyGift"], json!({ "giftGiven": true }));
    assert_eq!(first["player"]["mission"]["status"], json!("Start"));
    assert_eq!(
        first["player"]["mission"]["activeMissionData"],
        json!({ "MissionId": "ShieldMission", "NumGamesCompleted": 0 })
    );

    let stored = stored_player(&store, "p1").await;
    assert_eq!(stored["LastDailyGiftTime"], json!("01-01-2016 12:00:00"));
    assert_eq!(
        stored["ActiveMission"],
        json!({ "MissionId": "ShieldMission", "NumGamesCompleted": 0 })
    );

    let second = play(&context, "p1", json!({ "commands": ["getDailyGift"] })).await.unwrap();
    assert_eq!(second["dailyGift"], json!({ "giftGiven": false }));
}

#[tokio::test]
async fn test_mission_progress_and_completion() {
    let (store, context) = setup_with(&[(
        "missions.csv",
        "Name,CompletionText,Description,ItemReward,NumberOfGamesReq\nShieldMission,Shield acquired!,Play two games,Shield,2",
    )])
    .await;
    let mut player = steve();
    player["ActiveMission"] = json!({ "MissionId": "ShieldMission", "NumGamesCompleted": 0 });
    seed_player(&store, "p1", player).await;

    let first = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();
    assert_eq!(first["player"]["mission"]["status"], json!("InProgress"));
    assert_eq!(
        first["player"]["mission"]["activeMissionData"]["NumGamesCompleted"],
        json!(1)
    );

    let second = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();
    assert_eq!(second["player"]["mission"]["status"], json!("Complete"));
    assert!(titles(&second).contains(&"Mission Complete!".to_string()));

    let stored = stored_player(&store, "p1").await;
    assert_eq!(stored["ActiveMission"], json!({}));
    // The shield does not persist
    assert_eq!(stored["Inventory"], json!(["FancyShip"]));
}

#[tokio::test]
async fn test_mission_completion_is_idempotent() {
    let (store, context) = setup().await;
    seed_player(
        &store,
        "p1",
        json!({ "ActiveMission": { "MissionId": "ShieldMission", "NumGamesCompleted": 1 } }),
    )
    .await;

    let session = Session::start(Arc::clone(&context), "p1".to_string()).await.unwrap();
    let systems = session.systems();

    systems.missions.update_active_mission(&session).unwrap();
    assert!(!systems.player.has_active_mission());
    assert_eq!(systems.player.session_inventory(), vec!["Shield".to_string()]);

    systems.missions.update_active_mission(&session).unwrap();
    assert!(!systems.player.has_active_mission());
    assert_eq!(systems.player.session_inventory().len(), 1);
}

#[tokio::test]
async fn test_only_one_active_mission() {
    let (_store, context) = setup().await;
    let session = Session::start(Arc::clone(&context), "p1".to_string()).await.unwrap();
    let systems = session.systems();
    systems.player.mark_loaded();

    systems.missions.start_mission(&session, "ShieldMission").unwrap();
    assert!(matches!(
        systems.missions.start_mission(&session, "ShieldMission"),
        Err(GameError::AlreadyHasMission)
    ));
    assert_eq!(
        systems.player.active_mission().unwrap(),
        Some(ActiveMission::new("ShieldMission"))
    );

    systems.player.set_active_mission(None).unwrap();
    assert!(matches!(
        systems.missions.start_mission(&session, "MoonMission"),
        Err(GameError::MissionNotFound(_))
    ));
}

// =============================================================================
// HIGH SCORES
// =============================================================================

#[tokio::test]
async fn test_missing_high_score_object_is_an_empty_table() {
    let db = Database::open_in_memory().await.unwrap();
    for (file, body) in STATIC_DATA {
        db.put_object(BUCKET, &format!("static-data/{file}"), body.as_bytes().to_vec())
            .await
            .unwrap();
    }
    let db = Arc::new(db);
    let context = Arc::new(GameContext::new(db.clone(), db.clone(), GameSettings::default()).with_clock(noon()));

    let output = play(&context, "p1", json!({ "commands": ["getHighScoreTable"] }))
        .await
        .unwrap();

    assert_eq!(output["highScoreTable"], json!({ "scores": [] }));
    assert!(db.get_object(BUCKET, "highscores").await.is_err());
}

#[tokio::test]
async fn test_unreadable_high_score_object_fails_the_session() {
    let (store, context) = setup().await;
    store.db.put_object(BUCKET, "highscores", b"not json".to_vec()).await.unwrap();

    let result = play(&context, "p1", json!({ "commands": ["getHighScoreTable"] })).await;

    assert!(matches!(result, Err(GameError::Corrupt { .. })));
}

#[tokio::test]
async fn test_full_table_rejects_low_score() {
    let (store, context) = setup().await;
    let scores: Vec<Value> = (0..10)
        .map(|i| json!({ "Score": 100 - i, "Username": format!("p{i}"), "Color": "1" }))
        .collect();
    store
        .db
        .put_object(BUCKET, "highscores", serde_json::to_vec(&json!({ "scores": scores })).unwrap())
        .await
        .unwrap();
    seed_player(&store, "p1", steve()).await;

    let output = play(&context, "p1", json!({ "commands": ["endGame"] })).await.unwrap();

    assert_eq!(output["player"]["endGameInfo"]["madeHighScoreTable"], json!(false));
    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
}

/// Concurrent submissions are not coordinated: the second write-back
/// replaces the first and its score is lost.
#[tokio::test]
async fn test_concurrent_submissions_lose_an_update() {
    let (store, context) = setup().await;
    seed_player(&store, "alice", json!({ "Username": "alice", "FavoriteColor": "1", "StartGameTime": "01-01-2016 11:59:30" })).await;
    seed_player(&store, "bob", json!({ "Username": "bob", "FavoriteColor": "2", "StartGameTime": "01-01-2016 11:59:50" })).await;

    let alice = Session::start(Arc::clone(&context), "alice".to_string()).await.unwrap();
    let bob = Session::start(Arc::clone(&context), "bob".to_string()).await.unwrap();

    let input = CommandInput::default();
    let alice_outcome = commands::run_commands(&alice, &[Command::EndGame], &input).await;
    let bob_outcome = commands::run_commands(&bob, &[Command::EndGame], &input).await;

    alice.finish(alice_outcome).await.unwrap();
    bob.finish(bob_outcome).await.unwrap();

    assert_eq!(
        stored_scores(&store).await,
        json!({ "scores": [{ "Score": 10, "Username": "bob", "Color": "2" }] })
    );
}
