//! One end-to-end play invocation.
//!
//! A session loads the player, runs every subsystem's `init` concurrently,
//! executes the client's commands one at a time and then finishes the
//! subsystems tier by tier. Any error ends the session before anything is
//! written back.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use dontdie_db::{BlobStore, KeyValueStore};
use futures::future::try_join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::commands::{self, PlayRequest};
use crate::dataset::DatasetCache;
use crate::entity_cache::EntityCache;
use crate::error::GameError;
use crate::helpers::local_time;
use crate::output::Output;
use crate::systems::{Subsystem, Systems};

/// Source of the current time.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(time) => *time,
        }
    }
}

/// Where game data lives and how game time is reckoned.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub main_bucket: String,
    pub player_table: String,
    pub static_data_prefix: String,
    pub time_zone_offset_hours: i32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            main_bucket: "dontdie-main".to_string(),
            player_table: "Player".to_string(),
            static_data_prefix: "static-data/".to_string(),
            time_zone_offset_hours: -8,
        }
    }
}

/// Process-wide state shared by every session.
pub struct GameContext {
    pub store: Arc<dyn KeyValueStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub datasets: DatasetCache,
    pub settings: GameSettings,
    pub clock: Clock,
}

impl GameContext {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        blobs: Arc<dyn BlobStore>,
        settings: GameSettings,
    ) -> Self {
        let datasets = DatasetCache::new(
            Arc::clone(&blobs),
            &settings.main_bucket,
            &settings.static_data_prefix,
        );
        Self {
            store,
            blobs,
            datasets,
            settings,
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

pub struct Session {
    context: Arc<GameContext>,
    player_id: String,
    systems: Systems,
    output: Mutex<Output>,
    entities: EntityCache,
}

impl Session {
    /// Create the session and initialize every subsystem concurrently.
    /// The first failing `init` aborts the session.
    pub async fn start(context: Arc<GameContext>, player_id: String) -> Result<Self, GameError> {
        let session = Self {
            context,
            player_id,
            systems: Systems::new(),
            output: Mutex::new(Output::default()),
            entities: EntityCache::new(),
        };

        try_join_all(session.systems.iter().map(|system| session.init_system(system))).await?;

        info!(player_id = %session.player_id, "session started");
        Ok(session)
    }

    async fn init_system(&self, system: &dyn Subsystem) -> Result<(), GameError> {
        system.init(self).await.inspect_err(|err| {
            warn!(system = system.name(), error = %err, "subsystem init failed");
        })
    }

    pub fn context(&self) -> &GameContext {
        &self.context
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn systems(&self) -> &Systems {
        &self.systems
    }

    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    /// Mutate the output. The closure must not block.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut Output) -> R) -> R {
        f(&mut self.output.lock())
    }

    /// Current time in the designers' local time zone.
    pub fn local_now(&self) -> NaiveDateTime {
        local_time(
            self.context.clock.now(),
            self.context.settings.time_zone_offset_hours,
        )
    }

    /// End the session.
    ///
    /// On an upstream error nothing is finished or written and the error is
    /// returned. Otherwise subsystems finish tier by tier, each tier
    /// concurrently, and the accumulated output is returned.
    pub async fn finish(self, outcome: Result<(), GameError>) -> Result<Output, GameError> {
        if let Err(err) = outcome {
            warn!(player_id = %self.player_id, error = %err, "session failed, discarding changes");
            return Err(err);
        }

        let mut ordered: Vec<&dyn Subsystem> = self.systems.iter().collect();
        ordered.sort_by_key(|system| system.finish_tier());

        for tier in ordered.chunk_by(|a, b| a.finish_tier() == b.finish_tier()) {
            debug!(tier = ?tier[0].finish_tier(), systems = tier.len(), "finishing tier");
            try_join_all(tier.iter().map(|system| system.finish(&self))).await?;
        }

        info!(player_id = %self.player_id, "session finished");
        Ok(self.output.into_inner())
    }
}

/// Handle one client invocation from identity check to output.
pub async fn play(
    context: Arc<GameContext>,
    identity: Option<&str>,
    request: PlayRequest,
) -> Result<Output, GameError> {
    let player_id = match identity.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(GameError::IdentityInvalid),
    };

    let commands = commands::parse_commands(request.commands.as_deref())?;

    let session = Session::start(context, player_id).await?;
    let outcome = commands::run_commands(&session, &commands, &request.input).await;
    session.finish(outcome).await
}
