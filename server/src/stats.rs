//! Survival stats simulation
//!
//! Two independent periods drive this module. The update period decays the
//! vitals of every living player and reports deaths; the sync period pushes
//! each ready player's own vitals to its peer. Updates use the configured
//! period as the time step, so a pass always has the same effect no matter
//! how late the timer fired.

use crate::catalog::ItemEffect;
use crate::config::StatsConfig;
use crate::context::ServerContext;
use crate::network::wait_for_shutdown;
use crate::peer::Reliability;
use log::{debug, info};
use shared::{Message, PlayerId, Vitals, MAX_VITAL};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

const MIN_TEMPERATURE: f32 = -50.0;
const MAX_TEMPERATURE: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Starvation,
    Dehydration,
    ExtremeCold,
    ExtremeHeat,
    Unknown,
}

impl fmt::Display for DeathCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeathCause::Starvation => "starvation",
            DeathCause::Dehydration => "dehydration",
            DeathCause::ExtremeCold => "extreme cold",
            DeathCause::ExtremeHeat => "extreme heat",
            DeathCause::Unknown => "unknown causes",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Death {
    pub player_id: PlayerId,
    pub name: String,
    pub cause: DeathCause,
}

/// Advances one player's vitals by `dt` seconds.
pub fn step_vitals(vitals: &mut Vitals, config: &StatsConfig, dt: f32) {
    vitals.hunger = (vitals.hunger - config.hunger_decay * dt).clamp(0.0, MAX_VITAL);
    vitals.thirst = (vitals.thirst - config.thirst_decay * dt).clamp(0.0, MAX_VITAL);

    let drift = config.temperature_drift * dt;
    let offset = config.ambient_temperature - vitals.temperature;
    vitals.temperature += offset.clamp(-drift, drift);
    vitals.temperature = vitals.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);

    let starving = vitals.hunger < config.critical_threshold
        || vitals.thirst < config.critical_threshold;
    let exposed = vitals.temperature < config.cold_threshold
        || vitals.temperature > config.heat_threshold;

    let mut health_delta = 0.0;
    if starving {
        health_delta -= config.starvation_damage * dt;
    }
    if exposed {
        health_delta -= config.exposure_damage * dt;
    }
    if !starving
        && !exposed
        && vitals.hunger >= config.well_fed_threshold
        && vitals.thirst >= config.well_fed_threshold
    {
        health_delta += config.regeneration * dt;
    }
    vitals.health = (vitals.health + health_delta).clamp(0.0, MAX_VITAL);
}

/// Picks the most likely cause of death, in priority order.
pub fn death_cause(vitals: &Vitals, config: &StatsConfig) -> DeathCause {
    if vitals.hunger <= 0.0 {
        DeathCause::Starvation
    } else if vitals.thirst <= 0.0 {
        DeathCause::Dehydration
    } else if vitals.temperature < config.cold_threshold {
        DeathCause::ExtremeCold
    } else if vitals.temperature > config.heat_threshold {
        DeathCause::ExtremeHeat
    } else {
        DeathCause::Unknown
    }
}

/// Applies a consumed item's effect, capped at the vital maximum.
pub fn restore(vitals: &mut Vitals, effect: &ItemEffect) {
    vitals.health = (vitals.health + effect.health).clamp(0.0, MAX_VITAL);
    vitals.hunger = (vitals.hunger + effect.hunger).clamp(0.0, MAX_VITAL);
    vitals.thirst = (vitals.thirst + effect.thirst).clamp(0.0, MAX_VITAL);
}

/// Decays every living player once and returns the players that died in
/// this pass. A player is reported only on the pass that kills it.
pub async fn update_pass(ctx: &ServerContext) -> Vec<Death> {
    let config = &ctx.config.stats;
    let dt = ctx.config.stats_update_rate.as_secs_f32();

    ctx.registry
        .update_all(|player| {
            if player.dead {
                return None;
            }
            step_vitals(&mut player.vitals, config, dt);
            if !player.vitals.is_depleted() {
                return None;
            }

            player.dead = true;
            Some(Death {
                player_id: player.id,
                name: player.name.clone(),
                cause: death_cause(&player.vitals, config),
            })
        })
        .await
}

/// Pushes each ready player's vitals to its own peer. Returns the number of
/// updates queued.
pub async fn sync_pass(ctx: &ServerContext) -> usize {
    let mut sent = 0;
    for (player_id, vitals, peer) in ctx.registry.ready_vitals().await {
        let update = Message::StatsUpdate { player_id, vitals };
        if ctx
            .broadcaster
            .send_to(&peer, &update, Reliability::BestEffortUnordered)
        {
            sent += 1;
        }
    }
    sent
}

/// Announces a death to every ready peer, the victim included.
pub async fn handle_death(ctx: &ServerContext, death: &Death) -> usize {
    info!(
        "Player {} ({}) died of {}",
        death.player_id, death.name, death.cause
    );
    let message = Message::PlayerDeath {
        player_id: death.player_id,
        killer_name: String::new(),
    };
    ctx.broadcaster
        .broadcast_all(&message, None, Reliability::GuaranteedOrdered)
        .await
}

/// Runs the update and sync periods until shutdown.
pub async fn run_stats_loop(ctx: Arc<ServerContext>, mut shutdown: watch::Receiver<bool>) {
    let mut update = interval(ctx.config.stats_update_rate);
    let mut sync = interval(ctx.config.stats_sync_rate);
    update.set_missed_tick_behavior(MissedTickBehavior::Skip);
    sync.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // the first tick of an interval completes immediately
    update.tick().await;
    sync.tick().await;

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = update.tick() => {
                for death in update_pass(&ctx).await {
                    handle_death(&ctx, &death).await;
                }
            }
            _ = sync.tick() => {
                let sent = sync_pass(&ctx).await;
                debug!("Synced stats to {} players", sent);
            }
        }
    }
    debug!("Stats loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::testing::{test_context, TestClient};
    use assert_approx_eq::assert_approx_eq;
    use shared::Vec3;
    use std::time::Duration;

    #[test]
    fn test_decay_one_second() {
        let config = StatsConfig::default();
        let mut vitals = Vitals::default();

        step_vitals(&mut vitals, &config, 1.0);

        assert_approx_eq!(vitals.hunger, 99.9, 1e-4);
        assert_approx_eq!(vitals.thirst, 99.85, 1e-4);
        assert_approx_eq!(vitals.temperature, 20.0);
        // well fed, already at max
        assert_approx_eq!(vitals.health, 100.0);
    }

    #[test]
    fn test_temperature_drifts_without_overshoot() {
        let config = StatsConfig::default();
        let mut vitals = Vitals::new(100.0, 100.0, 100.0, 19.8);

        step_vitals(&mut vitals, &config, 1.0);
        assert_approx_eq!(vitals.temperature, 20.0);

        vitals.temperature = 30.0;
        step_vitals(&mut vitals, &config, 2.0);
        assert_approx_eq!(vitals.temperature, 29.0);
    }

    #[test]
    fn test_starvation_damage() {
        let config = StatsConfig::default();
        let mut vitals = Vitals::new(50.0, 5.0, 80.0, 20.0);

        step_vitals(&mut vitals, &config, 1.0);
        assert_approx_eq!(vitals.health, 49.0);
    }

    #[test]
    fn test_exposure_damage_and_regeneration() {
        let config = StatsConfig::default();

        let mut cold = Vitals::new(50.0, 80.0, 80.0, -20.0);
        step_vitals(&mut cold, &config, 1.0);
        assert_approx_eq!(cold.health, 49.5);

        let mut healthy = Vitals::new(50.0, 80.0, 80.0, 20.0);
        step_vitals(&mut healthy, &config, 1.0);
        assert_approx_eq!(healthy.health, 50.1, 1e-4);
    }

    #[test]
    fn test_vitals_clamp_at_zero() {
        let config = StatsConfig::default();
        let mut vitals = Vitals::new(0.5, 0.05, 0.05, 20.0);

        step_vitals(&mut vitals, &config, 1.0);

        assert_approx_eq!(vitals.hunger, 0.0);
        assert_approx_eq!(vitals.thirst, 0.0);
        assert_approx_eq!(vitals.health, 0.0);
        assert!(vitals.is_depleted());
    }

    #[test]
    fn test_death_cause_priority() {
        let config = StatsConfig::default();

        let all_bad = Vitals::new(0.0, 0.0, 0.0, -40.0);
        assert_eq!(death_cause(&all_bad, &config), DeathCause::Starvation);

        let thirsty = Vitals::new(0.0, 10.0, 0.0, 50.0);
        assert_eq!(death_cause(&thirsty, &config), DeathCause::Dehydration);

        let frozen = Vitals::new(0.0, 10.0, 10.0, -5.0);
        assert_eq!(death_cause(&frozen, &config), DeathCause::ExtremeCold);

        let cooked = Vitals::new(0.0, 10.0, 10.0, 45.0);
        assert_eq!(death_cause(&cooked, &config), DeathCause::ExtremeHeat);

        let mystery = Vitals::new(0.0, 10.0, 10.0, 20.0);
        assert_eq!(death_cause(&mystery, &config), DeathCause::Unknown);
    }

    #[test]
    fn test_restore_caps_at_max() {
        let mut vitals = Vitals::new(50.0, 95.0, 40.0, 20.0);
        let effect = ItemEffect {
            health: 10.0,
            hunger: 15.0,
            thirst: 5.0,
        };

        restore(&mut vitals, &effect);

        assert_approx_eq!(vitals.health, 60.0);
        assert_approx_eq!(vitals.hunger, 100.0);
        assert_approx_eq!(vitals.thirst, 45.0);
    }

    #[tokio::test]
    async fn test_death_reported_exactly_once() {
        let ctx = test_context(ServerConfig::default());
        let (peer, _client) = TestClient::connect(16);
        let player = ctx
            .registry
            .create("Doomed".into(), Vec3::default(), peer)
            .await
            .unwrap();
        ctx.registry
            .update(player.id, |p| p.vitals.hunger = 0.05)
            .await;

        let first = update_pass(&ctx).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].player_id, player.id);
        assert_eq!(first[0].cause, DeathCause::Starvation);

        assert!(update_pass(&ctx).await.is_empty());
        assert!(update_pass(&ctx).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_passes_are_deterministic() {
        let starting = [
            Vitals::default(),
            Vitals::new(60.0, 12.0, 30.0, -5.0),
            Vitals::new(80.0, 55.0, 9.0, 45.0),
        ];
        let mut worlds = Vec::new();
        for _ in 0..2 {
            let ctx = test_context(ServerConfig::default());
            for (i, vitals) in starting.iter().enumerate() {
                let (peer, _client) = TestClient::connect(16);
                let player = ctx
                    .registry
                    .create(format!("P{}", i), Vec3::default(), peer)
                    .await
                    .unwrap();
                let vitals = *vitals;
                ctx.registry.update(player.id, |p| p.vitals = vitals).await;
            }
            worlds.push(ctx);
        }

        let passes = 120;
        let mut deaths = Vec::new();
        for ctx in &worlds {
            let mut died = Vec::new();
            for _ in 0..passes {
                died.extend(update_pass(ctx).await.into_iter().map(|d| d.player_id));
            }
            deaths.push(died);
        }

        let first = worlds[0].registry.snapshot_all().await;
        let second = worlds[1].registry.snapshot_all().await;
        assert_eq!(deaths[0], deaths[1]);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.vitals, b.vitals);
            assert_eq!(a.dead, b.dead);
        }

        // same result as stepping the vitals directly with the update period
        let config = StatsConfig::default();
        let mut expected = starting[0];
        for _ in 0..passes {
            step_vitals(&mut expected, &config, 1.0);
        }
        assert_eq!(first[0].vitals, expected);
        assert!(!first[0].dead);
    }

    #[tokio::test]
    async fn test_death_broadcast_reaches_everyone() {
        let ctx = test_context(ServerConfig::default());
        let mut clients = Vec::new();
        for name in ["A", "B"] {
            let (peer, client) = TestClient::connect(16);
            let player = ctx
                .registry
                .create(name.into(), Vec3::default(), peer)
                .await
                .unwrap();
            ctx.registry.activate(player.id, |_, _| ()).await;
            clients.push(client);
        }

        let death = Death {
            player_id: 1,
            name: "A".into(),
            cause: DeathCause::Starvation,
        };
        assert_eq!(handle_death(&ctx, &death).await, 2);

        let expected = Message::PlayerDeath {
            player_id: 1,
            killer_name: String::new(),
        };
        for client in &mut clients {
            assert_eq!(client.next_message().await, Some(expected.clone()));
        }
    }

    #[tokio::test]
    async fn test_sync_pass_sends_own_vitals_only_when_ready() {
        let ctx = test_context(ServerConfig::default());
        let (peer_a, mut client_a) = TestClient::connect(16);
        let (peer_b, mut client_b) = TestClient::connect(16);
        let a = ctx
            .registry
            .create("A".into(), Vec3::default(), peer_a)
            .await
            .unwrap();
        ctx.registry
            .create("B".into(), Vec3::default(), peer_b)
            .await
            .unwrap();
        ctx.registry.activate(a.id, |_, _| ()).await;
        ctx.registry.update(a.id, |p| p.vitals.thirst = 42.0).await;

        assert_eq!(sync_pass(&ctx).await, 1);

        match client_a.next_message().await {
            Some(Message::StatsUpdate { player_id, vitals }) => {
                assert_eq!(player_id, a.id);
                assert_approx_eq!(vitals.thirst, 42.0);
            }
            other => panic!("expected StatsUpdate, got {:?}", other),
        }
        client_b.expect_silence(Duration::from_millis(100)).await;
    }
}
