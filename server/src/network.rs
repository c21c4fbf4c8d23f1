//! Server network layer: UDP tasks around the authoritative tick loop

use crate::assets::Assets;
use crate::broadcast::fan_out;
use crate::config::{GameOverPolicy, ServerConfig};
use crate::dispatch::{bot_messages, hit_messages, verdict_message, Dispatcher, GameMessage};
use crate::game::{GameError, GameState};
use crate::session::SessionRegistry;
use log::{debug, error, info, warn};
use shared::{decode_frame, encode_frame, Action, ActionType, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Why a session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Disconnect,
    Timeout,
}

/// Messages sent from network tasks to the tick loop
#[derive(Debug)]
pub enum ServerMessage {
    ActionReceived { session_id: u32, action: Action },
    SessionClosed { session_id: u32, reason: CloseReason },
    Shutdown,
}

/// Lets other tasks stop a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionRegistry>>,
    game_state: GameState,
    dispatcher: Dispatcher,
    config: ServerConfig,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        assets: Assets,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let game_state = match config.seed {
            Some(seed) => GameState::with_seed(assets, seed),
            None => GameState::new(assets),
        };

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let mut server = Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionRegistry::new(config.max_clients))),
            game_state,
            dispatcher: Dispatcher::new(config.validate_moves),
            config,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        };
        server.spawn_bots()?;
        Ok(server)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    fn spawn_bots(&mut self) -> Result<(), GameError> {
        for _ in 0..self.config.bots {
            let id = self.game_state.spawn_bot(&self.config.bot_character)?;
            if let Some(bot) = self.game_state.get_player(id) {
                let action = Action::player_spawn(&bot.character, bot.x, bot.y);
                self.queue(GameMessage::Broadcast { origin: id, action });
            }
        }
        Ok(())
    }

    /// Spawns the task that receives datagrams and forwards parsed actions
    fn spawn_listener(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let running = Arc::clone(&self.running);
        let recv_timeout = self.config.recv_timeout;

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            while running.load(Ordering::Relaxed) {
                match timeout(recv_timeout, socket.recv_from(&mut buffer)).await {
                    Err(_) => continue,
                    Ok(Ok((len, addr))) => {
                        if !Self::receive_datagram(&sessions, &server_tx, &buffer[..len], addr)
                            .await
                        {
                            error!("Tick loop is gone, stopping listener");
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
            debug!("Listener stopped");
        }));
    }

    /// Decodes one datagram, resolves its session and forwards it to the tick loop.
    ///
    /// Returns false once the tick loop can no longer receive.
    async fn receive_datagram(
        sessions: &RwLock<SessionRegistry>,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
        data: &[u8],
        addr: SocketAddr,
    ) -> bool {
        let action = match decode_frame(data) {
            Ok(action) => action,
            Err(e) => {
                warn!("Dropping malformed datagram from {}: {}", addr, e);
                return true;
            }
        };

        let message = {
            let mut sessions = sessions.write().await;
            if action.action_type == ActionType::Disconnect {
                let Some(session_id) = sessions.find_by_addr(addr) else {
                    debug!("Ignoring disconnect from unknown address {}", addr);
                    return true;
                };
                sessions.evict(session_id);
                ServerMessage::SessionClosed {
                    session_id,
                    reason: CloseReason::Disconnect,
                }
            } else {
                let Some(session_id) = sessions.resolve_or_register(addr) else {
                    debug!("Server full, ignoring {}", addr);
                    return true;
                };
                sessions.touch(session_id);
                ServerMessage::ActionReceived { session_id, action }
            }
        };

        server_tx.send(message).is_ok()
    }

    /// Spawns the task that delivers outgoing messages
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let running = Arc::clone(&self.running);
        let poll = self.config.recv_timeout;
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        self.tasks.push(tokio::spawn(async move {
            loop {
                let message = match timeout(poll, game_rx.recv()).await {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(_) if running.load(Ordering::Relaxed) => continue,
                    // Queue is drained and the server is stopping
                    Err(_) => break,
                };

                let deliveries = {
                    let sessions = sessions.read().await;
                    route(&sessions, message)
                };
                for (addr, action) in deliveries {
                    if let Err(e) = Self::send_action_impl(&socket, &action, addr).await {
                        error!("Failed to send {} to {}: {}", action.action_type, addr, e);
                    }
                }
            }
            debug!("Sender stopped");
        }));
    }

    /// Spawns the task that evicts silent sessions
    fn spawn_reaper(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let running = Arc::clone(&self.running);
        let period = self.config.reaper_interval;
        let disconnect_timeout = self.config.disconnect_timeout;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                interval.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let timed_out = {
                    let mut sessions = sessions.write().await;
                    sessions.sweep(disconnect_timeout)
                };

                for session_id in timed_out {
                    info!("Session {} timed out", session_id);
                    let message = ServerMessage::SessionClosed {
                        session_id,
                        reason: CloseReason::Timeout,
                    };
                    if server_tx.send(message).is_err() {
                        error!("Failed to forward timeout of session {}", session_id);
                        return;
                    }
                }
            }
            debug!("Reaper stopped");
        }));
    }

    async fn send_action_impl(
        socket: &UdpSocket,
        action: &Action,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_frame(action)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue outgoing message: {}", e);
        }
    }

    fn queue_all(&self, messages: Vec<GameMessage>) {
        for message in messages {
            self.queue(message);
        }
    }

    /// Runs one simulation step: queued actions first, then bots, then bullets.
    ///
    /// Returns false when a shutdown was requested.
    fn tick(&mut self, now: Instant) -> bool {
        while let Ok(message) = self.server_rx.try_recv() {
            match message {
                ServerMessage::ActionReceived { session_id, action } => {
                    let out = self
                        .dispatcher
                        .apply(&mut self.game_state, session_id, &action, now);
                    self.queue_all(out);
                }
                ServerMessage::SessionClosed { session_id, reason } => {
                    debug!("Closing session {} ({:?})", session_id, reason);
                    let out = self.dispatcher.close_session(&mut self.game_state, session_id);
                    self.queue_all(out);
                }
                ServerMessage::Shutdown => return false,
            }
        }

        let events = self.game_state.advance_bots(now);
        self.queue_all(bot_messages(&events));

        let hits = self.game_state.advance_tick();
        self.queue_all(hit_messages(&hits));

        if self.game_state.tick % 60 == 0 && self.game_state.player_count() > 0 {
            debug!(
                "Tick {}: {} players, {} bullets in flight",
                self.game_state.tick,
                self.game_state.player_count(),
                self.game_state.bullet_count()
            );
        }
        true
    }

    /// Announces a verdict if there is one and applies the game-over policy.
    ///
    /// Returns false when the server should stop.
    fn check_game_over(&mut self) -> bool {
        let Some(verdict) = self.game_state.verdict() else {
            return true;
        };
        info!("Round over: {:?}", verdict);
        self.queue(verdict_message(verdict));

        match self.config.on_game_over {
            GameOverPolicy::Restart => {
                self.game_state.reset();
                if let Err(e) = self.spawn_bots() {
                    error!("Failed to respawn bots: {}", e);
                }
                true
            }
            GameOverPolicy::Shutdown => false,
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::Relaxed);
        self.spawn_listener();
        self.spawn_sender();
        self.spawn_reaper();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut game_over_interval = interval(self.config.game_over_check_interval);
        game_over_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if !self.tick(Instant::now()) {
                        info!("Server shutting down");
                        break;
                    }
                },
                _ = game_over_interval.tick() => {
                    if !self.check_game_over() {
                        info!("Game over, shutting down");
                        break;
                    }
                },
            }
        }

        self.running.store(false, Ordering::Relaxed);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Server task failed: {}", e);
            }
        }
        info!("Server stopped");
        Ok(())
    }
}

/// Resolves an outgoing message to concrete `(address, action)` deliveries.
pub fn route(sessions: &SessionRegistry, message: GameMessage) -> Vec<(SocketAddr, Action)> {
    match message {
        GameMessage::Broadcast { origin, action } => fan_out(origin, &action, &sessions.addrs()),
        GameMessage::Unicast { session_id, action } => sessions
            .addr_of(session_id)
            .map(|addr| (addr, action))
            .into_iter()
            .collect(),
        GameMessage::Announce { action } => sessions
            .addrs()
            .into_iter()
            .map(|(_, addr)| (addr, action.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::CharacterTable;
    use crate::collision::{CollisionMap, CollisionMaps};
    use shared::Direction;

    const TABLE: &str = r#"{"characters": [
        {"name": "Ninja", "hp": 100, "speed": 4, "bullet_speed": 8,
         "bullet_damage": 10, "bullet_lifespan": 60, "shooting_cooldown": 300}
    ]}"#;

    fn test_assets() -> Assets {
        Assets {
            characters: CharacterTable::from_json_str(TABLE).unwrap(),
            maps: CollisionMaps::shared(CollisionMap::open_area(800, 600)),
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            seed: Some(5),
            ..ServerConfig::default()
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut out = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn received(server: &Server, session_id: u32, action: Action) {
        server
            .server_tx
            .send(ServerMessage::ActionReceived { session_id, action })
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_dropped() {
        let sessions = RwLock::new(SessionRegistry::new(4));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let garbage: [&[u8]; 4] = [
            b"not a frame",
            b"99!{\"type\":\"move\",\"action_parameters\":[1,2]}",
            b"5!{oops",
            b"12!{\"type\":\"x\"}",
        ];
        for data in garbage {
            assert!(Server::receive_datagram(&sessions, &tx, data, addr(5000)).await);
        }

        assert!(rx.try_recv().is_err());
        assert!(sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_datagram_registers_session() {
        let sessions = RwLock::new(SessionRegistry::new(4));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = encode_frame(&Action::player_init("Ninja")).unwrap();

        assert!(Server::receive_datagram(&sessions, &tx, &frame, addr(5000)).await);
        assert!(Server::receive_datagram(&sessions, &tx, &frame, addr(5001)).await);

        match rx.try_recv().unwrap() {
            ServerMessage::ActionReceived { session_id, action } => {
                assert_eq!(session_id, 1);
                assert_eq!(action, Action::player_init("Ninja"));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::ActionReceived { session_id: 2, .. }
        ));
        assert_eq!(sessions.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_full_server_ignores_new_addresses() {
        let sessions = RwLock::new(SessionRegistry::new(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = encode_frame(&Action::player_init("Ninja")).unwrap();

        Server::receive_datagram(&sessions, &tx, &frame, addr(5000)).await;
        Server::receive_datagram(&sessions, &tx, &frame, addr(5001)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_evicts_immediately() {
        let sessions = RwLock::new(SessionRegistry::new(4));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let join = encode_frame(&Action::player_init("Ninja")).unwrap();
        let leave = encode_frame(&Action::disconnect()).unwrap();

        Server::receive_datagram(&sessions, &tx, &join, addr(5000)).await;
        Server::receive_datagram(&sessions, &tx, &leave, addr(5000)).await;

        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::ActionReceived { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::SessionClosed {
                session_id: 1,
                reason: CloseReason::Disconnect
            }
        ));
        assert!(sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_from_unknown_address_is_ignored() {
        let sessions = RwLock::new(SessionRegistry::new(4));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let leave = encode_frame(&Action::disconnect()).unwrap();
        let join = encode_frame(&Action::player_init("Ninja")).unwrap();

        assert!(Server::receive_datagram(&sessions, &tx, &leave, addr(5000)).await);
        assert!(rx.try_recv().is_err());
        assert!(sessions.read().await.is_empty());

        // No id was spent on the stray disconnect
        Server::receive_datagram(&sessions, &tx, &join, addr(5001)).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::ActionReceived { session_id: 1, .. }
        ));
    }

    #[test]
    fn test_closed_channel_stops_listener() {
        let sessions = RwLock::new(SessionRegistry::new(4));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let frame = encode_frame(&Action::shoot(1.0, 0.0)).unwrap();
        let keep_going =
            tokio_test::block_on(Server::receive_datagram(&sessions, &tx, &frame, addr(5000)));
        assert!(!keep_going);
    }

    #[test]
    fn test_route() {
        let mut sessions = SessionRegistry::new(4);
        sessions.resolve_or_register(addr(6001));
        sessions.resolve_or_register(addr(6002));

        let broadcast = route(
            &sessions,
            GameMessage::Broadcast {
                origin: 2,
                action: Action::hit(5),
            },
        );
        assert_eq!(
            broadcast,
            vec![
                (addr(6001), Action::hit(5).with_player_id(2)),
                (addr(6002), Action::hit(5).with_player_id(0)),
            ]
        );

        let unicast = route(
            &sessions,
            GameMessage::Unicast {
                session_id: 1,
                action: Action::player_spawn("Ninja", 1.0, 2.0).with_player_id(2),
            },
        );
        assert_eq!(unicast.len(), 1);
        assert_eq!(unicast[0].0, addr(6001));
        assert_eq!(unicast[0].1.player_id, Some(2));

        let gone = route(
            &sessions,
            GameMessage::Unicast {
                session_id: 9,
                action: Action::hit(1),
            },
        );
        assert!(gone.is_empty());

        let announce = route(
            &sessions,
            GameMessage::Announce {
                action: Action::game_over_draw(),
            },
        );
        assert_eq!(announce.len(), 2);
        assert!(announce.iter().all(|(_, action)| action.player_id.is_none()));
    }

    #[tokio::test]
    async fn test_queued_actions_apply_before_bullets() {
        let mut server = Server::new(test_config(), test_assets()).await.unwrap();
        received(&server, 1, Action::player_init("Ninja"));
        received(&server, 2, Action::player_init("Ninja"));
        assert!(server.tick(Instant::now()));
        drain(&mut server);

        // Line the two players up and shoot within the same tick.
        server.game_state.set_position(1, 100.0, 100.0);
        server.game_state.set_position(2, 130.0, 100.0);
        received(&server, 1, Action::shoot(20.0, 0.0));
        assert!(server.tick(Instant::now()));

        assert_eq!(server.game_state.get_player(2).unwrap().hp, 90);
        let out = drain(&mut server);
        assert_eq!(
            out,
            vec![
                GameMessage::Broadcast {
                    origin: 1,
                    action: Action::shoot(20.0, 0.0),
                },
                GameMessage::Broadcast {
                    origin: 2,
                    action: Action::hit(10),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_session_closed_removes_player() {
        let mut server = Server::new(test_config(), test_assets()).await.unwrap();
        received(&server, 1, Action::player_init("Ninja"));
        received(&server, 1, Action::move_step(Direction::Left));
        server.tick(Instant::now());
        drain(&mut server);

        // A timeout racing an explicit disconnect is only announced once.
        for reason in [CloseReason::Disconnect, CloseReason::Timeout] {
            server
                .server_tx
                .send(ServerMessage::SessionClosed { session_id: 1, reason })
                .unwrap();
        }
        server.tick(Instant::now());

        assert!(server.game_state.get_player(1).is_none());
        assert_eq!(
            drain(&mut server),
            vec![GameMessage::Broadcast {
                origin: 1,
                action: Action::disconnect(),
            }]
        );
    }

    #[tokio::test]
    async fn test_shutdown_message_stops_tick() {
        let mut server = Server::new(test_config(), test_assets()).await.unwrap();
        server.handle().shutdown();
        assert!(!server.tick(Instant::now()));
    }

    #[tokio::test]
    async fn test_game_over_policies() {
        let mut server = Server::new(test_config(), test_assets()).await.unwrap();
        received(&server, 1, Action::player_init("Ninja"));
        received(&server, 2, Action::player_init("Ninja"));
        server.tick(Instant::now());
        drain(&mut server);
        assert!(server.check_game_over());

        server.game_state.set_position(1, 100.0, 100.0);
        server.game_state.set_position(2, 130.0, 100.0);
        let start = Instant::now();
        for shot in 0..10u64 {
            let now = start + Duration::from_millis(shot * 400);
            server.game_state.shoot_at(1, 20.0, 0.0, now);
            server.game_state.advance_tick();
        }
        assert_eq!(server.game_state.get_player(2).unwrap().hp, 0);

        assert!(server.check_game_over());
        assert_eq!(
            drain(&mut server),
            vec![GameMessage::Broadcast {
                origin: 1,
                action: Action::game_over_win(),
            }]
        );
        assert_eq!(server.game_state.player_count(), 0);

        let config = ServerConfig {
            on_game_over: GameOverPolicy::Shutdown,
            ..test_config()
        };
        let mut server = Server::new(config, test_assets()).await.unwrap();
        received(&server, 1, Action::player_init("Ninja"));
        received(&server, 2, Action::player_init("Ninja"));
        server.tick(Instant::now());
        server.game_state.set_position(1, 100.0, 100.0);
        server.game_state.set_position(2, 130.0, 100.0);
        for shot in 0..10u64 {
            let now = start + Duration::from_millis(shot * 400);
            server.game_state.shoot_at(2, -20.0, 0.0, now);
            server.game_state.advance_tick();
        }
        assert!(!server.check_game_over());
    }

    #[tokio::test]
    async fn test_bots_spawn_with_server() {
        let config = ServerConfig {
            bots: 2,
            ..test_config()
        };
        let mut server = Server::new(config, test_assets()).await.unwrap();
        assert_eq!(server.game_state.player_count(), 2);
        assert_eq!(drain(&mut server).len(), 2);

        let bad = ServerConfig {
            bots: 1,
            bot_character: "Pirate".to_string(),
            ..test_config()
        };
        assert!(Server::new(bad, test_assets()).await.is_err());
    }
}
