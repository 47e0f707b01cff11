//! Lobby event handlers
//!
//! One handler per inbound event name. Handlers decode validated payload
//! fields, check the request-level rules that belong to the edge (self-kick,
//! Steam group URL shape), and delegate every state transition to the
//! [`LobbyManager`].

use crate::dispatch::dispatcher::{ConnectionContext, EventDispatcher, EventHandler};
use crate::dispatch::schema::{opt_str_field, str_field, uint_field, EventSchema, FieldKind, FieldSpec};
use crate::error::LobbyError;
use crate::lobby::manager::{CreateLobbyRequest, LobbyManager};
use crate::provision::ServerSettings;
use crate::types::{LobbyType, Team};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const STEAM_GROUP_MARKER: &str = "steamcommunity.com/groups/";

/// Extract the group slug from a Steam community group URL.
fn parse_steam_group(url: &str) -> Result<String, LobbyError> {
    match url.find(STEAM_GROUP_MARKER) {
        Some(index) => {
            let slug = &url[index + STEAM_GROUP_MARKER.len()..];
            let slug = slug.trim_end_matches('/');
            if slug.is_empty() {
                return Err(LobbyError::Validation {
                    reason: "Invalid Steam group URL".to_string(),
                });
            }
            Ok(slug.to_string())
        }
        None => Err(LobbyError::Validation {
            reason: "Invalid Steam group URL".to_string(),
        }),
    }
}

/// Register every lobby handler on a dispatcher.
pub fn register_lobby_handlers(dispatcher: &mut EventDispatcher, manager: Arc<LobbyManager>) {
    dispatcher.register(Arc::new(LobbyCreateHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyJoinHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyLeaveHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyKickHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyBanHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbySpectatorJoinHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbySpectatorLeaveHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyCloseHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(PlayerReadyHandler {
        manager: manager.clone(),
    }));
    dispatcher.register(Arc::new(LobbyListHandler { manager }));
}

pub struct LobbyCreateHandler {
    manager: Arc<LobbyManager>,
}

static LOBBY_CREATE_SCHEMA: EventSchema = EventSchema::new(&[
    FieldSpec::required("type", FieldKind::String).allowed(LobbyType::WIRE_NAMES),
    FieldSpec::optional("server", FieldKind::String),
    FieldSpec::optional("rconpwd", FieldKind::String),
    FieldSpec::optional("password", FieldKind::String),
    FieldSpec::optional("steamGroupWhitelist", FieldKind::String),
]);

#[async_trait]
impl EventHandler for LobbyCreateHandler {
    fn name(&self) -> &'static str {
        "lobbyCreate"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_CREATE_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let creator = ctx.require_player()?;
        let lobby_type = LobbyType::from_wire(str_field(args, "type")?).ok_or_else(|| {
            LobbyError::Validation {
                reason: "Unknown lobby type".to_string(),
            }
        })?;

        let steam_group = match opt_str_field(args, "steamGroupWhitelist").filter(|s| !s.is_empty())
        {
            Some(url) => Some(parse_steam_group(url)?),
            None => None,
        };

        let request = CreateLobbyRequest {
            lobby_type,
            server: ServerSettings {
                host: opt_str_field(args, "server").unwrap_or_default().to_string(),
                rcon_password: opt_str_field(args, "rconpwd").unwrap_or_default().to_string(),
                server_password: Uuid::new_v4().simple().to_string(),
            },
            password: opt_str_field(args, "password")
                .filter(|p| !p.is_empty())
                .map(|p| p.to_string()),
            steam_group,
            allowed_players: None,
        };

        let lobby_id = self.manager.create_lobby(creator, request).await?;
        Ok(json!({ "id": lobby_id }))
    }
}

pub struct LobbyJoinHandler {
    manager: Arc<LobbyManager>,
}

static LOBBY_JOIN_SCHEMA: EventSchema = EventSchema::new(&[
    FieldSpec::required("id", FieldKind::Uint),
    FieldSpec::required("team", FieldKind::String).allowed(Team::WIRE_NAMES),
    FieldSpec::required("class", FieldKind::String),
    FieldSpec::optional("password", FieldKind::String),
]);

#[async_trait]
impl EventHandler for LobbyJoinHandler {
    fn name(&self) -> &'static str {
        "lobbyJoin"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_JOIN_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let player = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        let team = Team::from_wire(str_field(args, "team")?).ok_or_else(|| {
            LobbyError::Validation {
                reason: "Unknown team".to_string(),
            }
        })?;
        let class = str_field(args, "class")?;
        let password = opt_str_field(args, "password").filter(|p| !p.is_empty());

        let summary = self
            .manager
            .join(lobby_id, player, team, class, password)
            .await?;
        Ok(json!({ "slot": summary.slot }))
    }
}

pub struct LobbyLeaveHandler {
    manager: Arc<LobbyManager>,
}

static LOBBY_ID_SCHEMA: EventSchema =
    EventSchema::new(&[FieldSpec::required("id", FieldKind::Uint)]);

#[async_trait]
impl EventHandler for LobbyLeaveHandler {
    fn name(&self) -> &'static str {
        "lobbyLeave"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_ID_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let player = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        self.manager.leave(lobby_id, player).await?;
        Ok(json!({}))
    }
}

pub struct LobbyKickHandler {
    manager: Arc<LobbyManager>,
}

static LOBBY_TARGET_SCHEMA: EventSchema = EventSchema::new(&[
    FieldSpec::required("id", FieldKind::Uint),
    FieldSpec::required("steamid", FieldKind::String),
]);

#[async_trait]
impl EventHandler for LobbyKickHandler {
    fn name(&self) -> &'static str {
        "lobbyKick"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_TARGET_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let actor = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        let target = str_field(args, "steamid")?.to_string();
        self.manager.kick(lobby_id, actor, &target).await?;
        Ok(json!({}))
    }
}

pub struct LobbyBanHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for LobbyBanHandler {
    fn name(&self) -> &'static str {
        "lobbyBan"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_TARGET_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let actor = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        let target = str_field(args, "steamid")?.to_string();
        self.manager.ban_from_lobby(lobby_id, actor, &target).await?;
        Ok(json!({}))
    }
}

pub struct LobbySpectatorJoinHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for LobbySpectatorJoinHandler {
    fn name(&self) -> &'static str {
        "lobbySpectatorJoin"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_ID_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let player = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        self.manager.spectate(lobby_id, player).await?;
        Ok(json!({}))
    }
}

pub struct LobbySpectatorLeaveHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for LobbySpectatorLeaveHandler {
    fn name(&self) -> &'static str {
        "lobbySpectatorLeave"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_ID_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let player = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;

        // A seated player who never spectated sends this after joining a
        // slot from the spectator view; treat it as a no-op
        let spectated = self.manager.spectated_lobbies(player)?;
        if !spectated.contains(&lobby_id) && self.manager.seated_lobby(player)? == Some(lobby_id) {
            return Ok(json!({}));
        }

        self.manager.unspectate(lobby_id, player).await?;
        Ok(json!({}))
    }
}

pub struct LobbyCloseHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for LobbyCloseHandler {
    fn name(&self) -> &'static str {
        "lobbyClose"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_ID_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let actor = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        self.manager.close(lobby_id, actor).await?;
        Ok(json!({}))
    }
}

pub struct PlayerReadyHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for PlayerReadyHandler {
    fn name(&self) -> &'static str {
        "playerReady"
    }

    fn schema(&self) -> &EventSchema {
        &LOBBY_ID_SCHEMA
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
        let player = ctx.require_player()?;
        let lobby_id = uint_field(args, "id")?;
        let all_ready = self.manager.confirm_ready(lobby_id, player).await?;
        Ok(json!({ "allReady": all_ready }))
    }
}

pub struct LobbyListHandler {
    manager: Arc<LobbyManager>,
}

#[async_trait]
impl EventHandler for LobbyListHandler {
    fn name(&self) -> &'static str {
        "requestLobbyListData"
    }

    fn schema(&self) -> &EventSchema {
        static SCHEMA: EventSchema = EventSchema::new(&[]);
        &SCHEMA
    }

    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, _ctx: &ConnectionContext, _args: &Value) -> Result<Value, LobbyError> {
        let lobbies = self.manager.list_waiting().await?;
        serde_json::to_value(&lobbies).map_err(|e| LobbyError::Internal {
            message: format!("Failed to serialize lobby list: {}", e),
        })
    }
}
