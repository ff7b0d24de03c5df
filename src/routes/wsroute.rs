use crate::config::WsConfig;
use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;
use crate::websocket::handlers::GatewaySession;
use crate::websocket::ConnectionRegistry;
use actix::{
    Actor, ActorContext, ActorFutureExt, AsyncContext, Handler, Message as ActixMessage,
    StreamHandler, WrapFuture,
};
use actix_middleware::extract_token;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Encoded frame headed for the client
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(String);

/// One realtime connection
pub struct WsSession {
    gateway: GatewaySession,
    registry: ConnectionRegistry,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn new(gateway: GatewaySession, registry: ConnectionRegistry, ws: &WsConfig) -> Self {
        Self {
            gateway,
            registry,
            hb: Instant::now(),
            heartbeat_interval: Duration::from_secs(ws.heartbeat_interval_secs.max(1)),
            client_timeout: Duration::from_secs(ws.client_timeout_secs.max(1)),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(
                    connection_id = %act.gateway.connection_id,
                    user_id = %act.gateway.user_id,
                    "realtime heartbeat timed out, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.gateway.connection_id,
            user_id = %self.gateway.user_id,
            "realtime session started"
        );
        metrics::ws_connection_opened();
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.gateway.connection_id,
            user_id = %self.gateway.user_id,
            "realtime session stopped"
        );
        metrics::ws_connection_closed();

        let registry = self.registry.clone();
        let connection_id = self.gateway.connection_id;
        actix::spawn(async move {
            registry.unregister(connection_id).await;
        });
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let gateway = self.gateway.clone();
                let text = text.to_string();

                // One inbound event at a time keeps a client's sends in order
                ctx.wait(
                    async move { gateway.handle_text(&text).await }
                        .into_actor(self)
                        .map(|reply, _act, ctx| {
                            if let Some(reply) = reply {
                                ctx.text(reply);
                            }
                        }),
                );
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!("binary realtime frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "realtime close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "realtime protocol error");
                ctx.stop();
            }
        }
    }
}

/// Token from `?token=`, then the bearer header, then the `accessToken` cookie.
fn connection_token(params: &WsParams, req: &HttpRequest) -> Option<String> {
    params
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| extract_token(req))
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let identity = match connection_token(&query, &req).map(|t| state.verifier.verify(&t)) {
        Some(Ok(identity)) => identity,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "realtime connection rejected: invalid token");
            return Err(AppError::Unauthorized.into());
        }
        None => {
            tracing::warn!("realtime connection rejected: no token");
            return Err(AppError::Unauthorized.into());
        }
    };

    let (connection_id, mut rx) = state.registry.register(identity.user_id).await;
    let gateway = GatewaySession::new(
        connection_id,
        identity.user_id,
        state.registry.clone(),
        state.conversations.clone(),
    );
    let session = WsSession::new(gateway, state.registry.clone(), &state.ws);

    let (addr, resp) = match ws::WsResponseBuilder::new(session, &req, stream).start_with_addr() {
        Ok(started) => started,
        Err(e) => {
            state.registry.unregister(connection_id).await;
            return Err(e);
        }
    };

    // Drain the registry channel into the session; ends once the
    // connection is unregistered and the sender dropped.
    actix::spawn(async move {
        while let Some(frame) = rx.recv().await {
            addr.do_send(Outbound(frame));
        }
    });

    Ok(resp)
}
