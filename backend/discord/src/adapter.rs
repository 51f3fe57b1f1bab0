use std::future::Future;
use std::num::NonZeroU64;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ApplicationId, Command, CommandInteraction, Context, CreateAttachment, EditInteractionResponse,
    EventHandler, GatewayIntents, Interaction, Ready, VoiceState,
};
use serenity::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use voicetally_core::{PresenceEvent, SessionStore};
use voicetally_reports::{
    retry_transient, Messages, ReportReply, ReportRequest, ReportService, RetryPolicy,
};

use crate::commands::{classify_error, requested_kind, voicestats_command, COMMAND_NAME};
use crate::labels::DiscordLabelResolver;
use crate::presence::{now_ms, presence_event};

struct Handler<S> {
    presence_tx: mpsc::Sender<PresenceEvent>,
    reports: Arc<ReportService<S>>,
    retry: RetryPolicy,
    messages: Messages,
}

impl<S> Handler<S>
where
    S: SessionStore + 'static,
{
    async fn handle_voicestats(&self, ctx: &Context, command: &CommandInteraction) {
        let ack = retry_transient(&self.retry, classify_error, move || command.defer(&ctx.http)).await;
        if let Err(e) = ack {
            error!(error = %e, interaction_id = %command.id, "Failed to acknowledge /voicestats");
            return;
        }

        let reply = match (command.guild_id, requested_kind(command)) {
            (Some(guild_id), Some(kind)) => {
                let request = ReportRequest {
                    group_id: guild_id.to_string(),
                    kind,
                };
                let resolver = DiscordLabelResolver::new(Arc::clone(&ctx.http));
                self.reports.generate(&request, &resolver).await
            }
            (guild_id, kind) => {
                warn!(?guild_id, ?kind, "Malformed /voicestats invocation");
                ReportReply::Error(self.messages.command_error().to_string())
            }
        };

        let response = match reply {
            ReportReply::Chart { chart, .. } => EditInteractionResponse::new()
                .new_attachment(CreateAttachment::bytes(chart.bytes, chart.file_name)),
            ReportReply::NoData(text) | ReportReply::Error(text) => {
                EditInteractionResponse::new().content(text)
            }
        };

        if let Err(e) = command.edit_response(&ctx.http, response).await {
            error!(error = %e, interaction_id = %command.id, "Failed to send /voicestats reply");
            let fallback = EditInteractionResponse::new().content(self.messages.command_error());
            if let Err(e) = command.edit_response(&ctx.http, fallback).await {
                error!(error = %e, "Failed to send error message");
            }
        }
    }
}

#[async_trait]
impl<S> EventHandler for Handler<S>
where
    S: SessionStore + 'static,
{
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord client connected");
        match Command::set_global_commands(&ctx.http, vec![voicestats_command(&self.messages)]).await {
            Ok(commands) => info!(count = commands.len(), "Slash commands registered"),
            Err(e) => error!(error = %e, "Error registering slash commands"),
        }
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let old_channel = old.as_ref().and_then(|s| s.channel_id).map(|c| c.get());
        let Some(event) = presence_event(
            old_channel,
            new.channel_id.map(|c| c.get()),
            new.user_id.get(),
            new.guild_id.map(|g| g.get()),
            now_ms(),
        ) else {
            debug!(user_id = %new.user_id, "Voice state update outside a guild; skipped");
            return;
        };

        if let Err(e) = self.presence_tx.send(event).await {
            error!(error = %e, "Presence bus closed; voice state update dropped");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name == COMMAND_NAME {
            self.handle_voicestats(&ctx, &command).await;
        }
    }
}

/// Gateway connection feeding the presence bus and answering `/voicestats`.
pub struct DiscordAdapter<S> {
    token: String,
    presence_tx: mpsc::Sender<PresenceEvent>,
    reports: Arc<ReportService<S>>,
    retry: RetryPolicy,
    application_id: Option<u64>,
}

impl<S> DiscordAdapter<S>
where
    S: SessionStore + 'static,
{
    pub fn new(
        token: String,
        presence_tx: mpsc::Sender<PresenceEvent>,
        reports: Arc<ReportService<S>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            token,
            presence_tx,
            reports,
            retry,
            application_id: None,
        }
    }

    /// Known application id; otherwise serenity learns it from the gateway.
    pub fn with_application_id(mut self, application_id: Option<u64>) -> Self {
        self.application_id = application_id;
        self
    }

    /// Run the gateway client until it fails or `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Discord adapter");

        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
        let messages = *self.reports.messages();
        let handler = Handler {
            presence_tx: self.presence_tx,
            reports: self.reports,
            retry: self.retry,
            messages,
        };

        let mut builder = Client::builder(&self.token, intents).event_handler(handler);
        if let Some(id) = self.application_id.and_then(NonZeroU64::new) {
            builder = builder.application_id(ApplicationId::from(id));
        }
        let mut client = builder.await?;

        let shard_manager = Arc::clone(&client.shard_manager);
        tokio::spawn(async move {
            shutdown.await;
            info!("Shutting down Discord shards");
            shard_manager.shutdown_all().await;
        });

        if let Err(why) = client.start().await {
            error!("Client error: {:?}", why);
            anyhow::bail!("Discord client error: {:?}", why);
        }

        info!("Discord adapter stopped");
        Ok(())
    }
}
