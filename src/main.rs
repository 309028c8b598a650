use callwire::application::{
    spawn_sweeper, AudioBridge, BridgeSettings, CallController, ControllerSettings,
    InstrumentedSink, PendingCallbacks,
};
use callwire::config::{Config, DEFAULT_CONFIG_PATH};
use callwire::domain::call::CallSessionRegistry;
use callwire::domain::shared::PhoneNumber;
use callwire::infrastructure::agent::{ChatCompletionAgent, StaticAgentDirectory};
use callwire::infrastructure::media::FRAME_DURATION;
use callwire::infrastructure::speech::{
    ElevenLabsSynthesizer, SpeechSynthesisClient, SynthesisSettings, TranscriptionRelay,
    WhisperEngine,
};
use callwire::infrastructure::telephony::TwilioGateway;
use callwire::interface::api::{
    build_router, init_metrics, AppState, EventBroadcaster, WebhookSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("callwire=info,tower_http=info")),
        )
        .init();

    info!("Starting Callwire");

    // Load configuration
    let config_path =
        std::env::var("CALLWIRE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;
    info!("Configuration loaded from {}", config_path);

    let prometheus_handle = init_metrics()?;
    info!("Metrics recorder installed");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;

    // Call registry, with events fanned out to WebSocket subscribers
    let event_broadcaster = Arc::new(EventBroadcaster::new());
    let registry = Arc::new(CallSessionRegistry::new(
        Arc::new(InstrumentedSink::new(event_broadcaster.clone())),
        config.calls.sweep_grace(),
    ));
    let pending = Arc::new(
        PendingCallbacks::new(
            config.calls.pending_callback_ttl(),
            config.calls.pending_callbacks_per_call,
        )
        .with_max_calls(config.calls.pending_callback_calls),
    );

    let agents = Arc::new(StaticAgentDirectory::from_config(
        &config.agents,
        &config.synthesis.default_voice_id,
    ));
    if agents.is_empty() {
        warn!("No agents configured; every call request will be rejected");
    }

    // Carrier
    let gateway = Arc::new(TwilioGateway::new(http.clone(), &config.telephony));
    let default_caller = match config.telephony.default_caller_number.as_deref() {
        Some(raw) => match PhoneNumber::parse(raw) {
            Ok(number) => Some(number),
            Err(e) => {
                warn!("Ignoring default caller number: {}", e);
                None
            }
        },
        None => None,
    };
    let controller = Arc::new(CallController::new(
        registry.clone(),
        gateway,
        agents.clone(),
        pending.clone(),
        ControllerSettings {
            default_caller,
            attach_timeout: config.calls.attach_timeout(),
            ending_timeout: config.calls.ending_timeout(),
        },
    ));

    // Speech upstreams and the conversation model
    let synthesizer = ElevenLabsSynthesizer::new(
        http.clone(),
        config.synthesis.api_key.clone(),
        config.synthesis.base_url.clone(),
        config.synthesis.model_id.clone(),
        config.synthesis.output_format.clone(),
    )
    .with_voice_settings(config.synthesis.stability, config.synthesis.similarity_boost);
    let synthesis = Arc::new(SpeechSynthesisClient::new(
        Arc::new(synthesizer),
        SynthesisSettings {
            request_timeout: Duration::from_millis(config.synthesis.request_timeout_ms),
            max_retries: config.synthesis.max_retries,
            ..Default::default()
        },
    ));

    let whisper = WhisperEngine::new(
        http.clone(),
        config.transcription.api_key.clone(),
        config.transcription.base_url.clone(),
        config.transcription.model.clone(),
    )
    .with_language(config.transcription.language.clone());
    let transcription_timeout = Duration::from_millis(config.transcription.request_timeout_ms);
    let transcription = Arc::new(TranscriptionRelay::new(Arc::new(whisper), transcription_timeout));

    let conversation = Arc::new(
        ChatCompletionAgent::new(
            http.clone(),
            config.llm.api_key.clone(),
            &config.llm.base_url,
            config.llm.model.clone(),
        )
        .with_limits(
            config.llm.max_history,
            config.llm.max_tokens,
            Duration::from_millis(config.llm.request_timeout_ms),
        ),
    );

    let bridge = Arc::new(AudioBridge::new(
        registry.clone(),
        agents,
        conversation,
        synthesis,
        transcription,
        BridgeSettings {
            inbound_capacity: config.calls.inbound_buffer_frames,
            outbound_depth: config.calls.outbound_queue_frames,
            chunk_frames: config.transcription.chunk_frames,
            frame_duration: FRAME_DURATION,
            max_dropped_frames: config.calls.max_dropped_frames,
            vad: config.calls.vad.clone(),
            default_voice_id: config.synthesis.default_voice_id.clone(),
            flush_timeout: transcription_timeout,
        },
    ));

    // Background tasks
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        registry.clone(),
        pending,
        config.calls.sweep_interval(),
        shutdown.clone(),
    );

    let state = AppState {
        controller,
        registry,
        bridge,
        webhooks: Arc::new(WebhookSettings::from_config(
            &config.telephony,
            config.calls.start_timeout(),
        )),
    };
    if state.webhooks.validator.is_none() {
        warn!("Carrier webhook signatures are not validated");
    }

    let app = build_router(state, prometheus_handle, event_broadcaster);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);
    info!(
        "Carrier media stream URL: {}",
        config.telephony.media_stream_url()
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task failed: {}", e);
    }

    info!("Callwire stopped");
    Ok(())
}
